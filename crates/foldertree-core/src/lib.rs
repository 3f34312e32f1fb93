//! # foldertree-core
//!
//! Core crate for FolderTree. Contains the unified error system, typed
//! identifiers, configuration schemas, and the traits through which the
//! folder tree talks to its external collaborators.
//!
//! This crate has **no** internal dependencies on other FolderTree crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
