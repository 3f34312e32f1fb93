//! Core type definitions used across the FolderTree workspace.

pub mod id;

pub use id::*;
