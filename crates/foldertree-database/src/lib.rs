//! # foldertree-database
//!
//! Persistence for the folder tree. Folders live in `folders`; the
//! transitive closure of the parent relation lives in `folder_paths`.
//! [`FolderTreeRepository`] is the only writer of both tables and runs each
//! mutation in one transaction. [`MemoryFolderTreeStore`] implements the
//! same [`FolderTreeStore`] contract in process.

pub mod closure;
pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use memory::MemoryFolderTreeStore;
pub use repositories::FolderTreeRepository;
pub use store::{FolderTreeStore, SiblingNames, SubtreeDeletion};
