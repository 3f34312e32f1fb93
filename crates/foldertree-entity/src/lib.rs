//! # foldertree-entity
//!
//! Entity models for FolderTree. `Folder` and `ClosureEdge` map rows of the
//! `folders` and `folder_paths` tables and derive `sqlx::FromRow`; the
//! remaining types are value objects built from them at query time.

pub mod folder;

pub use folder::{
    ClosureEdge, CreateFolder, ExternalReference, ExternalSystemType, Folder, FolderNode,
    NewClosureEdge, OrderedFolder,
};
