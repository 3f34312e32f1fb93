//! # foldertree-service
//!
//! Service layer for FolderTree. Services validate input, apply the
//! workspace naming rules, retry aborted transactions and assemble tree
//! views on top of a [`foldertree_database::FolderTreeStore`].
//!
//! Services follow constructor injection: the store and collaborators are
//! provided at construction time via `Arc` references.

pub mod context;
pub mod folder;
pub mod retry;

pub use context::RequestContext;
pub use folder::{
    CreateFolderRequest, DeleteSummary, ExternalFolderEntry, ExternalSyncService, FolderService,
    PendingDocumentCleanup, SyncOutcome, SyncedFolder, TreeService,
};
