//! Folder management, tree views and external sync.

pub mod name;
pub mod service;
pub mod sync;
pub mod tree;

pub use service::{CreateFolderRequest, DeleteSummary, FolderService, PendingDocumentCleanup};
pub use sync::{ExternalFolderEntry, ExternalSyncService, SyncOutcome, SyncedFolder};
pub use tree::TreeService;
