//! Document store collaborator.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::{DocumentId, FolderId, WorkspaceId};

/// The external store that owns documents.
///
/// Documents reference their folder through `document_folder_id` only. The
/// folder tree never reads document content; once a subtree has been
/// removed it hands the removed folder ids to this store so that the
/// documents filed under them can be cleaned up.
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug + 'static {
    /// Delete every document whose folder is one of `folder_ids`.
    /// Returns the ids of the removed documents.
    async fn delete_in_folders(
        &self,
        workspace_id: WorkspaceId,
        folder_ids: &[FolderId],
    ) -> AppResult<Vec<DocumentId>>;
}
