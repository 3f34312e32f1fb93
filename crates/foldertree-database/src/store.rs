//! The folder tree persistence contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use foldertree_core::result::AppResult;
use foldertree_core::types::{FolderId, WorkspaceId};
use foldertree_entity::folder::{
    ClosureEdge, CreateFolder, ExternalSystemType, Folder, NewClosureEdge, OrderedFolder,
};

/// Outcome of one subtree deletion chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubtreeDeletion {
    /// Folders soft-deleted by this chunk, deepest first.
    pub deleted: Vec<FolderId>,
    /// Folders of the subtree still live after this chunk.
    pub remaining: usize,
}

impl SubtreeDeletion {
    /// Whether the whole subtree is gone.
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// How a mutation treats a live sibling that already uses the folder's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SiblingNames {
    /// Fail with `Conflict`.
    #[default]
    Unique,
    /// Accept the duplicate. Used for folders mirrored from external
    /// systems, which report collisions instead of refusing them.
    AllowDuplicates,
}

/// Read and write access to one workspace-scoped folder tree.
///
/// Implementations own both the folder records and the closure index.
/// Every mutating method is all-or-nothing: when it returns an error no
/// folder or closure row has changed. Lookups only see live folders unless
/// stated otherwise, and a folder from another workspace is reported as
/// not found.
#[async_trait]
pub trait FolderTreeStore: Send + Sync + std::fmt::Debug + 'static {
    /// Create the unnamed root folder of a workspace.
    ///
    /// Fails with `Conflict` if the workspace already has a live root.
    async fn create_root(&self, workspace_id: WorkspaceId) -> AppResult<Folder>;

    /// Create a named folder under `parent_id` and extend the closure index.
    ///
    /// With [`SiblingNames::Unique`] the name check runs in the same
    /// transaction as the insert.
    async fn create(
        &self,
        parent_id: FolderId,
        data: &CreateFolder,
        names: SiblingNames,
    ) -> AppResult<Folder>;

    /// Rename a non-root folder. Fails with `Conflict` if a live sibling
    /// already uses the name.
    async fn rename(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
        name: &str,
    ) -> AppResult<Folder>;

    /// Refresh the external timestamp of a synced folder, optionally
    /// renaming it. Renames of the root are ignored.
    async fn update_external(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
        name: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Folder>;

    /// Find a live folder by id.
    async fn find_by_id(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Option<Folder>>;

    /// Find a folder by id, soft-deleted ones included.
    async fn find_by_id_with_deleted(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Option<Folder>>;

    /// All live folders of a workspace, ordered by creation.
    async fn find_by_workspace(&self, workspace_id: WorkspaceId) -> AppResult<Vec<Folder>>;

    /// Live direct children of `parent_id` named `name`.
    async fn find_by_parent_and_name(
        &self,
        workspace_id: WorkspaceId,
        parent_id: FolderId,
        name: &str,
    ) -> AppResult<Vec<Folder>>;

    /// The live folder imported from `external_id` in `system`.
    async fn find_by_external_id(
        &self,
        workspace_id: WorkspaceId,
        system: ExternalSystemType,
        external_id: &str,
    ) -> AppResult<Option<Folder>>;

    /// The live folder whose only ancestor is itself.
    async fn find_root(&self, workspace_id: WorkspaceId) -> AppResult<Option<Folder>>;

    /// Ancestors of a folder, root first, the folder itself last.
    async fn find_ancestors(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Vec<OrderedFolder>>;

    /// Strict descendants of a folder in breadth-first order.
    async fn find_descendants(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Vec<OrderedFolder>>;

    /// The folder and all of its descendants, breadth-first.
    async fn descendant_ids(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Vec<FolderId>>;

    /// Parent-to-child rows (distance 1) inside the subtree of `folder_id`.
    async fn find_child_links(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Vec<NewClosureEdge>>;

    /// Reattach the subtree rooted at `subtree_root_id` under
    /// `new_parent_id`.
    ///
    /// Fails with `NotFound` before any write if either folder does not
    /// resolve, with `InvalidMove` if the new parent is the subtree root or
    /// one of its descendants, and with `Conflict` if a child of the new
    /// parent already uses the folder's name. Moving a folder under its
    /// current parent changes nothing.
    async fn move_subtree(
        &self,
        workspace_id: WorkspaceId,
        subtree_root_id: FolderId,
        new_parent_id: FolderId,
    ) -> AppResult<()>;

    /// Remove up to `max_folders` folders of a subtree, deepest first:
    /// soft-delete them and drop every closure row that touches them.
    ///
    /// Calling it again for a subtree that is already gone returns an
    /// empty, complete result. Deleting the workspace root is rejected.
    async fn delete_subtree_chunk(
        &self,
        workspace_id: WorkspaceId,
        subtree_root_id: FolderId,
        max_folders: usize,
    ) -> AppResult<SubtreeDeletion>;

    /// Every closure row whose descendant belongs to the workspace.
    async fn find_edges(&self, workspace_id: WorkspaceId) -> AppResult<Vec<ClosureEdge>>;
}
