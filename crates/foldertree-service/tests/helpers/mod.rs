//! Shared test helpers for folder tree integration tests.

use std::sync::Arc;

use foldertree_core::config::TreeConfig;
use foldertree_core::types::{FolderId, WorkspaceId};
use foldertree_database::{FolderTreeStore, MemoryFolderTreeStore};
use foldertree_entity::folder::Folder;
use foldertree_service::{
    CreateFolderRequest, ExternalSyncService, FolderService, RequestContext, TreeService,
};

/// A workspace with a root folder and the services wired to one store.
pub struct TestTree {
    /// Store shared by all services.
    pub store: Arc<dyn FolderTreeStore>,
    /// Mutations.
    pub folders: FolderService,
    /// Read views.
    pub tree: TreeService,
    /// External imports.
    pub sync: ExternalSyncService,
    /// Request context of the workspace.
    pub ctx: RequestContext,
    /// The workspace root.
    pub root: Folder,
}

impl TestTree {
    /// Create a workspace with default settings.
    pub async fn new() -> Self {
        Self::with_config(TreeConfig::default()).await
    }

    /// Create a workspace with custom settings.
    pub async fn with_config(config: TreeConfig) -> Self {
        let store: Arc<dyn FolderTreeStore> = Arc::new(MemoryFolderTreeStore::new());
        Self::on_store(store, config).await
    }

    /// Create another workspace on an existing store.
    pub async fn on_store(store: Arc<dyn FolderTreeStore>, config: TreeConfig) -> Self {
        let folders = FolderService::new(store.clone(), config.clone());
        let tree = TreeService::new(store.clone());
        let sync = ExternalSyncService::new(store.clone(), config);
        let ctx = RequestContext::new(WorkspaceId::new());
        let root = folders
            .create_root(&ctx)
            .await
            .expect("Failed to create root folder");
        Self {
            store,
            folders,
            tree,
            sync,
            ctx,
            root,
        }
    }

    /// Create a folder under `parent`.
    pub async fn add(&self, parent: FolderId, name: &str) -> FolderId {
        self.folders
            .create_folder(
                &self.ctx,
                CreateFolderRequest {
                    parent_id: Some(parent),
                    name: name.to_string(),
                },
            )
            .await
            .expect("Failed to create folder")
            .id
    }

    /// Ancestor ids of a folder, root first.
    pub async fn ancestor_ids(&self, folder_id: FolderId) -> Vec<FolderId> {
        self.tree
            .ancestors(&self.ctx, folder_id)
            .await
            .expect("Failed to list ancestors")
            .into_iter()
            .map(|o| o.folder.id)
            .collect()
    }

    /// Distance from `ancestor` to `descendant`, if one reaches the other.
    pub async fn distance(&self, ancestor: FolderId, descendant: FolderId) -> Option<i32> {
        self.store
            .find_edges(self.ctx.workspace_id)
            .await
            .expect("Failed to list closure rows")
            .into_iter()
            .find(|e| e.ancestor_id == ancestor && e.descendant_id == descendant)
            .map(|e| e.distance)
    }

    /// Assert that the closure index satisfies every invariant.
    pub async fn assert_consistent(&self) {
        let report = self
            .tree
            .verify(&self.ctx)
            .await
            .expect("Failed to verify tree");
        assert!(report.is_consistent(), "{:?}", report.violations);
    }
}
