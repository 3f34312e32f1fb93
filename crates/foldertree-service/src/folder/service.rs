//! Folder mutations: creation, renaming, moving and subtree deletion.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use foldertree_core::config::TreeConfig;
use foldertree_core::error::{AppError, ErrorKind};
use foldertree_core::result::AppResult;
use foldertree_core::traits::DocumentStore;
use foldertree_core::types::{DocumentId, FolderId};
use foldertree_database::{FolderTreeStore, SiblingNames};
use foldertree_entity::folder::{CreateFolder, Folder};

use super::name::validate_name;
use crate::context::RequestContext;
use crate::retry::{retry_transient, retry_when};

/// Manages folder mutations within a workspace.
#[derive(Debug, Clone)]
pub struct FolderService {
    /// Folder tree store.
    store: Arc<dyn FolderTreeStore>,
    /// Naming rules, batch size and retry budget.
    config: TreeConfig,
    /// Owner of the documents filed in folders.
    documents: Option<Arc<dyn DocumentStore>>,
}

/// Request to create a new folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFolderRequest {
    /// Parent folder ID; the workspace root when absent.
    pub parent_id: Option<FolderId>,
    /// Folder name.
    pub name: String,
}

/// Result of deleting a subtree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteSummary {
    /// Folders removed, in deletion order.
    pub folders: Vec<FolderId>,
    /// Documents the document store removed along with them.
    pub documents: Vec<DocumentId>,
    /// Number of transactions the deletion took.
    pub chunks: usize,
}

/// Documents of already-deleted folders that the document store did not
/// remove. Carried as the source of an `ExternalService` error so the
/// caller can hand `folder_ids` to [`FolderService::clean_documents`] later.
#[derive(Debug, Error)]
#[error("documents of {} deleted folder(s) were not removed: {source}", .folder_ids.len())]
pub struct PendingDocumentCleanup {
    /// Deleted folders whose documents may still exist.
    pub folder_ids: Vec<FolderId>,
    /// The last document store failure.
    pub source: AppError,
}

impl PendingDocumentCleanup {
    /// The pending cleanup carried by `err`, if any.
    pub fn from_error(err: &AppError) -> Option<&Self> {
        err.source.as_deref()?.downcast_ref()
    }
}

impl FolderService {
    /// Creates a new folder service.
    pub fn new(store: Arc<dyn FolderTreeStore>, config: TreeConfig) -> Self {
        Self {
            store,
            config,
            documents: None,
        }
    }

    /// Attach the document store notified after subtree deletions.
    pub fn with_document_store(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(documents);
        self
    }

    /// Creates the root folder of the workspace.
    pub async fn create_root(&self, ctx: &RequestContext) -> AppResult<Folder> {
        retry_transient(self.config.transaction_retries, "create_root", || {
            self.store.create_root(ctx.workspace_id)
        })
        .await
    }

    /// Gets the workspace root.
    pub async fn get_root(&self, ctx: &RequestContext) -> AppResult<Folder> {
        self.store
            .find_root(ctx.workspace_id)
            .await?
            .ok_or_else(|| AppError::not_found("Workspace has no root folder"))
    }

    /// Gets a live folder by ID.
    pub async fn get_folder(&self, ctx: &RequestContext, folder_id: FolderId) -> AppResult<Folder> {
        self.store
            .find_by_id(ctx.workspace_id, folder_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Folder {folder_id} not found")))
    }

    /// Lists every live folder of the workspace.
    pub async fn list_folders(&self, ctx: &RequestContext) -> AppResult<Vec<Folder>> {
        self.store.find_by_workspace(ctx.workspace_id).await
    }

    /// Lists live children of `parent_id` named `name`.
    pub async fn find_children_named(
        &self,
        ctx: &RequestContext,
        parent_id: FolderId,
        name: &str,
    ) -> AppResult<Vec<Folder>> {
        self.store
            .find_by_parent_and_name(ctx.workspace_id, parent_id, name.trim())
            .await
    }

    /// The parent of a folder, `None` for the root.
    pub async fn get_parent(
        &self,
        ctx: &RequestContext,
        folder_id: FolderId,
    ) -> AppResult<Option<Folder>> {
        let ancestors = self.store.find_ancestors(ctx.workspace_id, folder_id).await?;
        Ok(ancestors
            .into_iter()
            .find(|ordered| ordered.distance == 1)
            .map(|ordered| ordered.folder))
    }

    /// Creates a new folder.
    pub async fn create_folder(
        &self,
        ctx: &RequestContext,
        req: CreateFolderRequest,
    ) -> AppResult<Folder> {
        let name = validate_name(&self.config, &req.name)?;
        let parent = match req.parent_id {
            Some(parent_id) => self.get_folder(ctx, parent_id).await?,
            None => self.get_root(ctx).await?,
        };

        let data = CreateFolder::named(ctx.workspace_id, name);
        retry_transient(self.config.transaction_retries, "create_folder", || {
            self.store.create(parent.id, &data, SiblingNames::Unique)
        })
        .await
    }

    /// Renames a folder. The root cannot be renamed.
    pub async fn rename_folder(
        &self,
        ctx: &RequestContext,
        folder_id: FolderId,
        new_name: &str,
    ) -> AppResult<Folder> {
        let name = validate_name(&self.config, new_name)?;
        let folder = self.get_folder(ctx, folder_id).await?;
        if folder.is_root() {
            return Err(AppError::validation("The root folder cannot be renamed"));
        }
        if folder.name.as_deref() == Some(name.as_str()) {
            return Ok(folder);
        }

        retry_transient(self.config.transaction_retries, "rename_folder", || {
            self.store.rename(ctx.workspace_id, folder_id, &name)
        })
        .await
    }

    /// Moves a folder, with its whole subtree, under a new parent.
    ///
    /// A child of the new parent with the same name is a conflict; the
    /// store checks it inside the move's transaction.
    pub async fn move_folder(
        &self,
        ctx: &RequestContext,
        folder_id: FolderId,
        new_parent_id: FolderId,
    ) -> AppResult<Folder> {
        let folder = self.get_folder(ctx, folder_id).await?;
        let destination = self
            .store
            .find_ancestors(ctx.workspace_id, new_parent_id)
            .await?;
        if destination.iter().any(|ordered| ordered.folder.id == folder_id) {
            return Err(AppError::invalid_move(
                "Cannot move a folder into itself or one of its descendants",
            ));
        }

        retry_transient(self.config.transaction_retries, "move_folder", || {
            self.store
                .move_subtree(ctx.workspace_id, folder_id, new_parent_id)
        })
        .await?;

        info!(
            request_id = %ctx.request_id,
            folder_id = %folder_id,
            new_parent_id = %new_parent_id,
            "Folder move completed"
        );
        Ok(folder)
    }

    /// Deletes a folder and everything below it.
    ///
    /// Runs as a series of chunks of at most `delete_batch_size` folders,
    /// each in its own transaction. After every chunk the document store,
    /// when configured, removes the documents filed in the deleted folders,
    /// retrying with backoff. If a chunk fails the tree is still consistent
    /// and calling this again resumes where it stopped. If the document store
    /// keeps failing, the error is `ExternalService` and carries a
    /// [`PendingDocumentCleanup`] naming the folders still to clean.
    pub async fn delete_subtree(
        &self,
        ctx: &RequestContext,
        folder_id: FolderId,
    ) -> AppResult<DeleteSummary> {
        let mut summary = DeleteSummary::default();
        loop {
            let chunk = retry_transient(self.config.transaction_retries, "delete_subtree", || {
                self.store.delete_subtree_chunk(
                    ctx.workspace_id,
                    folder_id,
                    self.config.delete_batch_size,
                )
            })
            .await?;

            if !chunk.deleted.is_empty() {
                summary.chunks += 1;
                let removed = self.clean_documents(ctx, &chunk.deleted).await?;
                summary.documents.extend(removed);
            }
            summary.folders.extend_from_slice(&chunk.deleted);

            if chunk.is_complete() {
                break;
            }
            if chunk.deleted.is_empty() {
                return Err(AppError::internal(format!(
                    "Deletion of folder {folder_id} made no progress"
                )));
            }
        }

        info!(
            request_id = %ctx.request_id,
            folder_id = %folder_id,
            folders = summary.folders.len(),
            documents = summary.documents.len(),
            chunks = summary.chunks,
            "Subtree deleted"
        );
        Ok(summary)
    }

    /// Asks the document store to remove the documents filed in
    /// `folder_ids`, retrying any failure with backoff.
    ///
    /// Removal is idempotent, so ids from a failed deletion can be passed
    /// again. Without a document store this does nothing.
    pub async fn clean_documents(
        &self,
        ctx: &RequestContext,
        folder_ids: &[FolderId],
    ) -> AppResult<Vec<DocumentId>> {
        let Some(documents) = &self.documents else {
            return Ok(Vec::new());
        };
        retry_when(
            self.config.transaction_retries,
            "document_cleanup",
            |_| true,
            || documents.delete_in_folders(ctx.workspace_id, folder_ids),
        )
        .await
        .map_err(|e| {
            warn!(
                request_id = %ctx.request_id,
                folders = folder_ids.len(),
                error = %e,
                "Document cleanup failed"
            );
            AppError::with_source(
                ErrorKind::ExternalService,
                format!("Document cleanup failed for {} deleted folder(s)", folder_ids.len()),
                PendingDocumentCleanup {
                    folder_ids: folder_ids.to_vec(),
                    source: e,
                },
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use foldertree_core::error::ErrorKind;
    use foldertree_core::types::WorkspaceId;
    use foldertree_database::MemoryFolderTreeStore;

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingDocuments {
        calls: Mutex<Vec<Vec<FolderId>>>,
    }

    #[async_trait]
    impl DocumentStore for RecordingDocuments {
        async fn delete_in_folders(
            &self,
            _workspace_id: WorkspaceId,
            folder_ids: &[FolderId],
        ) -> AppResult<Vec<DocumentId>> {
            self.calls.lock().unwrap().push(folder_ids.to_vec());
            Ok(folder_ids.iter().map(|_| DocumentId::new()).collect())
        }
    }

    /// Fails the first `failures` calls, then removes one document per
    /// folder.
    #[derive(Debug, Default)]
    struct FlakyDocuments {
        failures: Mutex<u32>,
        cleaned: Mutex<Vec<FolderId>>,
    }

    impl FlakyDocuments {
        fn failing(failures: u32) -> Self {
            Self {
                failures: Mutex::new(failures),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl DocumentStore for FlakyDocuments {
        async fn delete_in_folders(
            &self,
            _workspace_id: WorkspaceId,
            folder_ids: &[FolderId],
        ) -> AppResult<Vec<DocumentId>> {
            {
                let mut failures = self.failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(AppError::external_service("document index unavailable"));
                }
            }
            self.cleaned.lock().unwrap().extend_from_slice(folder_ids);
            Ok(folder_ids.iter().map(|_| DocumentId::new()).collect())
        }
    }

    fn service(config: TreeConfig) -> FolderService {
        FolderService::new(Arc::new(MemoryFolderTreeStore::new()), config)
    }

    async fn create(
        svc: &FolderService,
        ctx: &RequestContext,
        parent: Option<FolderId>,
        name: &str,
    ) -> Folder {
        svc.create_folder(
            ctx,
            CreateFolderRequest {
                parent_id: parent,
                name: name.to_string(),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_without_parent_uses_root() {
        let svc = service(TreeConfig::default());
        let ctx = RequestContext::new(WorkspaceId::new());
        let root = svc.create_root(&ctx).await.unwrap();

        let docs = create(&svc, &ctx, None, "Docs").await;
        assert_eq!(svc.get_parent(&ctx, docs.id).await.unwrap(), Some(root));
    }

    #[tokio::test]
    async fn test_create_without_root_is_not_found() {
        let svc = service(TreeConfig::default());
        let ctx = RequestContext::new(WorkspaceId::new());
        let err = svc
            .create_folder(
                &ctx,
                CreateFolderRequest {
                    parent_id: None,
                    name: "Docs".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_duplicate_sibling_name_conflicts() {
        let svc = service(TreeConfig::default());
        let ctx = RequestContext::new(WorkspaceId::new());
        svc.create_root(&ctx).await.unwrap();
        create(&svc, &ctx, None, "Docs").await;

        let err = svc
            .create_folder(
                &ctx,
                CreateFolderRequest {
                    parent_id: None,
                    name: " Docs ".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_rename_rules() {
        let svc = service(TreeConfig::default());
        let ctx = RequestContext::new(WorkspaceId::new());
        let root = svc.create_root(&ctx).await.unwrap();
        let a = create(&svc, &ctx, None, "A").await;
        create(&svc, &ctx, None, "B").await;

        let renamed = svc.rename_folder(&ctx, a.id, "A2").await.unwrap();
        assert_eq!(renamed.name.as_deref(), Some("A2"));

        let err = svc.rename_folder(&ctx, a.id, "B").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        let err = svc.rename_folder(&ctx, a.id, "a|b").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let err = svc.rename_folder(&ctx, root.id, "Top").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_move_into_descendant_is_invalid() {
        let svc = service(TreeConfig::default());
        let ctx = RequestContext::new(WorkspaceId::new());
        svc.create_root(&ctx).await.unwrap();
        let a = create(&svc, &ctx, None, "A").await;
        let b = create(&svc, &ctx, Some(a.id), "B").await;

        let err = svc.move_folder(&ctx, a.id, b.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidMove);
        let err = svc.move_folder(&ctx, a.id, a.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidMove);
    }

    #[tokio::test]
    async fn test_move_to_missing_parent_is_not_found() {
        let svc = service(TreeConfig::default());
        let ctx = RequestContext::new(WorkspaceId::new());
        svc.create_root(&ctx).await.unwrap();
        let a = create(&svc, &ctx, None, "A").await;

        let err = svc
            .move_folder(&ctx, a.id, FolderId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_runs_in_chunks_and_notifies_documents() {
        let config = TreeConfig {
            delete_batch_size: 2,
            ..TreeConfig::default()
        };
        let documents = Arc::new(RecordingDocuments::default());
        let svc = service(config).with_document_store(documents.clone());
        let ctx = RequestContext::new(WorkspaceId::new());
        svc.create_root(&ctx).await.unwrap();
        let x = create(&svc, &ctx, None, "X").await;
        let x1 = create(&svc, &ctx, Some(x.id), "X1").await;
        create(&svc, &ctx, Some(x.id), "X2").await;
        create(&svc, &ctx, Some(x1.id), "X11").await;
        create(&svc, &ctx, Some(x1.id), "X12").await;

        let summary = svc.delete_subtree(&ctx, x.id).await.unwrap();
        assert_eq!(summary.folders.len(), 5);
        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.documents.len(), 5);
        assert_eq!(summary.folders.last(), Some(&x.id));

        let calls = documents.calls.lock().unwrap();
        assert_eq!(calls.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);
        drop(calls);

        assert_eq!(svc.list_folders(&ctx).await.unwrap().len(), 1);
        let again = svc.delete_subtree(&ctx, x.id).await.unwrap();
        assert!(again.folders.is_empty());
    }

    #[tokio::test]
    async fn test_delete_root_is_rejected() {
        let svc = service(TreeConfig::default());
        let ctx = RequestContext::new(WorkspaceId::new());
        let root = svc.create_root(&ctx).await.unwrap();

        let err = svc.delete_subtree(&ctx, root.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(svc.get_root(&ctx).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_retries_failed_document_cleanup() {
        let config = TreeConfig {
            delete_batch_size: 2,
            ..TreeConfig::default()
        };
        let documents = Arc::new(FlakyDocuments::failing(1));
        let svc = service(config).with_document_store(documents.clone());
        let ctx = RequestContext::new(WorkspaceId::new());
        svc.create_root(&ctx).await.unwrap();
        let x = create(&svc, &ctx, None, "X").await;
        for name in ["X1", "X2", "X3"] {
            create(&svc, &ctx, Some(x.id), name).await;
        }

        let summary = svc.delete_subtree(&ctx, x.id).await.unwrap();
        assert_eq!(summary.folders.len(), 4);

        let mut cleaned = documents.cleaned.lock().unwrap().clone();
        let mut deleted = summary.folders.clone();
        cleaned.sort();
        deleted.sort();
        assert_eq!(cleaned, deleted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_cleanup_reports_pending_folders() {
        let config = TreeConfig {
            delete_batch_size: 2,
            transaction_retries: 1,
            ..TreeConfig::default()
        };
        let documents = Arc::new(FlakyDocuments::failing(2));
        let svc = service(config).with_document_store(documents.clone());
        let ctx = RequestContext::new(WorkspaceId::new());
        svc.create_root(&ctx).await.unwrap();
        let x = create(&svc, &ctx, None, "X").await;
        for name in ["X1", "X2", "X3"] {
            create(&svc, &ctx, Some(x.id), name).await;
        }

        let err = svc.delete_subtree(&ctx, x.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ExternalService);
        let pending = PendingDocumentCleanup::from_error(&err)
            .unwrap()
            .folder_ids
            .clone();
        assert_eq!(pending.len(), 2);

        svc.clean_documents(&ctx, &pending).await.unwrap();
        let rest = svc.delete_subtree(&ctx, x.id).await.unwrap();
        assert_eq!(rest.folders.len(), 2);

        let cleaned: HashSet<FolderId> = documents.cleaned.lock().unwrap().iter().copied().collect();
        let deleted: HashSet<FolderId> = pending.into_iter().chain(rest.folders).collect();
        assert_eq!(cleaned, deleted);
        assert!(cleaned.contains(&x.id));
    }
}
