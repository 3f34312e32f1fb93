//! Transactional folder tree repository backed by PostgreSQL.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use foldertree_core::error::{AppError, ErrorKind};
use foldertree_core::result::AppResult;
use foldertree_core::types::{FolderId, WorkspaceId};
use foldertree_entity::folder::{
    ClosureEdge, CreateFolder, ExternalSystemType, Folder, NewClosureEdge, OrderedFolder,
};

use super::{closure as paths, folder as folders};
use crate::closure;
use crate::store::{FolderTreeStore, SiblingNames, SubtreeDeletion};

/// Lock wait used when none is configured.
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Folder tree repository: the single writer of `folders` and
/// `folder_paths`.
///
/// Each mutation opens a transaction, takes the workspace advisory lock,
/// applies its folder and closure changes and commits. An error anywhere
/// drops the transaction, which rolls it back.
#[derive(Debug, Clone)]
pub struct FolderTreeRepository {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl FolderTreeRepository {
    /// Create a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    /// Set how long a mutation waits for the workspace lock.
    pub fn with_lock_timeout(mut self, lock_timeout_ms: u64) -> Self {
        self.lock_timeout_ms = lock_timeout_ms;
        self
    }

    async fn connection(&self) -> AppResult<PoolConnection<Postgres>> {
        self.pool.acquire().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to acquire connection", e)
        })
    }

    /// Begin a transaction holding the workspace tree lock.
    async fn begin_locked(
        &self,
        workspace_id: WorkspaceId,
    ) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;
        paths::lock_workspace(&mut tx, workspace_id, self.lock_timeout_ms).await?;
        Ok(tx)
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> AppResult<()> {
        tx.commit()
            .await
            .map_err(|e| super::map_db_error(e, "Failed to commit transaction"))
    }
}

async fn require_live(
    conn: &mut sqlx::PgConnection,
    workspace_id: WorkspaceId,
    folder_id: FolderId,
) -> AppResult<Folder> {
    folders::find_by_id(conn, workspace_id, folder_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Folder {folder_id} not found")))
}

/// Fails with `Conflict` when a live child of `parent_id` other than
/// `except` is named `name`. Must run under the workspace lock.
async fn ensure_name_free(
    conn: &mut sqlx::PgConnection,
    workspace_id: WorkspaceId,
    parent_id: FolderId,
    name: &str,
    except: Option<FolderId>,
) -> AppResult<()> {
    let siblings = folders::find_by_parent_and_name(conn, workspace_id, parent_id, name).await?;
    if siblings.iter().any(|s| Some(s.id) != except) {
        return Err(AppError::conflict(format!(
            "A folder named '{name}' already exists here"
        )));
    }
    Ok(())
}

#[async_trait]
impl FolderTreeStore for FolderTreeRepository {
    async fn create_root(&self, workspace_id: WorkspaceId) -> AppResult<Folder> {
        let mut tx = self.begin_locked(workspace_id).await?;

        if !folders::find_roots(&mut tx, workspace_id).await?.is_empty() {
            return Err(AppError::conflict("Workspace already has a root folder"));
        }

        let id = FolderId::new();
        let root = folders::insert(&mut tx, id, &CreateFolder::root(workspace_id)).await?;
        paths::insert_many(&mut tx, &[NewClosureEdge::self_edge(id)]).await?;
        Self::commit(tx).await?;

        info!(workspace_id = %workspace_id, folder_id = %id, "Root folder created");
        Ok(root)
    }

    async fn create(
        &self,
        parent_id: FolderId,
        data: &CreateFolder,
        names: SiblingNames,
    ) -> AppResult<Folder> {
        let Some(name) = data.name.as_deref() else {
            return Err(AppError::validation("Folder name is required"));
        };
        let workspace_id = data.workspace_id;
        let mut tx = self.begin_locked(workspace_id).await?;

        require_live(&mut tx, workspace_id, parent_id).await?;
        if names == SiblingNames::Unique {
            ensure_name_free(&mut tx, workspace_id, parent_id, name, None).await?;
        }
        let chain = paths::find_chain(&mut tx, parent_id).await?;

        let id = FolderId::new();
        let folder = folders::insert(&mut tx, id, data).await?;
        paths::insert_many(&mut tx, &closure::edges_for_child(&chain, id)).await?;
        Self::commit(tx).await?;

        info!(
            workspace_id = %workspace_id,
            folder_id = %id,
            parent_id = %parent_id,
            depth = chain.len(),
            "Folder created"
        );
        Ok(folder)
    }

    async fn rename(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
        name: &str,
    ) -> AppResult<Folder> {
        let mut tx = self.begin_locked(workspace_id).await?;

        let current = require_live(&mut tx, workspace_id, folder_id).await?;
        if current.is_root() {
            return Err(AppError::validation("The root folder cannot be renamed"));
        }
        let parent = paths::find_chain(&mut tx, folder_id)
            .await?
            .into_iter()
            .find(|link| link.distance == 1);
        if let Some(parent) = parent {
            ensure_name_free(&mut tx, workspace_id, parent.ancestor_id, name, Some(folder_id))
                .await?;
        }
        let folder = folders::rename(&mut tx, workspace_id, folder_id, name)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Folder {folder_id} not found")))?;
        Self::commit(tx).await?;

        info!(folder_id = %folder_id, name = %name, "Folder renamed");
        Ok(folder)
    }

    async fn update_external(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
        name: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Folder> {
        let mut tx = self.begin_locked(workspace_id).await?;

        let current = require_live(&mut tx, workspace_id, folder_id).await?;
        if current.is_root() {
            debug!(folder_id = %folder_id, "Ignoring external update of root folder");
            return Ok(current);
        }
        let folder = folders::update_external(&mut tx, workspace_id, folder_id, name, updated_at)
            .await?
            .ok_or_else(|| {
                AppError::validation(format!("Folder {folder_id} was not created by a sync"))
            })?;
        Self::commit(tx).await?;

        debug!(folder_id = %folder_id, "Synced folder refreshed");
        Ok(folder)
    }

    async fn find_by_id(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Option<Folder>> {
        let mut conn = self.connection().await?;
        folders::find_by_id(&mut conn, workspace_id, folder_id).await
    }

    async fn find_by_id_with_deleted(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Option<Folder>> {
        let mut conn = self.connection().await?;
        folders::find_by_id_with_deleted(&mut conn, workspace_id, folder_id).await
    }

    async fn find_by_workspace(&self, workspace_id: WorkspaceId) -> AppResult<Vec<Folder>> {
        let mut conn = self.connection().await?;
        folders::find_by_workspace(&mut conn, workspace_id).await
    }

    async fn find_by_parent_and_name(
        &self,
        workspace_id: WorkspaceId,
        parent_id: FolderId,
        name: &str,
    ) -> AppResult<Vec<Folder>> {
        let mut conn = self.connection().await?;
        folders::find_by_parent_and_name(&mut conn, workspace_id, parent_id, name).await
    }

    async fn find_by_external_id(
        &self,
        workspace_id: WorkspaceId,
        system: ExternalSystemType,
        external_id: &str,
    ) -> AppResult<Option<Folder>> {
        let mut conn = self.connection().await?;
        folders::find_by_external_id(&mut conn, workspace_id, system, external_id).await
    }

    async fn find_root(&self, workspace_id: WorkspaceId) -> AppResult<Option<Folder>> {
        let mut conn = self.connection().await?;
        let mut roots = folders::find_roots(&mut conn, workspace_id).await?;
        if roots.len() > 1 {
            return Err(AppError::internal(format!(
                "Workspace {workspace_id} has {} root folders",
                roots.len()
            )));
        }
        Ok(roots.pop())
    }

    async fn find_ancestors(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Vec<OrderedFolder>> {
        let mut conn = self.connection().await?;
        require_live(&mut conn, workspace_id, folder_id).await?;
        let rows = paths::find_ancestor_rows(&mut conn, workspace_id, folder_id).await?;
        Ok(closure::rank_ancestors(rows))
    }

    async fn find_descendants(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Vec<OrderedFolder>> {
        let mut conn = self.connection().await?;
        require_live(&mut conn, workspace_id, folder_id).await?;
        let rows = paths::find_descendant_rows(&mut conn, workspace_id, folder_id).await?;
        Ok(closure::rank_descendants(rows))
    }

    async fn descendant_ids(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Vec<FolderId>> {
        let mut conn = self.connection().await?;
        require_live(&mut conn, workspace_id, folder_id).await?;
        paths::find_descendant_ids(&mut conn, folder_id).await
    }

    async fn find_child_links(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Vec<NewClosureEdge>> {
        let mut conn = self.connection().await?;
        require_live(&mut conn, workspace_id, folder_id).await?;
        paths::find_child_links(&mut conn, folder_id).await
    }

    async fn move_subtree(
        &self,
        workspace_id: WorkspaceId,
        subtree_root_id: FolderId,
        new_parent_id: FolderId,
    ) -> AppResult<()> {
        let mut tx = self.begin_locked(workspace_id).await?;

        let folder = require_live(&mut tx, workspace_id, subtree_root_id).await?;
        require_live(&mut tx, workspace_id, new_parent_id).await?;

        if subtree_root_id == new_parent_id
            || paths::edge_exists(&mut tx, subtree_root_id, new_parent_id).await?
        {
            return Err(AppError::invalid_move(
                "Cannot move a folder into itself or one of its descendants",
            ));
        }

        let current_chain = paths::find_chain(&mut tx, subtree_root_id).await?;
        if current_chain
            .iter()
            .any(|link| link.distance == 1 && link.ancestor_id == new_parent_id)
        {
            debug!(folder_id = %subtree_root_id, "Folder already under destination");
            return Self::commit(tx).await;
        }
        if let Some(name) = folder.name.as_deref() {
            ensure_name_free(&mut tx, workspace_id, new_parent_id, name, Some(subtree_root_id))
                .await?;
        }

        let subtree = paths::find_subtree_for_update(&mut tx, subtree_root_id).await?;
        let members: Vec<FolderId> = subtree.iter().map(|link| link.descendant_id).collect();
        let severed = paths::delete_severed(&mut tx, &members).await?;

        let chain = paths::find_chain(&mut tx, new_parent_id).await?;
        let inserted = paths::insert_many(&mut tx, &closure::plan_move(&chain, &subtree)).await?;
        Self::commit(tx).await?;

        info!(
            workspace_id = %workspace_id,
            folder_id = %subtree_root_id,
            new_parent_id = %new_parent_id,
            subtree_size = members.len(),
            severed,
            inserted,
            "Folder moved"
        );
        Ok(())
    }

    async fn delete_subtree_chunk(
        &self,
        workspace_id: WorkspaceId,
        subtree_root_id: FolderId,
        max_folders: usize,
    ) -> AppResult<SubtreeDeletion> {
        let mut tx = self.begin_locked(workspace_id).await?;

        let root = folders::find_by_id_with_deleted(&mut tx, workspace_id, subtree_root_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Folder {subtree_root_id} not found")))?;
        if !root.is_live() {
            return Ok(SubtreeDeletion::default());
        }
        if root.is_root() {
            return Err(AppError::validation("The root folder cannot be deleted"));
        }

        let subtree = paths::find_subtree_for_update(&mut tx, subtree_root_id).await?;
        let batch = closure::deletion_batch(&subtree, max_folders.max(1));
        let unique: HashSet<FolderId> = subtree.iter().map(|link| link.descendant_id).collect();

        folders::soft_delete_many(&mut tx, &batch).await?;
        let edges_removed = paths::delete_touching(&mut tx, &batch).await?;
        Self::commit(tx).await?;

        let remaining = unique.len().saturating_sub(batch.len());
        info!(
            workspace_id = %workspace_id,
            folder_id = %subtree_root_id,
            deleted = batch.len(),
            edges_removed,
            remaining,
            "Subtree chunk deleted"
        );
        Ok(SubtreeDeletion {
            deleted: batch,
            remaining,
        })
    }

    async fn find_edges(&self, workspace_id: WorkspaceId) -> AppResult<Vec<ClosureEdge>> {
        let mut conn = self.connection().await?;
        paths::find_by_workspace(&mut conn, workspace_id).await
    }
}
