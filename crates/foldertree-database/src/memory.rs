//! In-process folder tree store.
//!
//! Holds folders and closure rows behind one async mutex. A mutation works
//! on a copy of the state and swaps it in only when it succeeds, so a failed
//! call leaves nothing behind, like a rolled-back transaction.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use foldertree_core::error::AppError;
use foldertree_core::result::AppResult;
use foldertree_core::types::{ClosureEdgeId, FolderId, WorkspaceId};
use foldertree_entity::folder::{
    ClosureEdge, CreateFolder, ExternalSystemType, Folder, NewClosureEdge, OrderedFolder,
};

use crate::closure;
use crate::store::{FolderTreeStore, SiblingNames, SubtreeDeletion};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    folders: BTreeMap<FolderId, Folder>,
    edges: BTreeMap<(FolderId, FolderId), ClosureEdge>,
}

impl MemoryState {
    fn live(&self, workspace_id: WorkspaceId, folder_id: FolderId) -> Option<&Folder> {
        self.folders
            .get(&folder_id)
            .filter(|f| f.workspace_id == workspace_id && f.is_live())
    }

    fn require_live(&self, workspace_id: WorkspaceId, folder_id: FolderId) -> AppResult<Folder> {
        self.live(workspace_id, folder_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Folder {folder_id} not found")))
    }

    fn chain(&self, folder_id: FolderId) -> Vec<NewClosureEdge> {
        self.edges
            .values()
            .filter(|e| e.descendant_id == folder_id)
            .map(ClosureEdge::link)
            .collect()
    }

    fn subtree(&self, folder_id: FolderId) -> Vec<NewClosureEdge> {
        self.edges
            .range((folder_id, FolderId::from_uuid(uuid::Uuid::nil()))..)
            .take_while(|((ancestor, _), _)| *ancestor == folder_id)
            .map(|(_, e)| e.link())
            .collect()
    }

    fn children_named(
        &self,
        workspace_id: WorkspaceId,
        parent_id: FolderId,
        name: &str,
    ) -> Vec<Folder> {
        self.subtree(parent_id)
            .into_iter()
            .filter(|link| link.distance == 1)
            .filter_map(|link| self.live(workspace_id, link.descendant_id))
            .filter(|f| f.name.as_deref() == Some(name))
            .cloned()
            .collect()
    }

    fn ensure_name_free(
        &self,
        workspace_id: WorkspaceId,
        parent_id: FolderId,
        name: &str,
        except: Option<FolderId>,
    ) -> AppResult<()> {
        let taken = self
            .children_named(workspace_id, parent_id, name)
            .iter()
            .any(|f| Some(f.id) != except);
        if taken {
            return Err(AppError::conflict(format!(
                "A folder named '{name}' already exists here"
            )));
        }
        Ok(())
    }

    fn parent_of(&self, folder_id: FolderId) -> Option<FolderId> {
        self.chain(folder_id)
            .into_iter()
            .find(|link| link.distance == 1)
            .map(|link| link.ancestor_id)
    }

    fn roots(&self, workspace_id: WorkspaceId) -> Vec<Folder> {
        self.folders
            .values()
            .filter(|f| f.workspace_id == workspace_id && f.is_live())
            .filter(|f| self.chain(f.id).len() == 1)
            .cloned()
            .collect()
    }

    fn insert_edges(&mut self, edges: &[NewClosureEdge]) -> AppResult<()> {
        let now = Utc::now();
        for link in edges {
            let key = (link.ancestor_id, link.descendant_id);
            if self.edges.contains_key(&key) {
                return Err(AppError::internal(format!(
                    "Closure row {} -> {} already exists",
                    link.ancestor_id, link.descendant_id
                )));
            }
            self.edges.insert(key, link.into_edge(ClosureEdgeId::new(), now));
        }
        Ok(())
    }

    fn insert_folder(&mut self, data: &CreateFolder) -> Folder {
        let folder = Folder::from_create(FolderId::new(), data, Utc::now());
        self.folders.insert(folder.id, folder.clone());
        folder
    }

    fn with_distance(
        &self,
        workspace_id: WorkspaceId,
        rows: Vec<(FolderId, i32)>,
    ) -> Vec<(Folder, i32)> {
        rows.into_iter()
            .filter_map(|(id, distance)| {
                self.live(workspace_id, id).cloned().map(|f| (f, distance))
            })
            .collect()
    }
}

/// Folder tree store kept entirely in memory.
///
/// Used by tests and by tools that do not need persistence. Cloning shares
/// the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryFolderTreeStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryFolderTreeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` against a copy of the state and keep the copy on success.
    async fn mutate<T>(&self, op: impl FnOnce(&mut MemoryState) -> AppResult<T>) -> AppResult<T> {
        let mut guard = self.state.lock().await;
        let mut working = guard.clone();
        let value = op(&mut working)?;
        *guard = working;
        Ok(value)
    }
}

#[async_trait]
impl FolderTreeStore for MemoryFolderTreeStore {
    async fn create_root(&self, workspace_id: WorkspaceId) -> AppResult<Folder> {
        let root = self
            .mutate(|state| {
                if !state.roots(workspace_id).is_empty() {
                    return Err(AppError::conflict("Workspace already has a root folder"));
                }
                let root = state.insert_folder(&CreateFolder::root(workspace_id));
                state.insert_edges(&[NewClosureEdge::self_edge(root.id)])?;
                Ok(root)
            })
            .await?;
        info!(workspace_id = %workspace_id, folder_id = %root.id, "Root folder created");
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
        let folder = self
            .mutate(|state| {
                state.require_live(data.workspace_id, parent_id)?;
                if names == SiblingNames::Unique {
                    state.ensure_name_free(data.workspace_id, parent_id, name, None)?;
                }
                let chain = state.chain(parent_id);
                let folder = state.insert_folder(data);
                state.insert_edges(&closure::edges_for_child(&chain, folder.id))?;
                Ok(folder)
            })
            .await?;
        info!(folder_id = %folder.id, parent_id = %parent_id, "Folder created");
        Ok(folder)
    }

    async fn rename(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
        name: &str,
    ) -> AppResult<Folder> {
        self.mutate(|state| {
            let mut folder = state.require_live(workspace_id, folder_id)?;
            if folder.is_root() {
                return Err(AppError::validation("The root folder cannot be renamed"));
            }
            if let Some(parent_id) = state.parent_of(folder_id) {
                state.ensure_name_free(workspace_id, parent_id, name, Some(folder_id))?;
            }
            folder.name = Some(name.to_string());
            state.folders.insert(folder_id, folder.clone());
            Ok(folder)
        })
        .await
    }

    async fn update_external(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
        name: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Folder> {
        self.mutate(|state| {
            let mut folder = state.require_live(workspace_id, folder_id)?;
            if folder.is_root() {
                debug!(folder_id = %folder_id, "Ignoring external update of root folder");
                return Ok(folder);
            }
            if !folder.is_external() {
                return Err(AppError::validation(format!(
                    "Folder {folder_id} was not created by a sync"
                )));
            }
            if let Some(name) = name {
                folder.name = Some(name.to_string());
            }
            folder.external_updated_at = Some(updated_at);
            state.folders.insert(folder_id, folder.clone());
            Ok(folder)
        })
        .await
    }

    async fn find_by_id(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Option<Folder>> {
        let state = self.state.lock().await;
        Ok(state.live(workspace_id, folder_id).cloned())
    }

    async fn find_by_id_with_deleted(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Option<Folder>> {
        let state = self.state.lock().await;
        Ok(state
            .folders
            .get(&folder_id)
            .filter(|f| f.workspace_id == workspace_id)
            .cloned())
    }

    async fn find_by_workspace(&self, workspace_id: WorkspaceId) -> AppResult<Vec<Folder>> {
        let state = self.state.lock().await;
        let mut folders: Vec<Folder> = state
            .folders
            .values()
            .filter(|f| f.workspace_id == workspace_id && f.is_live())
            .cloned()
            .collect();
        folders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(folders)
    }

    async fn find_by_parent_and_name(
        &self,
        workspace_id: WorkspaceId,
        parent_id: FolderId,
        name: &str,
    ) -> AppResult<Vec<Folder>> {
        let state = self.state.lock().await;
        Ok(state.children_named(workspace_id, parent_id, name))
    }

    async fn find_by_external_id(
        &self,
        workspace_id: WorkspaceId,
        system: ExternalSystemType,
        external_id: &str,
    ) -> AppResult<Option<Folder>> {
        let state = self.state.lock().await;
        Ok(state
            .folders
            .values()
            .filter(|f| f.workspace_id == workspace_id && f.is_live())
            .filter(|f| f.external_type == Some(system))
            .filter(|f| f.external_id.as_deref() == Some(external_id))
            .min_by_key(|f| f.created_at)
            .cloned())
    }

    async fn find_root(&self, workspace_id: WorkspaceId) -> AppResult<Option<Folder>> {
        let state = self.state.lock().await;
        let mut roots = state.roots(workspace_id);
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
        let state = self.state.lock().await;
        state.require_live(workspace_id, folder_id)?;
        let rows = state
            .chain(folder_id)
            .into_iter()
            .map(|link| (link.ancestor_id, link.distance))
            .collect();
        Ok(closure::rank_ancestors(state.with_distance(workspace_id, rows)))
    }

    async fn find_descendants(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Vec<OrderedFolder>> {
        let state = self.state.lock().await;
        state.require_live(workspace_id, folder_id)?;
        let rows = state
            .subtree(folder_id)
            .into_iter()
            .filter(|link| link.distance > 0)
            .map(|link| (link.descendant_id, link.distance))
            .collect();
        Ok(closure::rank_descendants(state.with_distance(workspace_id, rows)))
    }

    async fn descendant_ids(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Vec<FolderId>> {
        let state = self.state.lock().await;
        state.require_live(workspace_id, folder_id)?;
        let mut links = state.subtree(folder_id);
        links.sort_by(|a, b| {
            a.distance
                .cmp(&b.distance)
                .then(a.descendant_id.cmp(&b.descendant_id))
        });
        Ok(links.into_iter().map(|link| link.descendant_id).collect())
    }

    async fn find_child_links(
        &self,
        workspace_id: WorkspaceId,
        folder_id: FolderId,
    ) -> AppResult<Vec<NewClosureEdge>> {
        let state = self.state.lock().await;
        state.require_live(workspace_id, folder_id)?;
        let members: HashSet<FolderId> = state
            .subtree(folder_id)
            .into_iter()
            .filter(|link| link.distance > 0)
            .map(|link| link.descendant_id)
            .collect();
        Ok(state
            .edges
            .values()
            .filter(|e| e.is_direct() && members.contains(&e.descendant_id))
            .map(ClosureEdge::link)
            .collect())
    }

    async fn move_subtree(
        &self,
        workspace_id: WorkspaceId,
        subtree_root_id: FolderId,
        new_parent_id: FolderId,
    ) -> AppResult<()> {
        let moved = self
            .mutate(|state| {
                let folder = state.require_live(workspace_id, subtree_root_id)?;
                state.require_live(workspace_id, new_parent_id)?;

                if subtree_root_id == new_parent_id
                    || state.edges.contains_key(&(subtree_root_id, new_parent_id))
                {
                    return Err(AppError::invalid_move(
                        "Cannot move a folder into itself or one of its descendants",
                    ));
                }
                if state
                    .edges
                    .get(&(new_parent_id, subtree_root_id))
                    .is_some_and(ClosureEdge::is_direct)
                {
                    return Ok(0);
                }
                if let Some(name) = folder.name.as_deref() {
                    state.ensure_name_free(
                        workspace_id,
                        new_parent_id,
                        name,
                        Some(subtree_root_id),
                    )?;
                }

                let subtree = state.subtree(subtree_root_id);
                let members: HashSet<FolderId> =
                    subtree.iter().map(|link| link.descendant_id).collect();
                state
                    .edges
                    .retain(|_, edge| !closure::is_severed(&edge.link(), &members));

                let chain = state.chain(new_parent_id);
                state.insert_edges(&closure::plan_move(&chain, &subtree))?;
                Ok(members.len())
            })
            .await?;
        info!(
            folder_id = %subtree_root_id,
            new_parent_id = %new_parent_id,
            subtree_size = moved,
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
        self.mutate(|state| {
            let root = state
                .folders
                .get(&subtree_root_id)
                .filter(|f| f.workspace_id == workspace_id)
                .cloned()
                .ok_or_else(|| AppError::not_found(format!("Folder {subtree_root_id} not found")))?;
            if !root.is_live() {
                return Ok(SubtreeDeletion::default());
            }
            if root.is_root() {
                return Err(AppError::validation("The root folder cannot be deleted"));
            }

            let subtree = state.subtree(subtree_root_id);
            let batch = closure::deletion_batch(&subtree, max_folders.max(1));
            let removed: HashSet<FolderId> = batch.iter().copied().collect();
            let now = Utc::now();
            for id in &batch {
                if let Some(folder) = state.folders.get_mut(id) {
                    folder.deleted_at = Some(now);
                }
            }
            state.edges.retain(|(ancestor, descendant), _| {
                !removed.contains(ancestor) && !removed.contains(descendant)
            });

            Ok(SubtreeDeletion {
                remaining: subtree.len() - batch.len(),
                deleted: batch,
            })
        })
        .await
    }

    async fn find_edges(&self, workspace_id: WorkspaceId) -> AppResult<Vec<ClosureEdge>> {
        let state = self.state.lock().await;
        Ok(state
            .edges
            .values()
            .filter(|e| {
                state
                    .folders
                    .get(&e.descendant_id)
                    .is_some_and(|f| f.workspace_id == workspace_id)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use foldertree_core::error::ErrorKind;

    use super::*;

    async fn seeded() -> (MemoryFolderTreeStore, WorkspaceId, Folder) {
        let store = MemoryFolderTreeStore::new();
        let ws = WorkspaceId::new();
        let root = store.create_root(ws).await.unwrap();
        (store, ws, root)
    }

    async fn child(
        store: &MemoryFolderTreeStore,
        ws: WorkspaceId,
        parent: FolderId,
        name: &str,
    ) -> FolderId {
        store
            .create(parent, &CreateFolder::named(ws, name), SiblingNames::Unique)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_create_root_twice_conflicts() {
        let (store, ws, root) = seeded().await;
        let err = store.create_root(ws).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(store.find_root(ws).await.unwrap(), Some(root));
    }

    #[tokio::test]
    async fn test_create_under_foreign_parent_is_not_found() {
        let (store, _, root) = seeded().await;
        let other = WorkspaceId::new();
        let err = store
            .create(root.id, &CreateFolder::named(other, "x"), SiblingNames::Unique)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(store.find_by_workspace(other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subtree_range_stops_at_folder() {
        let (store, ws, root) = seeded().await;
        let a = child(&store, ws, root.id, "a").await;
        let b = child(&store, ws, root.id, "b").await;
        let a1 = child(&store, ws, a, "a1").await;

        let ids = store.descendant_ids(ws, a).await.unwrap();
        assert_eq!(ids, vec![a, a1]);
        let all = store.descendant_ids(ws, root.id).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.contains(&b));
    }

    #[tokio::test]
    async fn test_failed_move_leaves_state_untouched() {
        let (store, ws, root) = seeded().await;
        let a = child(&store, ws, root.id, "a").await;
        let b = child(&store, ws, a, "b").await;
        let before = store.find_edges(ws).await.unwrap();

        let err = store.move_subtree(ws, a, b).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidMove);
        assert_eq!(store.find_edges(ws).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_move_to_current_parent_is_noop() {
        let (store, ws, root) = seeded().await;
        let a = child(&store, ws, root.id, "a").await;
        let before = store.find_edges(ws).await.unwrap();

        store.move_subtree(ws, a, root.id).await.unwrap();
        assert_eq!(store.find_edges(ws).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_sibling_names_are_checked_with_the_write() {
        let (store, ws, root) = seeded().await;
        let a = child(&store, ws, root.id, "a").await;
        let b = child(&store, ws, root.id, "b").await;
        let inner = child(&store, ws, b, "a").await;

        let err = store
            .create(root.id, &CreateFolder::named(ws, "a"), SiblingNames::Unique)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        let err = store.rename(ws, b, "a").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        store.rename(ws, a, "a").await.unwrap();

        let before = store.find_edges(ws).await.unwrap();
        let err = store.move_subtree(ws, inner, root.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(store.find_edges(ws).await.unwrap(), before);

        store
            .create(root.id, &CreateFolder::named(ws, "a"), SiblingNames::AllowDuplicates)
            .await
            .unwrap();
        assert_eq!(store.find_by_parent_and_name(ws, root.id, "a").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_creates_keep_names_unique() {
        let (store, ws, root) = seeded().await;
        let attempts = (0..8).map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .create(root.id, &CreateFolder::named(ws, "x"), SiblingNames::Unique)
                    .await
            })
        });

        let mut created = 0;
        for attempt in attempts.collect::<Vec<_>>() {
            match attempt.await.unwrap() {
                Ok(_) => created += 1,
                Err(err) => assert_eq!(err.kind, ErrorKind::Conflict),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.find_by_parent_and_name(ws, root.id, "x").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_chunk_is_idempotent() {
        let (store, ws, root) = seeded().await;
        let a = child(&store, ws, root.id, "a").await;
        child(&store, ws, a, "a1").await;

        let first = store.delete_subtree_chunk(ws, a, 10).await.unwrap();
        assert_eq!(first.deleted.len(), 2);
        assert!(first.is_complete());

        let again = store.delete_subtree_chunk(ws, a, 10).await.unwrap();
        assert!(again.deleted.is_empty());
        assert!(again.is_complete());
        assert!(store.find_by_id_with_deleted(ws, a).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_external_ignores_root() {
        let (store, ws, root) = seeded().await;
        let updated = store
            .update_external(ws, root.id, Some("renamed"), Utc::now())
            .await
            .unwrap();
        assert!(updated.is_root());
    }
}
