//! Tree views: ancestor and descendant listings, paths, nested trees and
//! integrity checks.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use foldertree_core::error::AppError;
use foldertree_core::result::AppResult;
use foldertree_core::types::FolderId;
use foldertree_database::FolderTreeStore;
use foldertree_database::closure::{self, IntegrityReport};
use foldertree_entity::folder::{Folder, FolderNode, OrderedFolder};

use crate::context::RequestContext;

/// Separator the search layer expects between folder ids in a filter.
const FILTER_SEPARATOR: &str = ",";

/// Read-only views over a workspace tree.
#[derive(Debug, Clone)]
pub struct TreeService {
    /// Folder tree store.
    store: Arc<dyn FolderTreeStore>,
}

impl TreeService {
    /// Creates a new tree service.
    pub fn new(store: Arc<dyn FolderTreeStore>) -> Self {
        Self { store }
    }

    /// Ancestors of a folder, root first and the folder itself last.
    pub async fn ancestors(
        &self,
        ctx: &RequestContext,
        folder_id: FolderId,
    ) -> AppResult<Vec<OrderedFolder>> {
        self.store.find_ancestors(ctx.workspace_id, folder_id).await
    }

    /// Strict descendants of a folder, breadth-first.
    pub async fn descendants(
        &self,
        ctx: &RequestContext,
        folder_id: FolderId,
    ) -> AppResult<Vec<OrderedFolder>> {
        self.store.find_descendants(ctx.workspace_id, folder_id).await
    }

    /// The folder and every folder below it.
    pub async fn descendant_ids(
        &self,
        ctx: &RequestContext,
        folder_id: FolderId,
    ) -> AppResult<Vec<FolderId>> {
        self.store.descendant_ids(ctx.workspace_id, folder_id).await
    }

    /// The search filter value restricting results to a subtree: the
    /// subtree's folder ids joined with `,`.
    pub async fn descendant_filter(
        &self,
        ctx: &RequestContext,
        folder_id: FolderId,
    ) -> AppResult<String> {
        let ids = self.descendant_ids(ctx, folder_id).await?;
        Ok(ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(FILTER_SEPARATOR))
    }

    /// The absolute path of a folder, e.g. `Reports/2024/`.
    ///
    /// The unnamed root contributes nothing, so the root's own path is the
    /// empty string.
    pub async fn absolute_path(&self, ctx: &RequestContext, folder_id: FolderId) -> AppResult<String> {
        let ancestors = self.ancestors(ctx, folder_id).await?;
        Ok(path_of(ancestors.iter().map(|o| &o.folder)))
    }

    /// Builds the nested tree below (and including) a folder.
    ///
    /// Children are sorted by name; each node carries its absolute path.
    pub async fn get_tree(&self, ctx: &RequestContext, folder_id: FolderId) -> AppResult<FolderNode> {
        let ancestors = self.ancestors(ctx, folder_id).await?;
        let base_path = path_of(ancestors.iter().map(|o| &o.folder));
        let top = ancestors
            .into_iter()
            .last()
            .map(|o| o.folder)
            .ok_or_else(|| AppError::not_found(format!("Folder {folder_id} not found")))?;

        let descendants = self.descendants(ctx, folder_id).await?;
        let links = self
            .store
            .find_child_links(ctx.workspace_id, folder_id)
            .await?;

        let by_id: HashMap<FolderId, Folder> = descendants
            .into_iter()
            .map(|o| (o.folder.id, o.folder))
            .collect();
        let mut children: HashMap<FolderId, Vec<FolderId>> = HashMap::new();
        for link in links {
            children
                .entry(link.ancestor_id)
                .or_default()
                .push(link.descendant_id);
        }

        Ok(build_tree(top, base_path, 0, &by_id, &children))
    }

    /// Checks the closure index of the workspace for structural defects.
    pub async fn verify(&self, ctx: &RequestContext) -> AppResult<IntegrityReport> {
        let folders = self.store.find_by_workspace(ctx.workspace_id).await?;
        let edges = self.store.find_edges(ctx.workspace_id).await?;
        let report = closure::verify(&folders, &edges);

        if report.is_consistent() {
            info!(
                workspace_id = %ctx.workspace_id,
                folders = report.folders,
                edges = report.edges,
                "Folder tree is consistent"
            );
        } else {
            warn!(
                workspace_id = %ctx.workspace_id,
                violations = report.violations.len(),
                "Folder tree has integrity violations"
            );
        }
        Ok(report)
    }
}

/// Join the names of a root-first ancestor sequence, each followed by `/`.
fn path_of<'a>(ancestors: impl Iterator<Item = &'a Folder>) -> String {
    ancestors
        .filter_map(|f| f.name.as_deref())
        .map(|name| format!("{name}/"))
        .collect()
}

fn build_tree(
    folder: Folder,
    path: String,
    depth: i32,
    by_id: &HashMap<FolderId, Folder>,
    children: &HashMap<FolderId, Vec<FolderId>>,
) -> FolderNode {
    let mut nodes: Vec<FolderNode> = children
        .get(&folder.id)
        .into_iter()
        .flatten()
        .filter_map(|id| by_id.get(id))
        .map(|child| {
            let child_path = format!("{path}{}/", child.display_name());
            build_tree(child.clone(), child_path, depth + 1, by_id, children)
        })
        .collect();
    nodes.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    FolderNode {
        id: folder.id,
        external: folder.is_external(),
        name: folder.name,
        path,
        depth,
        children: nodes,
    }
}
