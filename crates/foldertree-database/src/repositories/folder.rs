//! Folder store queries (`folders` table).
//!
//! Existence, naming, provenance and soft deletion of folders,
//! independent of where they sit in the tree.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use foldertree_core::result::AppResult;
use foldertree_core::types::{FolderId, WorkspaceId};
use foldertree_entity::folder::{CreateFolder, ExternalSystemType, Folder};

use super::map_db_error;

/// Insert a folder row.
pub async fn insert(
    conn: &mut PgConnection,
    id: FolderId,
    data: &CreateFolder,
) -> AppResult<Folder> {
    let reference = data.external_reference.as_ref();
    sqlx::query_as::<_, Folder>(
        "INSERT INTO folders (id, workspace_id, name, external_type, external_id, external_updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(id)
    .bind(data.workspace_id)
    .bind(data.name.as_deref())
    .bind(reference.map(|r| r.system))
    .bind(reference.map(|r| r.external_id.as_str()))
    .bind(reference.map(|r| r.updated_at))
    .fetch_one(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to create folder"))
}

/// Find a live folder by id within a workspace.
pub async fn find_by_id(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    folder_id: FolderId,
) -> AppResult<Option<Folder>> {
    sqlx::query_as::<_, Folder>(
        "SELECT * FROM folders WHERE id = $1 AND workspace_id = $2 AND deleted_at IS NULL",
    )
    .bind(folder_id)
    .bind(workspace_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to find folder"))
}

/// Find a folder by id within a workspace, soft-deleted rows included.
pub async fn find_by_id_with_deleted(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    folder_id: FolderId,
) -> AppResult<Option<Folder>> {
    sqlx::query_as::<_, Folder>("SELECT * FROM folders WHERE id = $1 AND workspace_id = $2")
        .bind(folder_id)
        .bind(workspace_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| map_db_error(e, "Failed to find folder"))
}

/// Live folders of a workspace, oldest first.
pub async fn find_by_workspace(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
) -> AppResult<Vec<Folder>> {
    sqlx::query_as::<_, Folder>(
        "SELECT * FROM folders WHERE workspace_id = $1 AND deleted_at IS NULL \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(workspace_id)
    .fetch_all(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to list workspace folders"))
}

/// Live direct children of `parent_id` with the given name.
pub async fn find_by_parent_and_name(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    parent_id: FolderId,
    name: &str,
) -> AppResult<Vec<Folder>> {
    sqlx::query_as::<_, Folder>(
        "SELECT f.* FROM folders f \
         INNER JOIN folder_paths p ON p.descendant_id = f.id \
         WHERE p.ancestor_id = $1 AND p.path_length = 1 \
         AND f.workspace_id = $2 AND f.name = $3 AND f.deleted_at IS NULL \
         ORDER BY f.id ASC",
    )
    .bind(parent_id)
    .bind(workspace_id)
    .bind(name)
    .fetch_all(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to find folder by name"))
}

/// The live folder imported from `external_id`.
pub async fn find_by_external_id(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    system: ExternalSystemType,
    external_id: &str,
) -> AppResult<Option<Folder>> {
    sqlx::query_as::<_, Folder>(
        "SELECT * FROM folders \
         WHERE workspace_id = $1 AND external_type = $2 AND external_id = $3 \
         AND deleted_at IS NULL \
         ORDER BY created_at ASC LIMIT 1",
    )
    .bind(workspace_id)
    .bind(system)
    .bind(external_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to find folder by external id"))
}

/// Live folders whose only closure row as a descendant is their self-edge.
///
/// A consistent workspace yields at most one row.
pub async fn find_roots(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
) -> AppResult<Vec<Folder>> {
    sqlx::query_as::<_, Folder>(
        "SELECT f.* FROM folders f \
         INNER JOIN folder_paths p ON p.descendant_id = f.id \
         WHERE f.workspace_id = $1 AND f.deleted_at IS NULL \
         GROUP BY f.id \
         HAVING COUNT(*) = 1",
    )
    .bind(workspace_id)
    .fetch_all(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to find root folder"))
}

/// Set the name of a live folder.
pub async fn rename(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    folder_id: FolderId,
    name: &str,
) -> AppResult<Option<Folder>> {
    sqlx::query_as::<_, Folder>(
        "UPDATE folders SET name = $3 \
         WHERE id = $1 AND workspace_id = $2 AND deleted_at IS NULL RETURNING *",
    )
    .bind(folder_id)
    .bind(workspace_id)
    .bind(name)
    .fetch_optional(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to rename folder"))
}

/// Refresh the external timestamp and, when given, the name.
pub async fn update_external(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    folder_id: FolderId,
    name: Option<&str>,
    updated_at: DateTime<Utc>,
) -> AppResult<Option<Folder>> {
    sqlx::query_as::<_, Folder>(
        "UPDATE folders SET name = COALESCE($3, name), external_updated_at = $4 \
         WHERE id = $1 AND workspace_id = $2 AND deleted_at IS NULL \
         AND external_type IS NOT NULL RETURNING *",
    )
    .bind(folder_id)
    .bind(workspace_id)
    .bind(name)
    .bind(updated_at)
    .fetch_optional(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to update synced folder"))
}

/// Soft-delete several folders. Already deleted rows are left untouched.
pub async fn soft_delete_many(conn: &mut PgConnection, folder_ids: &[FolderId]) -> AppResult<u64> {
    let result = sqlx::query(
        "UPDATE folders SET deleted_at = NOW() WHERE id = ANY($1) AND deleted_at IS NULL",
    )
    .bind(folder_ids)
    .execute(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to soft-delete folders"))?;
    Ok(result.rows_affected())
}
