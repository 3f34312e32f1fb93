//! Closure index queries (`folder_paths` table).
//!
//! Rows here are pure index rows: they are inserted and hard-deleted,
//! never updated or soft-deleted. Only [`super::FolderTreeRepository`]
//! calls the writing functions, always inside a transaction.

use sqlx::{FromRow, PgConnection};

use foldertree_core::result::AppResult;
use foldertree_core::types::{FolderId, WorkspaceId};
use foldertree_entity::folder::{ClosureEdge, Folder, NewClosureEdge};

use super::map_db_error;

/// A folder joined with its distance from a reference folder.
#[derive(Debug, FromRow)]
struct FolderAtDistance {
    #[sqlx(flatten)]
    folder: Folder,
    distance: i32,
}

fn into_links(rows: Vec<(FolderId, FolderId, i32)>) -> Vec<NewClosureEdge> {
    rows.into_iter()
        .map(|(ancestor_id, descendant_id, distance)| NewClosureEdge {
            ancestor_id,
            descendant_id,
            distance,
        })
        .collect()
}

/// Serialize tree mutations within one workspace for the rest of the
/// transaction.
///
/// `lock_timeout_ms` bounds the wait; when it expires Postgres aborts with
/// `lock_not_available`, which surfaces as a retryable transaction error.
pub async fn lock_workspace(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    lock_timeout_ms: u64,
) -> AppResult<()> {
    sqlx::query(&format!("SET LOCAL lock_timeout = {lock_timeout_ms}"))
        .execute(&mut *conn)
        .await
        .map_err(|e| map_db_error(e, "Failed to set lock timeout"))?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(workspace_id.to_string())
        .execute(conn)
        .await
        .map_err(|e| map_db_error(e, "Failed to lock workspace tree"))?;
    Ok(())
}

/// Rows ending at `folder_id`: its ancestor chain, itself included.
pub async fn find_chain(
    conn: &mut PgConnection,
    folder_id: FolderId,
) -> AppResult<Vec<NewClosureEdge>> {
    let rows: Vec<(FolderId, FolderId, i32)> = sqlx::query_as(
        "SELECT ancestor_id, descendant_id, path_length FROM folder_paths \
         WHERE descendant_id = $1 ORDER BY path_length DESC",
    )
    .bind(folder_id)
    .fetch_all(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to read ancestor chain"))?;
    Ok(into_links(rows))
}

/// Rows starting at `folder_id`: its subtree, itself included. The rows
/// are locked until the transaction ends.
pub async fn find_subtree_for_update(
    conn: &mut PgConnection,
    folder_id: FolderId,
) -> AppResult<Vec<NewClosureEdge>> {
    let rows: Vec<(FolderId, FolderId, i32)> = sqlx::query_as(
        "SELECT ancestor_id, descendant_id, path_length FROM folder_paths \
         WHERE ancestor_id = $1 ORDER BY path_length ASC, descendant_id ASC \
         FOR UPDATE",
    )
    .bind(folder_id)
    .fetch_all(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to read subtree"))?;
    Ok(into_links(rows))
}

/// Whether `ancestor_id` reaches `descendant_id`.
pub async fn edge_exists(
    conn: &mut PgConnection,
    ancestor_id: FolderId,
    descendant_id: FolderId,
) -> AppResult<bool> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM folder_paths WHERE ancestor_id = $1 AND descendant_id = $2)",
    )
    .bind(ancestor_id)
    .bind(descendant_id)
    .fetch_one(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to check folder ancestry"))
}

/// Insert closure rows in one statement.
pub async fn insert_many(conn: &mut PgConnection, edges: &[NewClosureEdge]) -> AppResult<u64> {
    if edges.is_empty() {
        return Ok(0);
    }
    let ancestors: Vec<FolderId> = edges.iter().map(|e| e.ancestor_id).collect();
    let descendants: Vec<FolderId> = edges.iter().map(|e| e.descendant_id).collect();
    let distances: Vec<i32> = edges.iter().map(|e| e.distance).collect();

    let result = sqlx::query(
        "INSERT INTO folder_paths (ancestor_id, descendant_id, path_length) \
         SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::int4[])",
    )
    .bind(&ancestors)
    .bind(&descendants)
    .bind(&distances)
    .execute(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to insert closure rows"))?;
    Ok(result.rows_affected())
}

/// Delete rows entering the subtree from outside it.
pub async fn delete_severed(conn: &mut PgConnection, subtree: &[FolderId]) -> AppResult<u64> {
    let result = sqlx::query(
        "DELETE FROM folder_paths \
         WHERE descendant_id = ANY($1) AND NOT (ancestor_id = ANY($1))",
    )
    .bind(subtree)
    .execute(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to detach subtree"))?;
    Ok(result.rows_affected())
}

/// Delete every row with either end in `folder_ids`.
pub async fn delete_touching(conn: &mut PgConnection, folder_ids: &[FolderId]) -> AppResult<u64> {
    let result = sqlx::query(
        "DELETE FROM folder_paths WHERE ancestor_id = ANY($1) OR descendant_id = ANY($1)",
    )
    .bind(folder_ids)
    .execute(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to delete closure rows"))?;
    Ok(result.rows_affected())
}

/// Live ancestors of a folder with their distance, itself included.
pub async fn find_ancestor_rows(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    folder_id: FolderId,
) -> AppResult<Vec<(Folder, i32)>> {
    let rows = sqlx::query_as::<_, FolderAtDistance>(
        "SELECT f.*, p.path_length AS distance FROM folder_paths p \
         INNER JOIN folders f ON f.id = p.ancestor_id \
         WHERE p.descendant_id = $1 AND f.workspace_id = $2 AND f.deleted_at IS NULL \
         ORDER BY p.path_length DESC",
    )
    .bind(folder_id)
    .bind(workspace_id)
    .fetch_all(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to find ancestors"))?;
    Ok(rows.into_iter().map(|r| (r.folder, r.distance)).collect())
}

/// Live strict descendants of a folder with their distance.
pub async fn find_descendant_rows(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    folder_id: FolderId,
) -> AppResult<Vec<(Folder, i32)>> {
    let rows = sqlx::query_as::<_, FolderAtDistance>(
        "SELECT f.*, p.path_length AS distance FROM folder_paths p \
         INNER JOIN folders f ON f.id = p.descendant_id \
         WHERE p.ancestor_id = $1 AND p.path_length > 0 \
         AND f.workspace_id = $2 AND f.deleted_at IS NULL \
         ORDER BY p.path_length ASC, f.id ASC",
    )
    .bind(folder_id)
    .bind(workspace_id)
    .fetch_all(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to find descendants"))?;
    Ok(rows.into_iter().map(|r| (r.folder, r.distance)).collect())
}

/// Ids of a folder and its descendants, breadth-first.
pub async fn find_descendant_ids(
    conn: &mut PgConnection,
    folder_id: FolderId,
) -> AppResult<Vec<FolderId>> {
    sqlx::query_scalar::<_, FolderId>(
        "SELECT descendant_id FROM folder_paths WHERE ancestor_id = $1 \
         ORDER BY path_length ASC, descendant_id ASC",
    )
    .bind(folder_id)
    .fetch_all(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to list descendant ids"))
}

/// Distance-1 rows whose child lies strictly inside the subtree.
pub async fn find_child_links(
    conn: &mut PgConnection,
    folder_id: FolderId,
) -> AppResult<Vec<NewClosureEdge>> {
    let rows: Vec<(FolderId, FolderId, i32)> = sqlx::query_as(
        "SELECT c.ancestor_id, c.descendant_id, c.path_length FROM folder_paths c \
         INNER JOIN folder_paths s ON s.descendant_id = c.descendant_id \
         WHERE s.ancestor_id = $1 AND s.path_length > 0 AND c.path_length = 1 \
         ORDER BY s.path_length ASC, c.descendant_id ASC",
    )
    .bind(folder_id)
    .fetch_all(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to list child links"))?;
    Ok(into_links(rows))
}

/// Every row whose descendant belongs to the workspace.
pub async fn find_by_workspace(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
) -> AppResult<Vec<ClosureEdge>> {
    sqlx::query_as::<_, ClosureEdge>(
        "SELECT p.* FROM folder_paths p \
         INNER JOIN folders f ON f.id = p.descendant_id \
         WHERE f.workspace_id = $1 \
         ORDER BY p.ancestor_id ASC, p.path_length ASC, p.descendant_id ASC",
    )
    .bind(workspace_id)
    .fetch_all(conn)
    .await
    .map_err(|e| map_db_error(e, "Failed to list closure rows"))
}
