//! PostgreSQL repositories for the folder tree.
//!
//! [`folder`] and [`closure`] hold the row-level queries for the two
//! tables; they take a connection so that [`FolderTreeRepository`] can run
//! them inside one transaction. Nothing outside this crate writes closure
//! rows.

pub mod closure;
pub mod folder;
pub mod tree;

pub use tree::FolderTreeRepository;

use foldertree_core::error::{AppError, ErrorKind};

/// SQLSTATE `serialization_failure`.
const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE `deadlock_detected`.
const DEADLOCK_DETECTED: &str = "40P01";
/// SQLSTATE `lock_not_available` (raised when `lock_timeout` expires).
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// Partial unique index allowing one live root per workspace.
const ONE_LIVE_ROOT_INDEX: &str = "folders_one_live_root_idx";

/// Map a sqlx error to an [`AppError`].
///
/// Transaction aborts become [`ErrorKind::Transaction`] so callers can
/// retry them; a violation of the single-root index becomes a conflict.
pub(crate) fn map_db_error(err: sqlx::Error, context: &str) -> AppError {
    let (code, constraint) = match &err {
        sqlx::Error::Database(db_err) => (
            db_err.code().map(|c| c.into_owned()),
            db_err.constraint().map(str::to_owned),
        ),
        _ => (None, None),
    };

    match (code.as_deref(), constraint.as_deref()) {
        (Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | LOCK_NOT_AVAILABLE), _) => {
            AppError::with_source(
                ErrorKind::Transaction,
                format!("{context}: transaction aborted, retry"),
                err,
            )
        }
        (_, Some(ONE_LIVE_ROOT_INDEX)) => {
            AppError::with_source(ErrorKind::Conflict, "Workspace already has a root folder", err)
        }
        _ => AppError::with_source(ErrorKind::Database, context.to_string(), err),
    }
}
