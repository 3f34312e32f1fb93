//! Request context carrying the workspace an operation is scoped to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use foldertree_core::types::WorkspaceId;

/// Context for the current request.
///
/// Every folder operation runs inside exactly one workspace; folders of
/// other workspaces are invisible to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// The workspace (bot) the request operates on.
    pub workspace_id: WorkspaceId,
    /// Correlation id attached to log lines.
    pub request_id: Uuid,
    /// When the request was received.
    pub request_time: DateTime<Utc>,
}

impl RequestContext {
    /// Creates a new request context.
    pub fn new(workspace_id: WorkspaceId) -> Self {
        Self {
            workspace_id,
            request_id: Uuid::new_v4(),
            request_time: Utc::now(),
        }
    }
}
