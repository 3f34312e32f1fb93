//! Folder entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use foldertree_core::types::{FolderId, WorkspaceId};

use super::external::{ExternalReference, ExternalSystemType};

/// A folder in a workspace tree.
///
/// Position in the tree is not stored here; it lives in the closure index
/// (`folder_paths`). A folder without a name is the workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Folder {
    /// Unique folder identifier.
    pub id: FolderId,
    /// The workspace this folder belongs to. Never changes.
    pub workspace_id: WorkspaceId,
    /// Display name; `None` only for the workspace root.
    pub name: Option<String>,
    /// Source system for folders created by an external sync.
    pub external_type: Option<ExternalSystemType>,
    /// Identifier of the folder in the source system.
    pub external_id: Option<String>,
    /// Last-modified timestamp reported by the source system.
    pub external_updated_at: Option<DateTime<Utc>>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
    /// When the folder was created.
    pub created_at: DateTime<Utc>,
}

impl Folder {
    /// Build a live folder record from creation data.
    pub fn from_create(id: FolderId, data: &CreateFolder, created_at: DateTime<Utc>) -> Self {
        let reference = data.external_reference.as_ref();
        Self {
            id,
            workspace_id: data.workspace_id,
            name: data.name.clone(),
            external_type: reference.map(|r| r.system),
            external_id: reference.map(|r| r.external_id.clone()),
            external_updated_at: reference.map(|r| r.updated_at),
            deleted_at: None,
            created_at,
        }
    }

    /// Check if this is the workspace root (the only unnamed folder).
    pub fn is_root(&self) -> bool {
        self.name.is_none()
    }

    /// Check if this folder has not been soft-deleted.
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// The external provenance triple, if all three columns are set.
    pub fn external_reference(&self) -> Option<ExternalReference> {
        match (&self.external_type, &self.external_id, self.external_updated_at) {
            (Some(system), Some(external_id), Some(updated_at)) => Some(ExternalReference {
                system: *system,
                external_id: external_id.clone(),
                updated_at,
            }),
            _ => None,
        }
    }

    /// Whether this folder was created by an external sync.
    pub fn is_external(&self) -> bool {
        self.external_type.is_some()
    }

    /// Name for display; the root renders as an empty string.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

/// Data required to create a new folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFolder {
    /// The owning workspace.
    pub workspace_id: WorkspaceId,
    /// Folder name (`None` for the root).
    pub name: Option<String>,
    /// Provenance for externally synced folders.
    pub external_reference: Option<ExternalReference>,
}

impl CreateFolder {
    /// Creation data for a workspace root.
    pub fn root(workspace_id: WorkspaceId) -> Self {
        Self {
            workspace_id,
            name: None,
            external_reference: None,
        }
    }

    /// Creation data for a named folder.
    pub fn named(workspace_id: WorkspaceId, name: impl Into<String>) -> Self {
        Self {
            workspace_id,
            name: Some(name.into()),
            external_reference: None,
        }
    }

    /// Attach external provenance.
    pub fn with_external(mut self, reference: ExternalReference) -> Self {
        self.external_reference = Some(reference);
        self
    }
}
