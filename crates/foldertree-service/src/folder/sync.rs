//! Import of folders from external systems.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use foldertree_core::config::TreeConfig;
use foldertree_core::error::AppError;
use foldertree_core::result::AppResult;
use foldertree_core::types::FolderId;
use foldertree_database::{FolderTreeStore, SiblingNames};
use foldertree_entity::folder::{CreateFolder, ExternalReference, ExternalSystemType, Folder};

use super::name::validate_name;
use crate::context::RequestContext;
use crate::retry::retry_transient;

/// A folder as reported by the source system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalFolderEntry {
    /// Identifier in the source system.
    pub external_id: String,
    /// Folder name in the source system.
    pub name: String,
    /// Last-modified timestamp in the source system.
    pub updated_at: DateTime<Utc>,
    /// Source-system id of the parent. When absent, or when it names a
    /// folder this import has not seen, the entry goes under the batch
    /// parent.
    #[serde(default)]
    pub parent_external_id: Option<String>,
}

/// What an import did with one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// A new folder was created.
    Created,
    /// An existing folder was renamed or had its timestamp refreshed.
    Updated,
    /// The stored copy is as new as the entry; nothing changed.
    Unchanged,
    /// The entry was rejected.
    Skipped,
}

/// Per-entry import result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedFolder {
    /// Identifier in the source system.
    pub external_id: String,
    /// The local folder, if one exists for the entry.
    pub folder_id: Option<FolderId>,
    /// What happened.
    pub outcome: SyncOutcome,
    /// False when the entry was rejected or its name collides with a
    /// sibling.
    pub is_valid: bool,
    /// Why the entry is not valid.
    pub reason: Option<String>,
}

impl SyncedFolder {
    fn valid(entry: &ExternalFolderEntry, folder: &Folder, outcome: SyncOutcome) -> Self {
        Self {
            external_id: entry.external_id.clone(),
            folder_id: Some(folder.id),
            outcome,
            is_valid: true,
            reason: None,
        }
    }

    fn flagged(mut self, reason: impl Into<String>) -> Self {
        self.is_valid = false;
        self.reason = Some(reason.into());
        self
    }
}

/// Creates and refreshes folders mirrored from an external system.
///
/// Synced folders are ordinary tree nodes that also carry their external
/// provenance; the tree operations treat them like any other folder.
#[derive(Debug, Clone)]
pub struct ExternalSyncService {
    /// Folder tree store.
    store: Arc<dyn FolderTreeStore>,
    /// Naming rules and retry budget.
    config: TreeConfig,
}

impl ExternalSyncService {
    /// Creates a new sync service.
    pub fn new(store: Arc<dyn FolderTreeStore>, config: TreeConfig) -> Self {
        Self { store, config }
    }

    /// Import a batch of folders from `system` under `parent_id`.
    ///
    /// Entries are applied in order, so a parent listed before its children
    /// is available to them. Known external ids are updated in place unless
    /// the stored timestamp is at least as new. Entries with an unusable
    /// name are skipped; entries whose name duplicates a sibling are still
    /// imported but reported as not valid.
    pub async fn import_batch(
        &self,
        ctx: &RequestContext,
        system: ExternalSystemType,
        parent_id: FolderId,
        entries: &[ExternalFolderEntry],
    ) -> AppResult<Vec<SyncedFolder>> {
        self.store
            .find_by_id(ctx.workspace_id, parent_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Folder {parent_id} not found")))?;

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            results.push(self.import_one(ctx, system, parent_id, entry).await?);
        }

        info!(
            workspace_id = %ctx.workspace_id,
            system = %system,
            entries = entries.len(),
            created = results.iter().filter(|r| r.outcome == SyncOutcome::Created).count(),
            updated = results.iter().filter(|r| r.outcome == SyncOutcome::Updated).count(),
            invalid = results.iter().filter(|r| !r.is_valid).count(),
            "External folders imported"
        );
        Ok(results)
    }

    async fn import_one(
        &self,
        ctx: &RequestContext,
        system: ExternalSystemType,
        batch_parent: FolderId,
        entry: &ExternalFolderEntry,
    ) -> AppResult<SyncedFolder> {
        let existing = self
            .store
            .find_by_external_id(ctx.workspace_id, system, &entry.external_id)
            .await?;

        let name = match validate_name(&self.config, &entry.name) {
            Ok(name) => name,
            Err(err) => {
                debug!(external_id = %entry.external_id, error = %err, "Rejected external folder");
                return Ok(SyncedFolder {
                    external_id: entry.external_id.clone(),
                    folder_id: existing.map(|f| f.id),
                    outcome: SyncOutcome::Skipped,
                    is_valid: false,
                    reason: Some(err.message),
                });
            }
        };

        match existing {
            Some(folder) => self.refresh(ctx, folder, entry, name).await,
            None => self.create(ctx, system, batch_parent, entry, name).await,
        }
    }

    async fn refresh(
        &self,
        ctx: &RequestContext,
        folder: Folder,
        entry: &ExternalFolderEntry,
        name: String,
    ) -> AppResult<SyncedFolder> {
        if folder
            .external_updated_at
            .is_some_and(|stored| stored >= entry.updated_at)
        {
            return Ok(SyncedFolder::valid(entry, &folder, SyncOutcome::Unchanged));
        }

        let rename = (folder.name.as_deref() != Some(name.as_str())).then_some(name.as_str());
        let updated = retry_transient(self.config.transaction_retries, "sync_refresh", || {
            self.store
                .update_external(ctx.workspace_id, folder.id, rename, entry.updated_at)
        })
        .await?;

        let result = SyncedFolder::valid(entry, &updated, SyncOutcome::Updated);
        if self.has_namesake(ctx, &updated).await? {
            return Ok(result.flagged(format!("Duplicate folder name '{name}'")));
        }
        Ok(result)
    }

    async fn create(
        &self,
        ctx: &RequestContext,
        system: ExternalSystemType,
        batch_parent: FolderId,
        entry: &ExternalFolderEntry,
        name: String,
    ) -> AppResult<SyncedFolder> {
        let parent_id = match &entry.parent_external_id {
            Some(parent_external_id) => self
                .store
                .find_by_external_id(ctx.workspace_id, system, parent_external_id)
                .await?
                .map_or(batch_parent, |f| f.id),
            None => batch_parent,
        };

        let duplicate = !self
            .store
            .find_by_parent_and_name(ctx.workspace_id, parent_id, &name)
            .await?
            .is_empty();

        let data = CreateFolder::named(ctx.workspace_id, name.clone()).with_external(
            ExternalReference {
                system,
                external_id: entry.external_id.clone(),
                updated_at: entry.updated_at,
            },
        );
        let folder = retry_transient(self.config.transaction_retries, "sync_create", || {
            self.store.create(parent_id, &data, SiblingNames::AllowDuplicates)
        })
        .await?;

        let result = SyncedFolder::valid(entry, &folder, SyncOutcome::Created);
        if duplicate {
            return Ok(result.flagged(format!("Duplicate folder name '{name}'")));
        }
        Ok(result)
    }

    /// Whether another live sibling shares the folder's name.
    async fn has_namesake(&self, ctx: &RequestContext, folder: &Folder) -> AppResult<bool> {
        let Some(name) = folder.name.as_deref() else {
            return Ok(false);
        };
        let ancestors = self.store.find_ancestors(ctx.workspace_id, folder.id).await?;
        let Some(parent) = ancestors.iter().find(|o| o.distance == 1) else {
            return Ok(false);
        };
        let siblings = self
            .store
            .find_by_parent_and_name(ctx.workspace_id, parent.folder.id, name)
            .await?;
        Ok(siblings.iter().any(|s| s.id != folder.id))
    }
}
