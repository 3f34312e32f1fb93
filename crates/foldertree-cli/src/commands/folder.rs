//! Folder tree CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use foldertree_core::config::AppConfig;
use foldertree_core::error::AppError;
use foldertree_core::types::{FolderId, WorkspaceId};
use foldertree_database::FolderTreeStore;
use foldertree_entity::folder::{ExternalSystemType, Folder, FolderNode, OrderedFolder};
use foldertree_service::{
    CreateFolderRequest, ExternalFolderEntry, ExternalSyncService, FolderService, RequestContext,
    TreeService,
};

use crate::output::{self, OutputFormat};

/// Arguments for folder commands
#[derive(Debug, Args)]
pub struct FolderArgs {
    /// Workspace (bot) ID
    #[arg(short, long)]
    pub workspace: WorkspaceId,

    /// Folder subcommand
    #[command(subcommand)]
    pub command: FolderCommand,
}

/// Folder subcommands
#[derive(Debug, Subcommand)]
pub enum FolderCommand {
    /// Create the workspace root folder
    InitRoot,
    /// List every folder of the workspace
    List,
    /// Create a new folder
    Create {
        /// Folder name
        #[arg(short, long)]
        name: String,
        /// Parent folder ID (omit for the workspace root)
        #[arg(short, long)]
        parent: Option<FolderId>,
    },
    /// Rename a folder
    Rename {
        /// Folder ID
        id: FolderId,
        /// New name
        name: String,
    },
    /// Move a folder and its subtree under a new parent
    Move {
        /// Folder ID
        id: FolderId,
        /// New parent folder ID
        #[arg(long)]
        to: FolderId,
    },
    /// Delete a folder and everything below it
    Delete {
        /// Folder ID
        id: FolderId,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// List ancestors, root first
    Ancestors {
        /// Folder ID
        id: FolderId,
    },
    /// List descendants, breadth-first
    Descendants {
        /// Folder ID
        id: FolderId,
    },
    /// Print the absolute path of a folder
    Path {
        /// Folder ID
        id: FolderId,
    },
    /// Show the folder tree
    Tree {
        /// Folder to start from (defaults to the root)
        id: Option<FolderId>,
    },
    /// Check the closure index for structural defects
    Verify,
    /// Import folders from an external system
    Import {
        /// Source system
        #[arg(short, long)]
        system: ExternalSystemType,
        /// Folder the entries are placed under (defaults to the root)
        #[arg(short, long)]
        parent: Option<FolderId>,
        /// JSON file holding an array of entries
        #[arg(short, long)]
        file: PathBuf,
    },
}

/// Folder display row
#[derive(Debug, Serialize, Tabled)]
struct FolderRow {
    /// Folder ID
    id: String,
    /// Name
    name: String,
    /// Distance
    distance: String,
    /// Order
    order: String,
    /// Source
    source: String,
    /// Created at
    created_at: String,
}

impl FolderRow {
    fn plain(folder: &Folder) -> Self {
        Self {
            id: folder.id.to_string(),
            name: display(folder),
            distance: String::new(),
            order: String::new(),
            source: folder
                .external_type
                .map(|s| s.to_string())
                .unwrap_or_default(),
            created_at: folder.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }

    fn ordered(ordered: &OrderedFolder) -> Self {
        Self {
            distance: ordered.distance.to_string(),
            order: ordered.order.to_string(),
            ..Self::plain(&ordered.folder)
        }
    }
}

/// Import result row
#[derive(Debug, Serialize, Tabled)]
struct ImportRow {
    /// External ID
    external_id: String,
    /// Folder ID
    folder_id: String,
    /// Outcome
    outcome: String,
    /// Valid
    valid: bool,
    /// Reason
    reason: String,
}

fn display(folder: &Folder) -> String {
    folder.name.clone().unwrap_or_else(|| "(root)".to_string())
}

/// Execute folder commands
pub async fn execute(
    args: &FolderArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let db = super::create_db_pool(config).await?;
    let store: Arc<dyn FolderTreeStore> = Arc::new(db.folder_tree());
    let folders = FolderService::new(store.clone(), config.tree.clone());
    let tree = TreeService::new(store.clone());
    let ctx = RequestContext::new(args.workspace);
    tracing::debug!(
        workspace_id = %ctx.workspace_id,
        request_id = %ctx.request_id,
        command = ?args.command,
        "Running folder command"
    );

    match &args.command {
        FolderCommand::InitRoot => {
            let root = folders.create_root(&ctx).await?;
            output::print_success(&format!("Root folder created (id: {})", root.id));
        }
        FolderCommand::List => {
            let rows: Vec<FolderRow> = folders
                .list_folders(&ctx)
                .await?
                .iter()
                .map(FolderRow::plain)
                .collect();
            output::print_list(&rows, format);
        }
        FolderCommand::Create { name, parent } => {
            let folder = folders
                .create_folder(
                    &ctx,
                    CreateFolderRequest {
                        parent_id: *parent,
                        name: name.clone(),
                    },
                )
                .await?;
            output::print_success(&format!(
                "Folder '{}' created (id: {})",
                display(&folder),
                folder.id
            ));
        }
        FolderCommand::Rename { id, name } => {
            let folder = folders.rename_folder(&ctx, *id, name).await?;
            output::print_success(&format!("Folder renamed to '{}'", display(&folder)));
        }
        FolderCommand::Move { id, to } => {
            folders.move_folder(&ctx, *id, *to).await?;
            let path = tree.absolute_path(&ctx, *id).await?;
            output::print_success(&format!("Folder moved to '{path}'"));
        }
        FolderCommand::Delete { id, force } => {
            let folder = folders.get_folder(&ctx, *id).await?;
            let size = tree.descendant_ids(&ctx, *id).await?.len();

            if !force {
                let confirm = dialoguer::Confirm::new()
                    .with_prompt(format!(
                        "Delete '{}' and {} folder(s) below it?",
                        display(&folder),
                        size.saturating_sub(1)
                    ))
                    .default(false)
                    .interact()
                    .map_err(|e| AppError::internal(format!("Input error: {e}")))?;

                if !confirm {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let summary = folders.delete_subtree(&ctx, *id).await?;
            match format {
                OutputFormat::Json => output::print_json(&summary),
                OutputFormat::Table => output::print_success(&format!(
                    "Deleted {} folder(s) in {} chunk(s)",
                    summary.folders.len(),
                    summary.chunks
                )),
            }
        }
        FolderCommand::Ancestors { id } => {
            let rows: Vec<FolderRow> = tree
                .ancestors(&ctx, *id)
                .await?
                .iter()
                .map(FolderRow::ordered)
                .collect();
            output::print_list(&rows, format);
        }
        FolderCommand::Descendants { id } => {
            let rows: Vec<FolderRow> = tree
                .descendants(&ctx, *id)
                .await?
                .iter()
                .map(FolderRow::ordered)
                .collect();
            output::print_list(&rows, format);
        }
        FolderCommand::Path { id } => {
            let path = tree.absolute_path(&ctx, *id).await?;
            match format {
                OutputFormat::Json => output::print_json(&path),
                OutputFormat::Table => println!("/{path}"),
            }
        }
        FolderCommand::Tree { id } => {
            let start = match id {
                Some(id) => *id,
                None => folders.get_root(&ctx).await?.id,
            };
            let node = tree.get_tree(&ctx, start).await?;
            match format {
                OutputFormat::Json => output::print_json(&node),
                OutputFormat::Table => {
                    println!("/{}", node.path);
                    print_children(&node, "");
                }
            }
        }
        FolderCommand::Verify => {
            let report = tree.verify(&ctx).await?;
            match format {
                OutputFormat::Json => output::print_json(&report),
                OutputFormat::Table => {
                    output::print_kv("folders", &report.folders.to_string());
                    output::print_kv("closure rows", &report.edges.to_string());
                    if report.is_consistent() {
                        output::print_success("Folder tree is consistent");
                    } else {
                        for violation in &report.violations {
                            output::print_warning(&format!("{violation:?}"));
                        }
                        return Err(AppError::internal(format!(
                            "{} integrity violation(s) found",
                            report.violations.len()
                        )));
                    }
                }
            }
        }
        FolderCommand::Import {
            system,
            parent,
            file,
        } => {
            let raw = tokio::fs::read_to_string(file).await.map_err(|e| {
                AppError::validation(format!("Failed to read '{}': {e}", file.display()))
            })?;
            let entries: Vec<ExternalFolderEntry> = serde_json::from_str(&raw)?;
            let parent_id = match parent {
                Some(id) => *id,
                None => folders.get_root(&ctx).await?.id,
            };

            let sync = ExternalSyncService::new(store.clone(), config.tree.clone());
            let rows: Vec<ImportRow> = sync
                .import_batch(&ctx, *system, parent_id, &entries)
                .await?
                .into_iter()
                .map(|r| ImportRow {
                    external_id: r.external_id,
                    folder_id: r.folder_id.map(|id| id.to_string()).unwrap_or_default(),
                    outcome: format!("{:?}", r.outcome).to_lowercase(),
                    valid: r.is_valid,
                    reason: r.reason.unwrap_or_default(),
                })
                .collect();
            output::print_list(&rows, format);
        }
    }

    db.close().await;
    Ok(())
}

/// Print the children of a node as an indented tree.
fn print_children(node: &FolderNode, prefix: &str) {
    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        let last = i + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        let marker = if child.external { " [synced]" } else { "" };
        println!(
            "{prefix}{branch}{}/{marker}",
            child.name.as_deref().unwrap_or_default()
        );
        let next = format!("{prefix}{}", if last { "    " } else { "│   " });
        print_children(child, &next);
    }
}
