//! CLI command definitions and dispatch.

pub mod config;
pub mod folder;
pub mod migrate;

use clap::{Parser, Subcommand};

use foldertree_core::config::AppConfig;
use foldertree_core::error::AppError;
use foldertree_database::DatabasePool;

use crate::output::OutputFormat;

/// FolderTree: hierarchical folder trees for workspaces
#[derive(Debug, Parser)]
#[command(name = "foldertree", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Folder tree management
    Folder(folder::FolderArgs),
    /// Configuration management
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self, config: &AppConfig) -> Result<(), AppError> {
        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, config, self.format).await,
            Commands::Folder(args) => folder::execute(args, config, self.format).await,
            Commands::Config(args) => config::execute(args, config, self.format),
        }
    }
}

/// Helper: connect to the database described by the configuration and
/// make sure it answers
pub async fn create_db_pool(config: &AppConfig) -> Result<DatabasePool, AppError> {
    let db = DatabasePool::connect(&config.database).await?;
    db.health_check().await?;
    Ok(db)
}
