//! Configuration management CLI commands.

use clap::{Args, Subcommand};

use foldertree_core::config::AppConfig;
use foldertree_core::error::AppError;

use crate::output::{self, OutputFormat};

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
}

/// Execute config commands
pub fn execute(args: &ConfigArgs, config: &AppConfig, format: OutputFormat) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => match format {
            OutputFormat::Json => {
                let mut value = serde_json::to_value(config)?;
                value["database"]["url"] = mask_password(&config.database.url).into();
                output::print_json(&value);
            }
            OutputFormat::Table => {
                println!("Database");
                output::print_kv("url", &mask_password(&config.database.url));
                output::print_kv(
                    "connections",
                    &format!(
                        "{}..{}",
                        config.database.min_connections, config.database.max_connections
                    ),
                );
                output::print_kv(
                    "lock timeout",
                    &format!("{} ms", config.database.lock_timeout_ms),
                );
                println!("Tree");
                output::print_kv("reserved characters", &config.tree.reserved_characters);
                output::print_kv("max name length", &config.tree.max_name_length.to_string());
                output::print_kv(
                    "delete batch size",
                    &config.tree.delete_batch_size.to_string(),
                );
                output::print_kv(
                    "transaction retries",
                    &config.tree.transaction_retries.to_string(),
                );
                println!("Logging");
                output::print_kv("level", &config.logging.level);
                output::print_kv("format", &config.logging.format);
            }
        },
    }

    Ok(())
}

/// Mask the password in a database URL for display
fn mask_password(url: &str) -> String {
    let scheme_end = url.find("://").map_or(0, |i| i + 3);
    let Some(at_pos) = url.rfind('@').filter(|at| *at > scheme_end) else {
        return url.to_string();
    };
    match url[scheme_end..at_pos].find(':') {
        Some(colon) => format!("{}:****{}", &url[..scheme_end + colon], &url[at_pos..]),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgres://ft:secret@db:5432/ft"),
            "postgres://ft:****@db:5432/ft"
        );
        assert_eq!(mask_password("postgres://db/ft"), "postgres://db/ft");
    }
}
