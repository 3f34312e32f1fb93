//! Application configuration schemas.
//!
//! Configuration is layered with the `config` crate: `config/default.toml`,
//! then an environment overlay, then `FOLDERTREE__*` environment variables.

pub mod database;
pub mod logging;
pub mod tree;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::tree::TreeConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Folder tree behaviour.
    #[serde(default)]
    pub tree: TreeConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration for the given environment name.
    ///
    /// `config/default` is optional, `config/{env}` overrides it, and
    /// environment variables prefixed with `FOLDERTREE` (nested with `__`)
    /// override both. The tree section is validated after loading.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("FOLDERTREE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        Self::from_config(config)
    }

    /// Load configuration from an explicit file path plus environment variables.
    pub fn load_file(path: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("FOLDERTREE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        Self::from_config(config)
    }

    fn from_config(config: config::Config) -> Result<Self, AppError> {
        let app: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        app.tree.validate()?;
        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_applies_defaults() {
        let config = config::Config::builder()
            .set_override("database.url", "postgres://localhost/foldertree")
            .expect("override")
            .build()
            .expect("build");

        let app = AppConfig::from_config(config).expect("valid config");
        assert_eq!(app.database.max_connections, 20);
        assert_eq!(app.tree.delete_batch_size, 10);
        assert_eq!(app.logging.level, "info");
    }

    #[test]
    fn test_from_config_rejects_invalid_tree_section() {
        let config = config::Config::builder()
            .set_override("database.url", "postgres://localhost/foldertree")
            .expect("override")
            .set_override("tree.delete_batch_size", 0)
            .expect("override")
            .build()
            .expect("build");

        let err = AppConfig::from_config(config).expect_err("batch size 0 is invalid");
        assert_eq!(err.kind, crate::error::ErrorKind::Configuration);
    }
}
