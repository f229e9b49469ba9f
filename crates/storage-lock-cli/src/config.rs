//! Configuration for the storage-lock tool
//!
//! Sources, later ones winning:
//! 1. `conf/storage-lock.yml` (or `--config`)
//! 2. `STORAGE_LOCK__*` environment variables (`__` separates nested keys)
//! 3. Command line overrides

use std::path::PathBuf;

use config::{Config, Environment, File};
use storage_lock_common::DEFAULT_STORAGE_TABLE_NAME;
use storage_lock_sql::{DatabaseOptions, Dialect};

pub const DEFAULT_CONFIG_FILE: &str = "conf/storage-lock.yml";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://storage-lock.db?mode=rwc";

const DB_URL: &str = "db.url";
const STORAGE_TABLE: &str = "storage.table";
const STORAGE_DIALECT: &str = "storage.dialect";
const LOGGING_LEVEL: &str = "logging.level";
const LOGGING_FILE_ENABLED: &str = "logging.file";
const LOGGING_DIR: &str = "logging.dir";

/// Values given on the command line that override every other source
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub database_url: Option<String>,
    pub table: Option<String>,
    pub dialect: Option<String>,
    pub log_level: Option<String>,
}

/// Application configuration loaded from file, environment and CLI
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn load(overrides: &Overrides) -> anyhow::Result<Self> {
        let config_file = overrides
            .config_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config_builder = Config::builder()
            .set_default(DB_URL, DEFAULT_DATABASE_URL)?
            .add_source(File::from(config_file).required(false))
            .add_source(
                Environment::with_prefix("STORAGE_LOCK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = &overrides.database_url {
            config_builder = config_builder.set_override(DB_URL, v.as_str())?;
        }
        if let Some(v) = &overrides.table {
            config_builder = config_builder.set_override(STORAGE_TABLE, v.as_str())?;
        }
        if let Some(v) = &overrides.dialect {
            config_builder = config_builder.set_override(STORAGE_DIALECT, v.as_str())?;
        }
        if let Some(v) = &overrides.log_level {
            config_builder = config_builder.set_override(LOGGING_LEVEL, v.as_str())?;
        }

        Ok(Configuration {
            config: config_builder.build()?,
        })
    }

    // ========================================================================
    // Database Configuration
    // ========================================================================

    /// Pool settings under `db`; missing keys take the pool defaults
    pub fn database_options(&self) -> anyhow::Result<DatabaseOptions> {
        Ok(self.config.get::<DatabaseOptions>("db")?)
    }

    // ========================================================================
    // Storage Configuration
    // ========================================================================

    pub fn table_full_name(&self) -> String {
        self.config
            .get_string(STORAGE_TABLE)
            .unwrap_or(DEFAULT_STORAGE_TABLE_NAME.to_string())
    }

    /// Explicitly configured dialect, if any
    pub fn dialect(&self) -> anyhow::Result<Option<Dialect>> {
        match self.config.get_string(STORAGE_DIALECT) {
            Ok(name) => Ok(Some(name.parse()?)),
            Err(config::ConfigError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn log_level(&self) -> String {
        self.config
            .get_string(LOGGING_LEVEL)
            .unwrap_or("info".to_string())
    }

    pub fn file_logging(&self) -> bool {
        self.config.get_bool(LOGGING_FILE_ENABLED).unwrap_or(false)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.config
            .get_string(LOGGING_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"))
    }
}
