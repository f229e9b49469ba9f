//! Logging setup: console output plus an optional daily rolling file
//!
//! `RUST_LOG` takes precedence over the configured level for both layers.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::Configuration;

const LOG_FILE_NAME: &str = "storage-lock.log";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file_logging: bool,
    pub log_dir: PathBuf,
}

impl LoggingConfig {
    pub fn from_configuration(configuration: &Configuration) -> Self {
        Self {
            level: configuration.log_level(),
            file_logging: configuration.file_logging(),
            log_dir: configuration.log_dir(),
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Keeps the file writer flushing; hold it until the program exits.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(true)
        .with_filter(config.filter());
    layers.push(Box::new(console_layer));

    let mut file_guard = None;
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_filter(config.filter());
        layers.push(Box::new(file_layer));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    if config.file_logging {
        tracing::info!(log_dir = %config.log_dir.display(), "File logging enabled");
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Overrides;

    #[test]
    fn test_logging_config_follows_configuration() {
        let configuration = Configuration::load(&Overrides {
            config_file: Some(PathBuf::from("does/not/exist.yml")),
            log_level: Some("debug".to_string()),
            ..Default::default()
        })
        .unwrap();
        let config = LoggingConfig::from_configuration(&configuration);
        assert_eq!(config.level, "debug");
        assert!(!config.file_logging);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }
}
