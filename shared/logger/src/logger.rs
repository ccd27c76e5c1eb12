//! Subscriber construction and global installation.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::Subscriber;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;
use crate::error::{LoggingError, Result};

/// Installs the global subscriber described by `config`.
///
/// `RUST_LOG`, when set, replaces the configured level. Can only succeed
/// once per process.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a subscriber is
/// already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    build_subscriber(config)?
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

/// Builds the subscriber without installing it.
///
/// Console output goes to stdout with colours; file output is appended
/// without ANSI escapes.
pub fn build_subscriber(config: &LoggingConfig) -> Result<impl Subscriber + Send + Sync + 'static> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(config.log_level).into())
        .from_env_lossy();

    let console = config.enable_console.then(|| fmt::layer().with_target(true));

    let file = if config.enable_file {
        let file = open_log_file(&config.log_file_path)?;
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Arc::new(file)),
        )
    } else {
        None
    };

    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file))
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogLevel;
    use tempfile::tempdir;

    fn file_config(path: &Path, level: LogLevel) -> LoggingConfig {
        LoggingConfig {
            log_level: level,
            enable_console: false,
            enable_file: true,
            log_file_path: path.to_path_buf(),
        }
    }

    #[test]
    fn test_file_layer_creates_directories() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("nested").join("server.log");

        let subscriber = build_subscriber(&file_config(&log_path, LogLevel::Info)).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(session_id = "sess_1", "Session created");
        });

        let content = fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("Session created"));
        assert!(content.contains("session_id=\"sess_1\""));
        assert!(!content.contains('\u{1b}'));
    }

    #[test]
    fn test_file_layer_appends() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("server.log");
        fs::write(&log_path, "previous line\n").unwrap();

        let subscriber = build_subscriber(&file_config(&log_path, LogLevel::Info)).unwrap();
        tracing::subscriber::with_default(subscriber, || tracing::warn!("Appended"));

        let content = fs::read_to_string(&log_path).unwrap();
        assert!(content.starts_with("previous line\n"));
        assert!(content.contains("Appended"));
    }

    #[test]
    fn test_disabled_outputs_build() {
        let config = LoggingConfig {
            enable_console: false,
            ..LoggingConfig::default()
        };
        assert!(build_subscriber(&config).is_ok());
    }
}
