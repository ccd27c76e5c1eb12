use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::log_level::LogLevel;

/// Where log lines go and how verbose they are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: LogLevel,
    pub enable_console: bool,
    pub enable_file: bool,
    pub log_file_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: LogLevel::Info,
            enable_console: true,
            enable_file: false,
            log_file_path: PathBuf::from("logs/echo-server.log"),
        }
    }
}
