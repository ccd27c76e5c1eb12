use thiserror::Error;

/// Result type used across the crate
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while locating or loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The file exists but could not be read
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The content is not valid JSON for the requested type
    #[error("invalid configuration in {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value was read but is not acceptable
    #[error("invalid configuration value: {0}")]
    Invalid(String),
}
