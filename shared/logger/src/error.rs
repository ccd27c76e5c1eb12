//! Error types for logging initialisation.

use std::io;

use thiserror::Error;

/// Result type for logging operations.
pub type Result<T> = std::result::Result<T, LoggingError>;

#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log file or its directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A global subscriber is already installed.
    #[error("logging already initialised: {0}")]
    AlreadyInitialized(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = Error::new(ErrorKind::PermissionDenied, "denied");
        let logging_err: LoggingError = io_err.into();
        assert!(matches!(logging_err, LoggingError::Io(_)));
        assert_eq!(logging_err.to_string(), "I/O error: denied");
    }
}
