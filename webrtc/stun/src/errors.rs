//! STUN error types
//!
//! All errors are wrapped in `StunError` for consistent error handling across
//! STUN protocol operations.

use thiserror::Error;

/// Errors that can occur during STUN operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StunError {
    #[error("Invalid message type: 0x{0:04X}")]
    InvalidMessageType(u16),

    #[error("Invalid magic cookie")]
    InvalidMagicCookie,

    #[error("Invalid attribute format")]
    InvalidAttributeFormat,

    #[error("Invalid address family: 0x{0:02X}")]
    InvalidAddressFamily(u8),

    #[error("Message too short")]
    MessageTooShort,

    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("Missing attribute: 0x{0:04X}")]
    MissingAttribute(u16),

    #[error("MESSAGE-INTEGRITY check failed")]
    IntegrityMismatch,

    #[error("FINGERPRINT check failed")]
    FingerprintMismatch,

    #[error("Error response {code}: {reason}")]
    ErrorResponse { code: u16, reason: String },

    #[error("Socket error: {0}")]
    SocketError(String),

    #[error("Timeout waiting for response")]
    Timeout,

    #[error("Transaction cancelled")]
    Cancelled,

    #[error("Unexpected message type")]
    UnexpectedMessageType,
}

impl From<std::io::Error> for StunError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => StunError::Timeout,
            _ => StunError::SocketError(err.to_string()),
        }
    }
}
