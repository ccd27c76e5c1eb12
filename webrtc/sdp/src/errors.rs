//! Error types for SDP operations.
//!
//! Decoding is the only fallible operation: serialization of a
//! [`SessionDescription`](crate::SessionDescription) always succeeds.

use thiserror::Error;

/// Error type for SDP decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The text is not a structurally valid session description
    #[error("malformed session description: {0}")]
    MalformedSyntax(String),

    /// No offered codec is in the local capability list
    #[error("no mutually supported media codec")]
    UnsupportedMedia,
}

impl DecodeError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        DecodeError::MalformedSyntax(msg.into())
    }
}
