//! Error types for ICE operations.
//!
//! `IceError` covers candidate parsing and connectivity checks;
//! `GatherError` is reported per STUN/TURN endpoint while gathering.

use thiserror::Error;

use stun::StunError;
use turn::TurnError;

/// Errors that can occur during ICE operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IceError {
    #[error("Invalid candidate format")]
    InvalidCandidateFormat,

    #[error("Invalid candidate type: {0}")]
    InvalidCandidateType(String),

    #[error("Invalid transport protocol")]
    InvalidTransportProtocol,

    #[error("Invalid priority value")]
    InvalidPriority,

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid IP address")]
    InvalidIpAddress,

    /// The candidate carries a hostname (typically an mDNS `.local` name)
    /// instead of an IP literal.
    #[error("Unresolved candidate hostname: {0}")]
    UnresolvedHostname(String),

    #[error("Invalid foundation")]
    InvalidFoundation,

    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("Invalid component ID (must be 1 or 2)")]
    InvalidComponentId,

    #[error("Connectivity check timed out")]
    CheckTimeout,

    #[error("Connectivity check failed: {0}")]
    CheckFailed(String),

    #[error("No viable candidates")]
    NoViableCandidates,

    #[error("Remote ICE credentials are unknown")]
    MissingRemoteCredentials,

    #[error("Unknown candidate pair {0}")]
    UnknownPair(usize),

    #[error("Socket error: {0}")]
    SocketError(String),

    #[error("ICE agent closed")]
    Closed,
}

impl From<StunError> for IceError {
    fn from(err: StunError) -> Self {
        match err {
            StunError::Timeout => IceError::CheckTimeout,
            StunError::Cancelled => IceError::Closed,
            StunError::SocketError(e) => IceError::SocketError(e),
            other => IceError::CheckFailed(other.to_string()),
        }
    }
}

impl From<TurnError> for IceError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::Stun(stun) => stun.into(),
            TurnError::Closed => IceError::Closed,
            other => IceError::SocketError(other.to_string()),
        }
    }
}

/// Failure of a single STUN/TURN endpoint during gathering.
#[derive(Debug, Error)]
pub enum GatherError {
    #[error("Invalid ICE server URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported ICE server transport: {0}")]
    UnsupportedTransport(String),

    #[error("No usable local address: {0}")]
    NoLocalAddress(String),

    #[error("Server has no address in the family of {0}")]
    NoMatchingFamily(String),

    #[error("STUN binding failed: {0}")]
    Stun(#[from] StunError),

    #[error("TURN allocation failed: {0}")]
    Turn(#[from] TurnError),

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatherError {
    /// True when a TURN server rejected our credentials.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, GatherError::Turn(e) if e.is_auth_rejection())
    }
}
