//! TURN error types.

use thiserror::Error;

use stun::StunError;

pub type Result<T> = std::result::Result<T, TurnError>;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("STUN error: {0}")]
    Stun(#[from] StunError),

    /// The server demanded credentials we do not have, or rejected ours.
    #[error("Credentials rejected by {0}")]
    Unauthorized(std::net::SocketAddr),

    #[error("TURN error response {code}: {reason}")]
    ErrorResponse { code: u16, reason: String },

    #[error("No active allocation")]
    NoAllocation,

    #[error("Missing attribute in response: {0}")]
    MissingAttribute(&'static str),

    #[error("Client closed")]
    Closed,
}

impl TurnError {
    /// True when the failure is an authentication rejection.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self,
            TurnError::Unauthorized(_) | TurnError::ErrorResponse { code: 401, .. }
        )
    }
}
