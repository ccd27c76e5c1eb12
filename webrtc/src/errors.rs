//! Error types of the peer connection layer.

use ice::IceError;
use sdp::DecodeError;
use thiserror::Error;

use crate::peer_connection::PeerConnectionState;

#[derive(Debug, Error)]
pub enum PeerConnectionError {
    /// The session description could not be decoded or negotiated
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Signaling that the current state does not allow; the state is unchanged
    #[error("cannot {action} in state {state}")]
    InvalidTransition {
        state: PeerConnectionState,
        action: &'static str,
    },

    /// A trickled candidate that is not a valid ICE candidate
    #[error("invalid candidate: {0}")]
    InvalidCandidate(IceError),

    /// No usable local or remote candidate remains
    #[error("no viable candidates")]
    NoViableCandidates,

    #[error("certificate generation failed: {0}")]
    Certificate(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session task has stopped
    #[error("peer connection closed")]
    Closed,
}

impl PeerConnectionError {
    pub fn invalid_transition(state: PeerConnectionState, action: &'static str) -> Self {
        PeerConnectionError::InvalidTransition { state, action }
    }
}
