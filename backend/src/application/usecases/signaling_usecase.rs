//! Offer/answer and trickle ICE use cases.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use webrtc::{
    PeerConnectionError, PeerConnectionState, RelayStatsSnapshot, SdpType, SelectedPair,
    SessionDescription,
};

use crate::domain::SessionId;
use crate::infrastructure::{RegistryError, SessionRegistry};

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    PeerConnection(#[from] PeerConnectionError),

    /// The request is well-formed JSON but not something we can act on
    #[error("{0}")]
    BadRequest(String),
}

/// The answer to an accepted offer and the session it created.
#[derive(Debug, Clone)]
pub struct OfferOutcome {
    pub session_id: SessionId,
    pub answer: SessionDescription,
}

#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub state: PeerConnectionState,
    pub selected: Option<SelectedPair>,
    pub stats: RelayStatsSnapshot,
}

/// Signaling use case handler
#[derive(Clone)]
pub struct SignalingUseCase {
    registry: SessionRegistry,
}

impl SignalingUseCase {
    pub fn new(registry: SessionRegistry) -> Self {
        SignalingUseCase { registry }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Creates a session for the offer and answers it.
    ///
    /// A session whose offer is rejected is closed and removed before the
    /// error is returned.
    pub async fn handle_offer(
        &self,
        sdp_type: SdpType,
        sdp: &str,
        client_id: Option<String>,
    ) -> Result<OfferOutcome, SignalingError> {
        if sdp_type != SdpType::Offer {
            return Err(SignalingError::BadRequest(format!(
                "expected an offer, got {sdp_type}"
            )));
        }

        let session = self.registry.create(client_id).await?;
        let session_id = session.id().to_string();

        match session.connection().accept_offer(sdp).await {
            Ok(answer) => {
                info!(
                    session_id = %session_id,
                    candidates = answer.media.first().map_or(0, |m| m.candidates.len()),
                    "Offer answered"
                );
                Ok(OfferOutcome { session_id, answer })
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Offer rejected");
                // Already gone if the sweep or a replacing offer got there first
                let _ = self.registry.close(&session_id).await;
                Err(e.into())
            }
        }
    }

    /// Applies trickled client candidates and returns the server candidates
    /// not reported yet.
    pub async fn handle_candidates(
        &self,
        session_id: &str,
        candidates: &[String],
        end_of_candidates: bool,
    ) -> Result<Vec<String>, SignalingError> {
        let session = self.registry.get(session_id)?;
        session.touch();

        let connection = session.connection();
        connection
            .add_remote_candidates(candidates, end_of_candidates)
            .await?;
        Ok(connection.take_local_candidates().await?)
    }

    pub fn session_status(&self, session_id: &str) -> Result<SessionStatus, SignalingError> {
        let session = self.registry.get(session_id)?;
        let snapshot = session.connection().snapshot();
        Ok(SessionStatus {
            session_id: session.id().to_string(),
            created_at: session.created_at(),
            state: snapshot.state,
            selected: snapshot.selected,
            stats: session.connection().stats(),
        })
    }

    pub async fn close_session(&self, session_id: &str) -> Result<(), SignalingError> {
        Ok(self.registry.close(session_id).await?)
    }

    pub fn live_sessions(&self) -> usize {
        self.registry.len()
    }

    pub async fn shutdown(&self) {
        self.registry.close_all().await;
    }
}
