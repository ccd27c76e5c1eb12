//! JSON bodies of the signaling endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use webrtc::{RelayStatsSnapshot, SdpType, SelectedPair};

use crate::application::usecases::{OfferOutcome, SessionStatus};

/// `POST /offer`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRequest {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// Keeps at most one live session per client when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferResponse {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub session_id: String,
}

impl From<OfferOutcome> for OfferResponse {
    fn from(outcome: OfferOutcome) -> Self {
        Self {
            sdp: outcome.answer.serialize(),
            sdp_type: outcome.answer.sdp_type,
            session_id: outcome.session_id,
        }
    }
}

/// `POST /sessions/{id}/candidates`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatesRequest {
    #[serde(default)]
    pub candidates: Vec<String>,
    #[serde(default)]
    pub end_of_candidates: bool,
}

/// Server candidates not reported to the client before.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatesResponse {
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedPairResponse {
    pub local: String,
    pub remote: String,
}

impl From<SelectedPair> for SelectedPairResponse {
    fn from(pair: SelectedPair) -> Self {
        Self {
            local: pair.local.to_string(),
            remote: pair.remote.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStatsResponse {
    pub forwarded_packets: u64,
    pub forwarded_bytes: u64,
    pub dropped_packets: u64,
}

impl From<RelayStatsSnapshot> for RelayStatsResponse {
    fn from(stats: RelayStatsSnapshot) -> Self {
        Self {
            forwarded_packets: stats.forwarded_packets,
            forwarded_bytes: stats.forwarded_bytes,
            dropped_packets: stats.dropped_packets,
        }
    }
}

/// `GET /sessions/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub state: String,
    pub selected_pair: Option<SelectedPairResponse>,
    pub stats: RelayStatsResponse,
}

impl From<SessionStatus> for SessionResponse {
    fn from(status: SessionStatus) -> Self {
        Self {
            session_id: status.session_id,
            created_at: status.created_at,
            state: status.state.as_str().to_string(),
            selected_pair: status.selected.map(Into::into),
            stats: status.stats.into(),
        }
    }
}

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
