//! # WebRTC - audio echo peer connection
//!
//! Composes the STUN/TURN clients, the ICE agent and the SDP codec into a
//! peer connection that answers browser offers and echoes their audio.
//!
//! ## Public API
//!
//! ### Peer connection
//! - **`PeerConnection`** - Cloneable handle to one session task
//! - **`PeerConnectionState`** - Signaling and connectivity lifecycle
//! - **`PeerConnectionConfig`** - Gathering, checking and codec settings
//! - **`Certificate`** - Transport identity advertised as a fingerprint
//!
//! ### Media
//! - **`MediaRelay`** - Echoes datagrams received on the selected path
//! - **`RelayStatsSnapshot`** - Forwarded and dropped packet counters
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use webrtc::{Certificate, PeerConnection, PeerConnectionConfig};
//!
//! # async fn example(offer: &str) -> Result<(), webrtc::PeerConnectionError> {
//! let config = Arc::new(PeerConnectionConfig::default());
//! let certificate = Arc::new(Certificate::generate()?);
//!
//! let connection = PeerConnection::new("sess_1", config, certificate).await?;
//! let answer = connection.accept_offer(offer).await?;
//! println!("{}", answer.serialize());
//!
//! connection.close().await;
//! # Ok(())
//! # }
//! ```

pub mod certificate;
pub mod config;
pub mod errors;
pub mod negotiation;
pub mod peer_connection;
pub mod relay;

// ===== PUBLIC API - Peer connection =====
pub use certificate::Certificate;
pub use config::PeerConnectionConfig;
pub use errors::PeerConnectionError;
pub use peer_connection::{PeerConnection, PeerConnectionState, SelectedPair, StateSnapshot};
pub use relay::{MediaRelay, RelayStats, RelayStatsSnapshot, SelectedPath};

// ===== PUBLIC API - ICE =====
pub use ice::{
    Candidate, CandidateType, GatherError, GathererConfig, IceAgentConfig, IceCredentials, IceError,
    IceServer,
};

// ===== PUBLIC API - SDP =====
pub use sdp::{CodecCapability, DecodeError, SdpCodec, SdpType, SessionDescription};

// ===== PUBLIC API - TURN =====
pub use turn::Credentials;
