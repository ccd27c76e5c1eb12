//! ICE Module - Interactive Connectivity Establishment
//!
//! Implementation of ICE (RFC 8445) for the controlled role over UDP:
//! candidate gathering through STUN/TURN, pair formation, connectivity
//! checks and liveness of the selected pair.

pub mod candidate;
pub mod candidate_builder;
pub mod candidate_pair;
pub mod candidate_type;
pub mod connection_state;
pub mod connectivity;
pub mod credentials;
pub mod errors;
pub mod gatherer;
pub mod ice_agent;
pub mod ip_detection;
pub mod transport;

pub use candidate::Candidate;
pub use candidate_builder::CandidateBuilder;
pub use candidate_pair::{CandidatePair, PairId, PairState};
pub use candidate_type::CandidateType;
pub use connection_state::ConnectionState;
pub use connectivity::{
    IncomingCheck, Rejection, build_binding_request, error_response, perform_connectivity_check,
    success_response, validate_incoming_request,
};
pub use credentials::IceCredentials;
pub use errors::{GatherError, IceError};
pub use gatherer::{
    CandidateGatherer, CandidateStream, GatherEvent, GatheredCandidate, GathererConfig,
    IceServer, RelayAllocation, ServerKind,
};
pub use ice_agent::{AgentEvent, CheckKind, IceAgent, IceAgentConfig, ScheduledCheck};
pub use ip_detection::detect_local_ip;
pub use transport::{Datagram, Demux, InboundRequest, LocalPath, PathId};
