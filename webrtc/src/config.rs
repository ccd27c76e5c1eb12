//! Peer connection configuration
//!
//! Everything a session needs at construction: gathering endpoints and
//! timeouts, agent tunables and the codecs we can echo. The value is
//! shared between sessions and never mutated after start-up.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use ice::{GathererConfig, IceAgentConfig};
use sdp::CodecCapability;

#[derive(Debug, Clone)]
pub struct PeerConnectionConfig {
    /// One UDP socket is bound per address for each session
    pub host_addresses: Vec<IpAddr>,
    pub gatherer: GathererConfig,
    pub agent: IceAgentConfig,
    /// Tick at which pending checks and keepalives are scheduled
    pub pacing_interval: Duration,
    /// Bound on tearing a session down, relay deallocation included
    pub cancellation_grace: Duration,
    /// How long an answer waits for server candidates
    pub answer_gather_timeout: Duration,
    pub capabilities: Vec<CodecCapability>,
    /// Capacity of the inbound media and STUN request queues
    pub queue_capacity: usize,
}

impl Default for PeerConnectionConfig {
    fn default() -> Self {
        Self {
            host_addresses: vec![IpAddr::V4(Ipv4Addr::UNSPECIFIED)],
            gatherer: GathererConfig::default(),
            agent: IceAgentConfig::default(),
            pacing_interval: Duration::from_millis(50),
            cancellation_grace: Duration::from_millis(2000),
            answer_gather_timeout: Duration::from_millis(1000),
            capabilities: CodecCapability::default_audio(),
            queue_capacity: 256,
        }
    }
}

impl PeerConnectionConfig {
    /// Loopback-only configuration without STUN/TURN, as used by tests.
    pub fn loopback() -> Self {
        Self {
            host_addresses: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            ..Self::default()
        }
    }
}
