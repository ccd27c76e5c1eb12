use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

/// A STUN or TURN endpoint as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    /// `stun:host[:port]` or `turn:host[:port]`
    pub url: String,
    #[serde(default)]
    pub transport: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn is_turn(&self) -> bool {
        self.url
            .get(..5)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("turn:"))
    }
}

/// Gathering and connectivity check tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    /// One host socket is bound per address for each session
    pub host_addresses: Vec<IpAddr>,
    /// Advertised instead of an unspecified bind address
    pub advertised_address: Option<IpAddr>,
    pub servers: Vec<IceServerConfig>,
    pub check_timeout_ms: u64,
    /// Retries after the first failed check
    pub check_retries: u32,
    pub max_concurrent_checks: usize,
    pub pacing_interval_ms: u64,
    pub keepalive_interval_ms: u64,
    pub liveness_failure_threshold: u32,
    pub recovery_window_ms: u64,
    pub stun_timeout_ms: u64,
    pub allocation_lifetime_secs: u64,
    pub refresh_ratio: f64,
}

impl Default for IceConfig {
    fn default() -> Self {
        IceConfig {
            host_addresses: vec![IpAddr::V4(Ipv4Addr::UNSPECIFIED)],
            advertised_address: None,
            servers: Vec::new(),
            check_timeout_ms: 2_000,
            check_retries: 2,
            max_concurrent_checks: 4,
            pacing_interval_ms: 50,
            keepalive_interval_ms: 2_500,
            liveness_failure_threshold: 5,
            recovery_window_ms: 10_000,
            stun_timeout_ms: 3_000,
            allocation_lifetime_secs: 600,
            refresh_ratio: 0.5,
        }
    }
}
