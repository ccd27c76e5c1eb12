use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Session lifecycle limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Maximum concurrent live sessions
    pub max_sessions: usize,
    /// Sessions without signaling activity for this long are closed
    pub idle_timeout_secs: u64,
    /// How long failed or closed sessions stay visible
    pub terminal_grace_secs: u64,
    pub sweep_interval_ms: u64,
    /// Bound on closing one session
    pub cancellation_grace_ms: u64,
    /// Server candidates waited for before answering
    pub answer_gather_timeout_ms: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        SessionsConfig {
            max_sessions: 100,
            idle_timeout_secs: 300,
            terminal_grace_secs: 30,
            sweep_interval_ms: 5_000,
            cancellation_grace_ms: 2_000,
            answer_gather_timeout_ms: 1_000,
        }
    }
}

impl SessionsConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn terminal_grace(&self) -> Duration {
        Duration::from_secs(self.terminal_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
