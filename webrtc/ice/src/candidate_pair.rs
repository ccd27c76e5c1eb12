//! ICE candidate pair management.
//!
//! Pairs combine one local and one remote candidate, carry the check state
//! and the pair priority used to order checks and pick the selected pair.

use std::time::Instant;

use crate::candidate::Candidate;
use crate::transport::PathId;

/// Index of a pair inside its agent; stable for the agent's lifetime.
pub type PairId = usize;

/// Connectivity-check state of a pair (RFC 8445 Section 6.1.2.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairState {
    /// Waiting for remote credentials before it may be checked
    #[default]
    Frozen,
    Waiting,
    InProgress,
    Succeeded,
    Failed,
}

impl PairState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairState::Frozen => "frozen",
            PairState::Waiting => "waiting",
            PairState::InProgress => "in-progress",
            PairState::Succeeded => "succeeded",
            PairState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PairState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a pair of local and remote candidates for connectivity checking.
#[derive(Debug, Clone)]
pub struct CandidatePair {
    pub id: PairId,
    pub local: Candidate,
    pub remote: Candidate,
    /// Local path the checks and media for this pair travel on
    pub path: PathId,
    pub priority: u64,
    pub state: PairState,
    /// Checks issued in the current budget
    pub attempts: u32,
    pub succeeded_at: Option<Instant>,
    /// Exhausted its retry budget; never checked again
    pub dropped: bool,
}

impl CandidatePair {
    /// Creates a new candidate pair with calculated priority.
    ///
    /// # Arguments
    /// * `id` - Index assigned by the owning agent
    /// * `local` - The local candidate
    /// * `remote` - The remote candidate
    /// * `path` - Local path the local candidate is reachable on
    /// * `controlling` - Whether the local agent has the controlling role
    pub fn new(
        id: PairId,
        local: Candidate,
        remote: Candidate,
        path: PathId,
        controlling: bool,
    ) -> Self {
        let priority = if controlling {
            Self::calculate_priority(local.priority, remote.priority)
        } else {
            Self::calculate_priority(remote.priority, local.priority)
        };

        Self {
            id,
            local,
            remote,
            path,
            priority,
            state: PairState::Frozen,
            attempts: 0,
            succeeded_at: None,
            dropped: false,
        }
    }

    /// Calculates the priority for a candidate pair.
    ///
    /// pair priority = 2^32 * MIN(G,D) + 2 * MAX(G,D) + (G>D?1:0)
    ///
    /// # Arguments
    /// * `g` - Priority of controlling agent's candidate
    /// * `d` - Priority of controlled agent's candidate
    pub fn calculate_priority(g: u32, d: u32) -> u64 {
        let min = g.min(d) as u64;
        let max = g.max(d) as u64;
        let g_greater = if g > d { 1u64 } else { 0u64 };

        (1u64 << 32) * min + 2 * max + g_greater
    }

    /// Whether the pair may still be scheduled for a check.
    pub fn is_checkable(&self) -> bool {
        !self.dropped && matches!(self.state, PairState::Waiting | PairState::Failed)
    }

    /// Restores a fresh retry budget; used when liveness on the selected
    /// pair is lost and the remaining pairs are re-evaluated.
    pub fn requeue(&mut self) {
        self.state = PairState::Waiting;
        self.attempts = 0;
        self.succeeded_at = None;
    }
}

impl std::fmt::Display for CandidatePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} -> {} {}",
            self.local.candidate_type,
            self.local.socket_addr(),
            self.remote.candidate_type,
            self.remote.socket_addr()
        )
    }
}
