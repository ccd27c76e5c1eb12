//! ICE agent implementation.
//!
//! The agent is a synchronous state machine: it owns candidates, pairs and
//! the selected pair, and tells its driver which checks to send. The driver
//! performs the network I/O and reports results back, then drains
//! [`IceAgent::poll_event`]. Time is always passed in, never read.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::candidate::Candidate;
use crate::candidate_builder::CandidateBuilder;
use crate::candidate_pair::{CandidatePair, PairId, PairState};
use crate::candidate_type::CandidateType;
use crate::connection_state::ConnectionState;
use crate::credentials::IceCredentials;
use crate::transport::PathId;

/// Tunables of connectivity checking and liveness.
#[derive(Debug, Clone)]
pub struct IceAgentConfig {
    /// Maximum simultaneous in-flight checks
    pub max_concurrent_checks: usize,
    /// Bound on a single check, retransmissions included
    pub check_timeout: Duration,
    /// Retries after the first failed check before a pair is dropped
    pub check_retries: u32,
    pub keepalive_interval: Duration,
    /// Consecutive keepalive failures that demote the selected pair
    pub liveness_failure_threshold: u32,
    /// Time allowed to find a new pair after liveness is lost
    pub recovery_window: Duration,
    /// Browsers offer, so the server agent is controlled
    pub controlling: bool,
}

impl Default for IceAgentConfig {
    fn default() -> Self {
        Self {
            max_concurrent_checks: 4,
            check_timeout: Duration::from_millis(2000),
            check_retries: 2,
            keepalive_interval: Duration::from_millis(2500),
            liveness_failure_threshold: 5,
            recovery_window: Duration::from_secs(10),
            controlling: false,
        }
    }
}

/// Something the driver must react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// The first connectivity check was issued
    Checking,
    /// A pair was selected, or a better pair replaced the selected one
    Selected(PairId),
    /// The selected pair stopped answering keepalives
    LivenessLost,
    /// A new pair was selected after liveness was lost
    Recovered(PairId),
    /// No viable pair remains
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Connectivity,
    Keepalive,
}

/// A check the driver must send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledCheck {
    pub pair: PairId,
    pub path: PathId,
    pub remote: SocketAddr,
    /// Value of the PRIORITY attribute
    pub priority: u32,
    pub kind: CheckKind,
}

#[derive(Debug, Clone)]
struct LocalEntry {
    candidate: Candidate,
    path: PathId,
    valid: bool,
}

/// ICE Agent that manages candidates, pairs and connectivity.
#[derive(Debug)]
pub struct IceAgent {
    config: IceAgentConfig,
    local_credentials: IceCredentials,
    remote_credentials: Option<IceCredentials>,
    tie_breaker: u64,
    local: Vec<LocalEntry>,
    remote: Vec<Candidate>,
    pairs: Vec<CandidatePair>,
    triggered: VecDeque<PairId>,
    selected: Option<PairId>,
    state: ConnectionState,
    consecutive_failures: u32,
    keepalive_in_flight: bool,
    next_keepalive: Option<Instant>,
    recovery_deadline: Option<Instant>,
    local_gathering_complete: bool,
    remote_end_of_candidates: bool,
    prflx_count: u32,
    events: VecDeque<AgentEvent>,
}

impl IceAgent {
    pub fn new(config: IceAgentConfig, local_credentials: IceCredentials) -> Self {
        Self {
            config,
            local_credentials,
            remote_credentials: None,
            tie_breaker: rand::random(),
            local: Vec::new(),
            remote: Vec::new(),
            pairs: Vec::new(),
            triggered: VecDeque::new(),
            selected: None,
            state: ConnectionState::New,
            consecutive_failures: 0,
            keepalive_in_flight: false,
            next_keepalive: None,
            recovery_deadline: None,
            local_gathering_complete: false,
            remote_end_of_candidates: false,
            prflx_count: 0,
            events: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &IceAgentConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn local_credentials(&self) -> &IceCredentials {
        &self.local_credentials
    }

    pub fn remote_credentials(&self) -> Option<&IceCredentials> {
        self.remote_credentials.as_ref()
    }

    pub fn tie_breaker(&self) -> u64 {
        self.tie_breaker
    }

    /// Sets the peer's credentials and unfreezes every pair.
    pub fn set_remote_credentials(&mut self, credentials: IceCredentials) {
        self.remote_credentials = Some(credentials);
        for pair in &mut self.pairs {
            if pair.state == PairState::Frozen {
                pair.state = PairState::Waiting;
            }
        }
    }

    /// Adds a local candidate reachable through `path` and pairs it with
    /// every known remote candidate.
    ///
    /// # Returns
    /// The number of pairs formed.
    pub fn add_local_candidate(&mut self, candidate: Candidate, path: PathId) -> usize {
        if self.state.is_terminal() || !candidate.is_udp() {
            return 0;
        }
        let addr = candidate.socket_addr();
        if self
            .local
            .iter()
            .any(|l| l.candidate.socket_addr() == addr && l.candidate.candidate_type == candidate.candidate_type)
        {
            return 0;
        }

        self.local.push(LocalEntry {
            candidate,
            path,
            valid: true,
        });
        let local_index = self.local.len() - 1;
        (0..self.remote.len())
            .filter(|&remote_index| self.form_pair(local_index, remote_index))
            .count()
    }

    /// Adds a remote candidate and pairs it with every valid local one.
    ///
    /// # Returns
    /// The number of pairs formed.
    pub fn add_remote_candidate(&mut self, candidate: Candidate) -> usize {
        if self.state.is_terminal() || !candidate.is_udp() {
            return 0;
        }
        let addr = candidate.socket_addr();
        if self.remote.iter().any(|r| r.socket_addr() == addr) {
            return 0;
        }

        self.remote.push(candidate);
        let remote_index = self.remote.len() - 1;
        (0..self.local.len())
            .filter(|&local_index| self.form_pair(local_index, remote_index))
            .count()
    }

    fn form_pair(&mut self, local_index: usize, remote_index: usize) -> bool {
        let local = &self.local[local_index];
        let remote = &self.remote[remote_index];

        if !local.valid
            || local.candidate.component_id != remote.component_id
            || local.candidate.address.is_ipv4() != remote.address.is_ipv4()
        {
            return false;
        }
        let (local_addr, remote_addr) = (local.candidate.socket_addr(), remote.socket_addr());
        if self
            .pairs
            .iter()
            .any(|p| p.local.socket_addr() == local_addr && p.remote.socket_addr() == remote_addr)
        {
            return false;
        }

        let id = self.pairs.len();
        let mut pair = CandidatePair::new(
            id,
            local.candidate.clone(),
            remote.clone(),
            local.path,
            self.config.controlling,
        );
        if self.remote_credentials.is_some() {
            pair.state = PairState::Waiting;
        }
        debug!(pair = id, %pair, priority = pair.priority, "Formed candidate pair");
        self.pairs.push(pair);
        true
    }

    /// Marks every local candidate at `addr` invalid and drops its pairs.
    ///
    /// Used when a relay allocation can no longer be refreshed. If the
    /// selected pair used it, liveness is considered lost.
    pub fn invalidate_local_candidate(&mut self, addr: SocketAddr, now: Instant) {
        for entry in self.local.iter_mut().filter(|l| l.candidate.socket_addr() == addr) {
            entry.valid = false;
        }

        let mut lost_selected = false;
        for pair in self.pairs.iter_mut().filter(|p| p.local.socket_addr() == addr) {
            pair.dropped = true;
            pair.state = PairState::Failed;
            lost_selected |= self.selected == Some(pair.id);
        }
        info!(%addr, "Local candidate invalidated");

        if lost_selected {
            self.lose_liveness(now);
        } else {
            self.check_exhausted();
        }
    }

    /// Local gathering produced its last candidate.
    pub fn set_local_gathering_complete(&mut self) {
        self.local_gathering_complete = true;
        self.check_exhausted();
    }

    /// The peer signaled end-of-candidates.
    pub fn set_remote_end_of_candidates(&mut self) {
        self.remote_end_of_candidates = true;
        self.check_exhausted();
    }

    /// Whether at least one usable local candidate exists.
    pub fn has_valid_local_candidates(&self) -> bool {
        self.local.iter().any(|l| l.valid)
    }

    /// Picks the checks to send now, up to the concurrency bound.
    ///
    /// Triggered checks go first, then waiting pairs by priority, then
    /// failed pairs with retry budget left.
    pub fn next_checks(&mut self) -> Vec<ScheduledCheck> {
        if self.state.is_terminal() || self.remote_credentials.is_none() {
            return Vec::new();
        }

        let in_flight = self
            .pairs
            .iter()
            .filter(|p| p.state == PairState::InProgress)
            .count();
        let capacity = self.config.max_concurrent_checks.saturating_sub(in_flight);
        if capacity == 0 {
            return Vec::new();
        }

        let mut order: Vec<PairId> = Vec::new();
        while let Some(id) = self.triggered.pop_front() {
            if self.pairs[id].is_checkable() && !order.contains(&id) {
                order.push(id);
            }
        }
        let mut queued: Vec<&CandidatePair> = self
            .pairs
            .iter()
            .filter(|p| p.is_checkable() && !order.contains(&p.id))
            .collect();
        queued.sort_by(|a, b| {
            let a_retry = a.state == PairState::Failed;
            let b_retry = b.state == PairState::Failed;
            a_retry.cmp(&b_retry).then(b.priority.cmp(&a.priority))
        });
        order.extend(queued.into_iter().map(|p| p.id));

        let checks: Vec<ScheduledCheck> = order
            .into_iter()
            .take(capacity)
            .map(|id| {
                let pair = &mut self.pairs[id];
                pair.state = PairState::InProgress;
                pair.attempts += 1;
                ScheduledCheck {
                    pair: id,
                    path: pair.path,
                    remote: pair.remote.socket_addr(),
                    priority: pair.local.peer_reflexive_priority(),
                    kind: CheckKind::Connectivity,
                }
            })
            .collect();

        if !checks.is_empty() && self.state == ConnectionState::New {
            self.state = ConnectionState::Checking;
            self.events.push_back(AgentEvent::Checking);
        }
        checks
    }

    /// A connectivity check on `pair` got a valid success response.
    pub fn on_check_succeeded(&mut self, pair: PairId, now: Instant) {
        if self.state.is_terminal() {
            return;
        }
        let Some(entry) = self.pairs.get_mut(pair) else {
            return;
        };
        if entry.state != PairState::InProgress {
            return;
        }
        entry.state = PairState::Succeeded;
        entry.succeeded_at = Some(now);
        debug!(pair, "Connectivity check succeeded");
        self.update_selection(now);
    }

    /// A connectivity check on `pair` timed out or was rejected.
    pub fn on_check_failed(&mut self, pair: PairId) {
        if self.state.is_terminal() {
            return;
        }
        let retries = self.config.check_retries;
        let Some(entry) = self.pairs.get_mut(pair) else {
            return;
        };
        if entry.state != PairState::InProgress {
            return;
        }
        entry.state = PairState::Failed;
        if entry.attempts > retries {
            entry.dropped = true;
            debug!(pair, attempts = entry.attempts, "Candidate pair dropped");
        }
        self.check_exhausted();
    }

    /// Returns the keepalive to send on the selected pair, if one is due.
    pub fn keepalive_due(&mut self, now: Instant) -> Option<ScheduledCheck> {
        if self.state != ConnectionState::Connected || self.keepalive_in_flight {
            return None;
        }
        let selected = self.selected?;
        if self.next_keepalive.is_some_and(|at| now < at) {
            return None;
        }

        self.keepalive_in_flight = true;
        let pair = &self.pairs[selected];
        Some(ScheduledCheck {
            pair: selected,
            path: pair.path,
            remote: pair.remote.socket_addr(),
            priority: pair.local.peer_reflexive_priority(),
            kind: CheckKind::Keepalive,
        })
    }

    /// Result of the keepalive previously returned by [`Self::keepalive_due`].
    pub fn on_keepalive_result(&mut self, pair: PairId, success: bool, now: Instant) {
        self.keepalive_in_flight = false;
        if self.state.is_terminal() || self.selected != Some(pair) {
            return;
        }
        self.next_keepalive = Some(now + self.config.keepalive_interval);

        if success {
            self.consecutive_failures = 0;
            return;
        }

        self.consecutive_failures += 1;
        debug!(pair, failures = self.consecutive_failures, "Keepalive failed");
        if self.consecutive_failures >= self.config.liveness_failure_threshold {
            self.lose_liveness(now);
        }
    }

    /// Records an authenticated check from the peer.
    ///
    /// Unknown source addresses become peer-reflexive remote candidates.
    /// The matching pair gets a triggered check.
    ///
    /// # Returns
    /// The pair the request arrived on, if the path has a local candidate.
    pub fn on_incoming_request(
        &mut self,
        path: PathId,
        from: SocketAddr,
        priority: u32,
    ) -> Option<PairId> {
        if self.state.is_terminal() {
            return None;
        }
        let base = self
            .local
            .iter()
            .find(|l| {
                l.valid
                    && l.path == path
                    && matches!(l.candidate.candidate_type, CandidateType::Host | CandidateType::Relay)
            })?
            .candidate
            .socket_addr();

        if !self.remote.iter().any(|r| r.socket_addr() == from) {
            self.prflx_count += 1;
            let candidate = CandidateBuilder::new()
                .foundation(format!("prflx{}", self.prflx_count))
                .socket_addr(from)
                .candidate_type(CandidateType::Prflx)
                .priority(priority)
                .build()
                .ok()?;
            debug!(%from, "Learned peer reflexive candidate");
            self.add_remote_candidate(candidate);
        }

        let pair = self
            .pairs
            .iter()
            .find(|p| p.local.socket_addr() == base && p.remote.socket_addr() == from)?;
        let id = pair.id;

        if self.remote_credentials.is_some()
            && !pair.dropped
            && matches!(pair.state, PairState::Frozen | PairState::Waiting | PairState::Failed)
        {
            self.pairs[id].state = PairState::Waiting;
            self.triggered.push_back(id);
        }
        Some(id)
    }

    /// Applies deadlines that have passed.
    pub fn handle_timeout(&mut self, now: Instant) {
        if self.state == ConnectionState::Disconnected
            && self.recovery_deadline.is_some_and(|deadline| now >= deadline)
        {
            warn!("Recovery window elapsed without a working pair");
            self.fail();
        }
    }

    /// Next instant at which [`Self::handle_timeout`] or
    /// [`Self::keepalive_due`] has work.
    pub fn poll_timeout(&self) -> Option<Instant> {
        match self.state {
            ConnectionState::Connected if !self.keepalive_in_flight => self.next_keepalive,
            ConnectionState::Disconnected => self.recovery_deadline,
            _ => None,
        }
    }

    pub fn poll_event(&mut self) -> Option<AgentEvent> {
        self.events.pop_front()
    }

    pub fn selected_pair(&self) -> Option<&CandidatePair> {
        self.selected.map(|id| &self.pairs[id])
    }

    pub fn pair(&self, id: PairId) -> Option<&CandidatePair> {
        self.pairs.get(id)
    }

    pub fn pairs(&self) -> &[CandidatePair] {
        &self.pairs
    }

    pub fn local_candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.local.iter().map(|l| &l.candidate)
    }

    pub fn remote_candidates(&self) -> &[Candidate] {
        &self.remote
    }

    /// Stops the agent; every later input is ignored.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
        self.selected = None;
        self.triggered.clear();
        self.next_keepalive = None;
        self.recovery_deadline = None;
    }

    fn update_selection(&mut self, now: Instant) {
        let best = self
            .pairs
            .iter()
            .filter(|p| p.state == PairState::Succeeded && !p.dropped)
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(b.succeeded_at.cmp(&a.succeeded_at))
            })
            .map(|p| p.id);
        let Some(best) = best else {
            return;
        };

        match self.selected {
            None => {
                self.selected = Some(best);
                self.consecutive_failures = 0;
                self.keepalive_in_flight = false;
                self.next_keepalive = Some(now + self.config.keepalive_interval);
                self.recovery_deadline = None;
                let event = if self.state == ConnectionState::Disconnected {
                    AgentEvent::Recovered(best)
                } else {
                    AgentEvent::Selected(best)
                };
                self.state = ConnectionState::Connected;
                info!(pair = best, selected = %self.pairs[best], "Selected candidate pair");
                self.events.push_back(event);
            }
            Some(current) if best != current && self.pairs[best].priority > self.pairs[current].priority => {
                self.selected = Some(best);
                self.consecutive_failures = 0;
                info!(pair = best, selected = %self.pairs[best], "Switched to higher priority pair");
                self.events.push_back(AgentEvent::Selected(best));
            }
            Some(_) => {}
        }
    }

    fn lose_liveness(&mut self, now: Instant) {
        let lost = self.selected.take();
        self.consecutive_failures = 0;
        self.keepalive_in_flight = false;
        self.next_keepalive = None;
        self.triggered.clear();

        for pair in self.pairs.iter_mut().filter(|p| !p.dropped) {
            pair.requeue();
        }

        if !self.pairs.iter().any(|p| !p.dropped) {
            warn!(?lost, "Liveness lost and no candidate pair remains");
            self.fail();
            return;
        }

        warn!(?lost, "Liveness lost on selected pair, re-checking remaining pairs");
        self.state = ConnectionState::Disconnected;
        self.recovery_deadline = Some(now + self.config.recovery_window);
        self.events.push_back(AgentEvent::LivenessLost);
    }

    fn check_exhausted(&mut self) {
        if self.selected.is_some() || self.state.is_terminal() {
            return;
        }
        if self.pairs.iter().any(|p| !p.dropped) {
            return;
        }

        let exhausted = match self.state {
            ConnectionState::Disconnected => true,
            ConnectionState::New | ConnectionState::Checking => {
                self.local_gathering_complete && self.remote_end_of_candidates
            }
            _ => false,
        };
        if exhausted {
            warn!(pairs = self.pairs.len(), "All candidate pairs failed");
            self.fail();
        }
    }

    fn fail(&mut self) {
        self.state = ConnectionState::Failed;
        self.selected = None;
        self.triggered.clear();
        self.recovery_deadline = None;
        self.next_keepalive = None;
        self.events.push_back(AgentEvent::Failed);
    }
}
