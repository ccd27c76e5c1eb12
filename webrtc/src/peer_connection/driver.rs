//! Session task
//!
//! Owns the ICE agent, the candidate stream and every per-session task.
//! Commands from [`super::PeerConnection`] handles are applied one at a
//! time, so signaling for a session is serialized.

use std::collections::HashMap;
use std::future::pending;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use ice::{
    AgentEvent, Candidate, CandidateStream, CheckKind, GatherEvent, IceAgent, IceCredentials,
    IceError, InboundRequest, LocalPath, PairId, PathId, Rejection, ScheduledCheck,
    build_binding_request, error_response, perform_connectivity_check, success_response,
    validate_incoming_request,
};
use sdp::{SdpCodec, SdpType, SessionDescription};
use stun::Message;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::state::{PeerConnectionState, Signal};
use super::{SelectedPair, StateSnapshot};
use crate::certificate::Certificate;
use crate::config::PeerConnectionConfig;
use crate::errors::PeerConnectionError;
use crate::negotiation::{self, LocalParameters};
use crate::relay::SelectedPath;

type Reply<T> = oneshot::Sender<Result<T, PeerConnectionError>>;

pub(crate) enum Command {
    SetRemoteDescription {
        sdp_type: SdpType,
        sdp: String,
        reply: Reply<()>,
    },
    CreateLocalDescription {
        sdp_type: SdpType,
        reply: Reply<SessionDescription>,
    },
    AddRemoteCandidates {
        candidates: Vec<Candidate>,
        end_of_candidates: bool,
        reply: Reply<()>,
    },
    TakeLocalCandidates {
        reply: oneshot::Sender<Vec<String>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// A local description waiting for gathering to finish or time out.
struct PendingDescription {
    sdp_type: SdpType,
    reply: Reply<SessionDescription>,
    deadline: Instant,
}

struct CheckOutcome {
    pair: PairId,
    kind: CheckKind,
    result: Result<SocketAddr, IceError>,
}

pub(crate) struct Channels {
    pub commands: mpsc::Receiver<Command>,
    pub requests: mpsc::Receiver<InboundRequest>,
    pub state: watch::Sender<StateSnapshot>,
    pub selected: watch::Sender<Option<SelectedPath>>,
}

pub(crate) struct Driver {
    config: Arc<PeerConnectionConfig>,
    certificate: Arc<Certificate>,
    codec: SdpCodec,
    agent: IceAgent,
    state: PeerConnectionState,
    commands: mpsc::Receiver<Command>,
    requests: mpsc::Receiver<InboundRequest>,
    state_tx: watch::Sender<StateSnapshot>,
    selected_tx: watch::Sender<Option<SelectedPath>>,
    gathering: Option<CandidateStream>,
    gathering_complete: bool,
    paths: HashMap<PathId, LocalPath>,
    local_candidates: Vec<Candidate>,
    /// Local candidates already handed to the peer
    reported: usize,
    remote_description: Option<SessionDescription>,
    pending: Option<PendingDescription>,
    checks: JoinSet<CheckOutcome>,
    /// STUN responses in flight
    responses: JoinSet<()>,
    relay: JoinHandle<()>,
    pacing: Interval,
}

impl Driver {
    pub(crate) fn new(
        config: Arc<PeerConnectionConfig>,
        certificate: Arc<Certificate>,
        gathering: CandidateStream,
        relay: JoinHandle<()>,
        channels: Channels,
    ) -> Self {
        let mut pacing = tokio::time::interval(config.pacing_interval);
        pacing.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            codec: SdpCodec::new(config.capabilities.clone()),
            agent: IceAgent::new(config.agent.clone(), IceCredentials::generate()),
            state: PeerConnectionState::New,
            commands: channels.commands,
            requests: channels.requests,
            state_tx: channels.state,
            selected_tx: channels.selected,
            paths: gathering
                .host_paths()
                .iter()
                .map(|path| (path.id(), path.clone()))
                .collect(),
            gathering: Some(gathering),
            gathering_complete: false,
            local_candidates: Vec::new(),
            reported: 0,
            remote_description: None,
            pending: None,
            checks: JoinSet::new(),
            responses: JoinSet::new(),
            relay,
            pacing,
            config,
            certificate,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let deadline = self.pending.as_ref().map(|p| p.deadline);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Close { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        return;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All handles dropped, closing");
                        self.shutdown().await;
                        return;
                    }
                },
                Some(event) = next_gather_event(&mut self.gathering) => self.handle_gather_event(event),
                Some(request) = self.requests.recv() => self.handle_request(request),
                Some(joined) = self.checks.join_next(), if !self.checks.is_empty() => match joined {
                    Ok(outcome) => self.handle_check_outcome(outcome),
                    Err(e) => debug!(error = %e, "Check task ended abnormally"),
                },
                Some(_) = self.responses.join_next(), if !self.responses.is_empty() => {}
                _ = sleep_until(deadline) => self.finish_pending(),
                _ = self.pacing.tick() => self.schedule(),
            }

            self.drain_agent_events();
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetRemoteDescription {
                sdp_type,
                sdp,
                reply,
            } => {
                let _ = reply.send(self.set_remote_description(sdp_type, &sdp));
            }
            Command::CreateLocalDescription { sdp_type, reply } => {
                self.create_local_description(sdp_type, reply)
            }
            Command::AddRemoteCandidates {
                candidates,
                end_of_candidates,
                reply,
            } => {
                let _ = reply.send(self.add_remote_candidates(candidates, end_of_candidates));
            }
            Command::TakeLocalCandidates { reply } => {
                let fresh = self.local_candidates[self.reported..]
                    .iter()
                    .map(Candidate::to_string)
                    .collect();
                self.reported = self.local_candidates.len();
                let _ = reply.send(fresh);
            }
            // Intercepted by the run loop
            Command::Close { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn set_remote_description(
        &mut self,
        sdp_type: SdpType,
        sdp: &str,
    ) -> Result<(), PeerConnectionError> {
        let next = self.state.on_signal(remote_signal(sdp_type))?;

        let description = self.codec.parse(sdp_type, sdp)?;
        let remote = negotiation::remote_parameters(&self.codec, &description)?;

        info!(
            %sdp_type,
            ufrag = %remote.credentials.ufrag,
            candidates = remote.candidates.len(),
            "Remote description applied"
        );
        self.agent.set_remote_credentials(remote.credentials);
        for candidate in remote.candidates {
            self.agent.add_remote_candidate(candidate);
        }
        if remote.end_of_candidates {
            self.agent.set_remote_end_of_candidates();
        }
        self.remote_description = Some(description);
        self.transition(next);
        Ok(())
    }

    fn create_local_description(&mut self, sdp_type: SdpType, reply: Reply<SessionDescription>) {
        if let Err(e) = self.state.on_signal(local_signal(sdp_type)) {
            let _ = reply.send(Err(e));
            return;
        }
        if self.pending.is_some() {
            let _ = reply.send(Err(PeerConnectionError::invalid_transition(
                self.state,
                "create a description while another is pending",
            )));
            return;
        }

        self.pending = Some(PendingDescription {
            sdp_type,
            reply,
            deadline: Instant::now() + self.config.answer_gather_timeout,
        });
        if self.gathering_complete {
            self.finish_pending();
        }
    }

    /// Answers the pending description request with the candidates
    /// gathered so far.
    fn finish_pending(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let result = self.build_local_description(pending.sdp_type);
        let _ = pending.reply.send(result);
    }

    fn build_local_description(
        &mut self,
        sdp_type: SdpType,
    ) -> Result<SessionDescription, PeerConnectionError> {
        let next = self.state.on_signal(local_signal(sdp_type))?;

        let local = LocalParameters {
            credentials: self.agent.local_credentials(),
            fingerprint: self.certificate.fingerprint(),
            candidates: &self.local_candidates,
            end_of_candidates: self.gathering_complete,
        };
        let description = match (sdp_type, &self.remote_description) {
            (SdpType::Answer, Some(offer)) => negotiation::build_answer(&self.codec, offer, local)?,
            (SdpType::Answer, None) => {
                return Err(PeerConnectionError::invalid_transition(self.state, "create an answer"));
            }
            (SdpType::Offer, _) => negotiation::build_offer(&self.codec, local)?,
        };

        self.reported = self.local_candidates.len();
        info!(%sdp_type, candidates = self.reported, "Local description created");
        self.transition(next);
        Ok(description)
    }

    fn add_remote_candidates(
        &mut self,
        candidates: Vec<Candidate>,
        end_of_candidates: bool,
    ) -> Result<(), PeerConnectionError> {
        self.state.on_signal(Signal::RemoteCandidates)?;

        let mut paired = 0;
        for candidate in candidates {
            debug!(candidate = %candidate, "Remote candidate added");
            paired += self.agent.add_remote_candidate(candidate);
        }
        if end_of_candidates {
            debug!("Remote end of candidates");
            self.agent.set_remote_end_of_candidates();
        }
        trace!(paired, "Pairs formed from trickled candidates");
        Ok(())
    }

    fn handle_gather_event(&mut self, event: GatherEvent) {
        match event {
            GatherEvent::Candidate(gathered) => {
                let path = gathered.path;
                debug!(candidate = %gathered.candidate, path = path.id(), "Local candidate gathered");
                self.agent.add_local_candidate(gathered.candidate.clone(), path.id());
                self.paths.insert(path.id(), path);
                self.local_candidates.push(gathered.candidate);
            }
            GatherEvent::EndpointFailed { endpoint, error } => {
                if error.is_auth_rejection() {
                    warn!(%endpoint, error = %error, "TURN credentials rejected");
                } else {
                    warn!(%endpoint, error = %error, "Gathering failed for endpoint");
                }
            }
            GatherEvent::RelayInvalidated { candidate } => {
                warn!(candidate = %candidate, "Relay candidate invalidated");
                self.agent
                    .invalidate_local_candidate(candidate.socket_addr(), Instant::now());
                if self.gathering_complete && !self.agent.has_valid_local_candidates() {
                    self.fail(PeerConnectionError::NoViableCandidates);
                }
            }
            GatherEvent::Complete => {
                info!(candidates = self.local_candidates.len(), "Candidate gathering complete");
                self.gathering_complete = true;
                self.agent.set_local_gathering_complete();
                if !self.agent.has_valid_local_candidates() {
                    self.fail(PeerConnectionError::NoViableCandidates);
                } else {
                    self.finish_pending();
                }
            }
        }
    }

    /// Answers a connectivity check from the peer.
    fn handle_request(&mut self, request: InboundRequest) {
        let Some(path) = self.paths.get(&request.path).cloned() else {
            trace!(path = request.path, "Request on unknown path");
            return;
        };

        let response = match validate_incoming_request(&request.message, self.agent.local_credentials()) {
            Ok(check) => {
                let expected = self.agent.remote_credentials().map(|c| c.ufrag.as_str());
                if expected.is_some_and(|ufrag| ufrag != check.remote_ufrag) {
                    debug!(from = %request.from, "Check with a stale remote ufrag");
                    error_response(&request.message, Rejection::Unauthorized)
                } else {
                    self.agent
                        .on_incoming_request(request.path, request.from, check.priority);
                    success_response(
                        &request.message,
                        request.from,
                        &self.agent.local_credentials().pwd,
                    )
                }
            }
            Err(rejection) => {
                debug!(from = %request.from, code = rejection.code(), "Rejected incoming check");
                error_response(&request.message, rejection)
            }
        };

        match response {
            Ok(message) => self.send_response(path, request.from, message),
            Err(e) => warn!(error = %e, "Failed to build check response"),
        }
    }

    fn send_response(&mut self, path: LocalPath, to: SocketAddr, message: Message) {
        self.responses.spawn(async move {
            if let Err(e) = path.send_to(&message.encode(), to).await {
                debug!(%to, error = %e, "Failed to send check response");
            }
        });
    }

    /// Issues due checks and keepalives once negotiation is done.
    fn schedule(&mut self) {
        if !self.state.is_negotiated() {
            return;
        }
        let now = Instant::now();
        self.agent.handle_timeout(now);

        for check in self.agent.next_checks() {
            self.spawn_check(check);
        }
        if let Some(keepalive) = self.agent.keepalive_due(now) {
            self.spawn_check(keepalive);
        }
    }

    fn spawn_check(&mut self, check: ScheduledCheck) {
        let path = self.paths.get(&check.path).cloned();
        let remote = self.agent.remote_credentials().cloned();
        let (Some(path), Some(remote)) = (path, remote) else {
            self.record_check(check.pair, check.kind, false);
            return;
        };

        let request = match build_binding_request(
            self.agent.local_credentials(),
            &remote,
            check.priority,
            self.agent.tie_breaker(),
        ) {
            Ok(request) => request,
            Err(e) => {
                warn!(pair = check.pair, error = %e, "Failed to build binding request");
                self.record_check(check.pair, check.kind, false);
                return;
            }
        };

        trace!(pair = check.pair, remote = %check.remote, kind = ?check.kind, "Sending check");
        let timeout = self.config.agent.check_timeout;
        self.checks.spawn(async move {
            let result =
                perform_connectivity_check(&path, check.remote, &request, &remote.pwd, timeout).await;
            CheckOutcome {
                pair: check.pair,
                kind: check.kind,
                result,
            }
        });
    }

    fn handle_check_outcome(&mut self, outcome: CheckOutcome) {
        if let Err(ref e) = outcome.result {
            debug!(pair = outcome.pair, error = %e, "Check failed");
        }
        self.record_check(outcome.pair, outcome.kind, outcome.result.is_ok());
    }

    fn record_check(&mut self, pair: PairId, kind: CheckKind, success: bool) {
        let now = Instant::now();
        match (kind, success) {
            (CheckKind::Connectivity, true) => self.agent.on_check_succeeded(pair, now),
            (CheckKind::Connectivity, false) => self.agent.on_check_failed(pair),
            (CheckKind::Keepalive, ok) => self.agent.on_keepalive_result(pair, ok, now),
        }
    }

    fn drain_agent_events(&mut self) {
        while let Some(event) = self.agent.poll_event() {
            match event {
                AgentEvent::Selected(pair) | AgentEvent::Recovered(pair) => self.publish_selected(Some(pair)),
                AgentEvent::LivenessLost | AgentEvent::Failed => self.publish_selected(None),
                AgentEvent::Checking => {}
            }
            if let Some(next) = self.state.on_agent_event(&event) {
                if next == PeerConnectionState::Failed {
                    self.fail(PeerConnectionError::NoViableCandidates);
                } else {
                    self.transition(next);
                }
            }
        }
    }

    fn publish_selected(&mut self, pair: Option<PairId>) {
        let selected = pair
            .and_then(|id| self.agent.pair(id))
            .and_then(|pair| {
                let path = self.paths.get(&pair.path)?.clone();
                Some((
                    SelectedPath {
                        path,
                        remote: pair.remote.socket_addr(),
                    },
                    SelectedPair {
                        local: pair.local.clone(),
                        remote: pair.remote.clone(),
                    },
                ))
            });

        let (path, info) = selected.unzip();
        self.selected_tx.send_replace(path);
        self.state_tx.send_modify(|snapshot| snapshot.selected = info);
    }

    fn transition(&mut self, next: PeerConnectionState) {
        if next == self.state {
            return;
        }
        info!(from = %self.state, to = %next, "Peer connection state changed");
        self.state = next;
        self.state_tx.send_modify(|snapshot| {
            snapshot.state = next;
            snapshot.changed_at = Instant::now();
        });
    }

    /// Moves to `failed`; the session stays registered until it is closed.
    fn fail(&mut self, reason: PeerConnectionError) {
        if self.state.is_terminal() {
            return;
        }
        warn!(reason = %reason, "Peer connection failed");
        self.checks.abort_all();
        self.publish_selected(None);
        if let Some(pending) = self.pending.take() {
            let _ = pending.reply.send(Err(reason));
        }
        self.transition(PeerConnectionState::Failed);
    }

    /// Stops every task of the session and releases relay allocations
    /// within the cancellation grace.
    async fn shutdown(&mut self) {
        self.checks.abort_all();
        self.responses.abort_all();
        self.relay.abort();
        self.agent.close();
        self.publish_selected(None);
        if let Some(pending) = self.pending.take() {
            let _ = pending.reply.send(Err(PeerConnectionError::Closed));
        }
        if let Some(gathering) = self.gathering.take() {
            gathering.close(self.config.cancellation_grace).await;
        }
        self.transition(PeerConnectionState::Closed);
    }
}

fn remote_signal(sdp_type: SdpType) -> Signal {
    match sdp_type {
        SdpType::Offer => Signal::RemoteOffer,
        SdpType::Answer => Signal::RemoteAnswer,
    }
}

fn local_signal(sdp_type: SdpType) -> Signal {
    match sdp_type {
        SdpType::Offer => Signal::LocalOffer,
        SdpType::Answer => Signal::LocalAnswer,
    }
}

async fn next_gather_event(gathering: &mut Option<CandidateStream>) -> Option<GatherEvent> {
    match gathering {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => pending().await,
    }
}
