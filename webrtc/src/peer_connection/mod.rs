//! Peer connection
//!
//! [`PeerConnection`] is a cheap, cloneable handle to a session task. The
//! task owns the ICE agent, the gathered paths and the echo relay; handles
//! only send it commands and observe its published state.

mod driver;
mod state;

pub use state::{PeerConnectionState, Signal};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ice::{Candidate, CandidateGatherer, Demux, IceError};
use sdp::{SdpType, SessionDescription};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Instrument, debug, info_span, warn};

use crate::certificate::Certificate;
use crate::config::PeerConnectionConfig;
use crate::errors::PeerConnectionError;
use crate::relay::{MediaRelay, RelayStats, RelayStatsSnapshot};
use driver::{Channels, Command, Driver};

const COMMAND_QUEUE_CAPACITY: usize = 32;

/// The pair media currently flows on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedPair {
    pub local: Candidate,
    pub remote: Candidate,
}

/// Published on every state or selection change.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub state: PeerConnectionState,
    pub changed_at: Instant,
    pub selected: Option<SelectedPair>,
}

impl StateSnapshot {
    fn new() -> Self {
        Self {
            state: PeerConnectionState::New,
            changed_at: Instant::now(),
            selected: None,
        }
    }
}

#[derive(Clone)]
pub struct PeerConnection {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<StateSnapshot>,
    stats: Arc<RelayStats>,
    cancellation_grace: Duration,
}

impl PeerConnection {
    /// Binds the host sockets and starts gathering, the session task and
    /// the echo relay.
    ///
    /// # Arguments
    /// * `id` - Session identifier, attached to every log line of the session
    /// * `config` - Shared configuration
    /// * `certificate` - Identity advertised in local descriptions
    pub async fn new(
        id: &str,
        config: Arc<PeerConnectionConfig>,
        certificate: Arc<Certificate>,
    ) -> Result<Self, PeerConnectionError> {
        let span = info_span!("session", session_id = %id);

        let mut sockets = Vec::with_capacity(config.host_addresses.len());
        for address in &config.host_addresses {
            let socket = UdpSocket::bind(SocketAddr::new(*address, 0)).await?;
            sockets.push(Arc::new(socket));
        }

        let (request_tx, request_rx) = mpsc::channel(config.queue_capacity);
        let (media_tx, media_rx) = mpsc::channel(config.queue_capacity);
        let gathering =
            CandidateGatherer::new(config.gatherer.clone(), sockets, Demux::new(request_tx, media_tx))
                .gather();

        let (selected_tx, selected_rx) = watch::channel(None);
        let stats = Arc::new(RelayStats::default());
        let relay = tokio::spawn(
            MediaRelay::new(media_rx, selected_rx, stats.clone())
                .run()
                .instrument(span.clone()),
        );

        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (state_tx, state_rx) = watch::channel(StateSnapshot::new());
        let cancellation_grace = config.cancellation_grace;
        let driver = Driver::new(
            config,
            certificate,
            gathering,
            relay,
            Channels {
                commands: command_rx,
                requests: request_rx,
                state: state_tx,
                selected: selected_tx,
            },
        );
        tokio::spawn(driver.run().instrument(span));

        Ok(Self {
            commands: command_tx,
            state: state_rx,
            stats,
            cancellation_grace,
        })
    }

    /// Applies the peer's offer and answers it.
    ///
    /// # Returns
    /// * `Ok(SessionDescription)` - The answer, candidates gathered so far included
    /// * `Err(PeerConnectionError::Decode)` - The offer is malformed or has no usable audio
    /// * `Err(PeerConnectionError::InvalidTransition)` - The session already negotiated
    pub async fn accept_offer(&self, sdp: &str) -> Result<SessionDescription, PeerConnectionError> {
        self.set_remote_description(SdpType::Offer, sdp).await?;
        self.create_answer().await
    }

    pub async fn set_remote_description(
        &self,
        sdp_type: SdpType,
        sdp: &str,
    ) -> Result<(), PeerConnectionError> {
        let action = match sdp_type {
            SdpType::Offer => "accept a remote offer",
            SdpType::Answer => "accept a remote answer",
        };
        self.request(action, |reply| Command::SetRemoteDescription {
            sdp_type,
            sdp: sdp.to_string(),
            reply,
        })
        .await?
    }

    /// Waits for gathering to complete, at most the configured answer
    /// gather timeout, then answers the applied remote offer.
    pub async fn create_answer(&self) -> Result<SessionDescription, PeerConnectionError> {
        self.request("create an answer", |reply| Command::CreateLocalDescription {
            sdp_type: SdpType::Answer,
            reply,
        })
        .await?
    }

    pub async fn create_offer(&self) -> Result<SessionDescription, PeerConnectionError> {
        self.request("create an offer", |reply| Command::CreateLocalDescription {
            sdp_type: SdpType::Offer,
            reply,
        })
        .await?
    }

    /// Adds trickled remote candidates.
    ///
    /// Every candidate is validated before any is applied. Host names
    /// (mDNS) are skipped since they cannot be resolved here.
    pub async fn add_remote_candidates(
        &self,
        candidates: &[String],
        end_of_candidates: bool,
    ) -> Result<(), PeerConnectionError> {
        let candidates = parse_candidates(candidates)?;
        self.request("add remote candidates", |reply| Command::AddRemoteCandidates {
            candidates,
            end_of_candidates,
            reply,
        })
        .await?
    }

    /// Local candidates not yet handed to the peer, in `candidate:` form.
    pub async fn take_local_candidates(&self) -> Result<Vec<String>, PeerConnectionError> {
        self.request("report local candidates", |reply| Command::TakeLocalCandidates { reply })
            .await
    }

    pub fn state(&self) -> PeerConnectionState {
        self.state.borrow().state
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.state.clone()
    }

    pub fn stats(&self) -> RelayStatsSnapshot {
        self.stats.snapshot()
    }

    /// Closes the session, waiting at most the cancellation grace period
    /// plus a small margin. Closing twice is harmless.
    pub async fn close(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Close { reply }).await.is_err() {
            return;
        }
        let bound = self.cancellation_grace + Duration::from_millis(500);
        if tokio::time::timeout(bound, done).await.is_err() {
            warn!("Session did not close within the cancellation grace period");
        }
    }

    async fn request<T>(
        &self,
        action: &'static str,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, PeerConnectionError> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(command(reply)).await.is_err() {
            return Err(self.gone(action));
        }
        response.await.map_err(|_| self.gone(action))
    }

    /// Error for a command the session task can no longer take.
    fn gone(&self, action: &'static str) -> PeerConnectionError {
        match self.state() {
            state if state.is_terminal() => PeerConnectionError::invalid_transition(state, action),
            _ => PeerConnectionError::Closed,
        }
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("state", &self.state())
            .finish()
    }
}

fn parse_candidates(values: &[String]) -> Result<Vec<Candidate>, PeerConnectionError> {
    let mut candidates = Vec::with_capacity(values.len());
    for value in values.iter().filter(|v| !v.trim().is_empty()) {
        match Candidate::parse(value) {
            Ok(candidate) => candidates.push(candidate),
            Err(IceError::UnresolvedHostname(host)) => {
                debug!(%host, "Skipping candidate with unresolved host name");
            }
            Err(e) => return Err(PeerConnectionError::InvalidCandidate(e)),
        }
    }
    Ok(candidates)
}
