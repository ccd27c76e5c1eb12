//! Candidate gathering.
//!
//! Host candidates come from the sockets handed to the gatherer and are
//! reported immediately. Server-reflexive candidates are discovered through
//! each host socket and relay candidates through TURN allocations; both are
//! reported as each endpoint answers. A failing endpoint is reported on its
//! own and never stops the others.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use stun::{StunClient, crc32, resolve_server};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};
use turn::{Allocation, Credentials, DataIndication, TurnClient};

use crate::candidate::Candidate;
use crate::candidate_builder::{CandidateBuilder, DEFAULT_LOCAL_PREFERENCE};
use crate::candidate_type::CandidateType;
use crate::errors::GatherError;
use crate::ip_detection::detect_local_ip;
use crate::transport::{Demux, LocalPath, PathId};

const DEFAULT_SERVER_PORT: u16 = 3478;
/// Data indications buffered per relay before packets are dropped
const RELAY_QUEUE_SIZE: usize = 256;
/// Permissions expire after five minutes (RFC 5766 Section 8)
const PERMISSION_REFRESH_INTERVAL: Duration = Duration::from_secs(240);
/// Floor on the wait between allocation refreshes
const MIN_REFRESH_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    Stun,
    Turn,
}

/// A configured STUN or TURN endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub kind: ServerKind,
    /// `host:port`
    pub address: String,
    pub credentials: Option<Credentials>,
}

impl IceServer {
    /// Parses a `stun:` or `turn:` URL (RFC 7064, RFC 7065).
    ///
    /// # Arguments
    /// * `url` - e.g. `stun:stun.l.google.com:19302`, `turn:10.0.0.1?transport=udp`
    /// * `transport` - Transport from configuration, overriding the URL query
    /// * `credentials` - TURN long-term credentials
    pub fn parse(
        url: &str,
        transport: Option<&str>,
        credentials: Option<Credentials>,
    ) -> Result<Self, GatherError> {
        let (scheme, rest) = url
            .split_once(':')
            .ok_or_else(|| GatherError::InvalidUrl(url.to_string()))?;
        let kind = match scheme.to_ascii_lowercase().as_str() {
            "stun" => ServerKind::Stun,
            "turn" => ServerKind::Turn,
            "stuns" | "turns" => return Err(GatherError::UnsupportedTransport("tls".to_string())),
            _ => return Err(GatherError::InvalidUrl(url.to_string())),
        };

        let (hostport, query) = match rest.split_once('?') {
            Some((hostport, query)) => (hostport, Some(query)),
            None => (rest, None),
        };
        let transport = transport
            .map(str::to_string)
            .or_else(|| query.and_then(|q| q.strip_prefix("transport=")).map(str::to_string))
            .unwrap_or_else(|| "udp".to_string());
        if !transport.eq_ignore_ascii_case("udp") {
            return Err(GatherError::UnsupportedTransport(transport));
        }

        if hostport.is_empty() {
            return Err(GatherError::InvalidUrl(url.to_string()));
        }
        let has_port = match hostport.strip_prefix('[') {
            Some(v6) => v6.contains("]:"),
            None => hostport.contains(':'),
        };
        let address = if has_port {
            hostport.to_string()
        } else {
            format!("{}:{}", hostport, DEFAULT_SERVER_PORT)
        };

        Ok(Self {
            kind,
            address,
            credentials,
        })
    }
}

impl std::fmt::Display for IceServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ServerKind::Stun => write!(f, "stun:{}", self.address),
            ServerKind::Turn => write!(f, "turn:{}", self.address),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GathererConfig {
    pub servers: Vec<IceServer>,
    /// Bound on each STUN/TURN request, retransmissions included
    pub request_timeout: Duration,
    /// Lifetime requested for TURN allocations
    pub allocation_lifetime: Duration,
    /// Fraction of the granted lifetime after which allocations are refreshed
    pub refresh_ratio: f64,
    /// Address advertised for sockets bound to the unspecified address
    pub advertised_address: Option<IpAddr>,
}

impl Default for GathererConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            request_timeout: Duration::from_secs(3),
            allocation_lifetime: Duration::from_secs(600),
            refresh_ratio: 0.5,
            advertised_address: None,
        }
    }
}

/// A local candidate and the path it is reachable on.
#[derive(Debug, Clone)]
pub struct GatheredCandidate {
    pub candidate: Candidate,
    pub path: LocalPath,
}

#[derive(Debug)]
pub enum GatherEvent {
    Candidate(GatheredCandidate),
    /// One endpoint could not produce a candidate
    EndpointFailed {
        endpoint: String,
        error: GatherError,
    },
    /// A relay allocation could not be refreshed; its candidate is dead
    RelayInvalidated { candidate: Candidate },
    /// Every endpoint has answered or failed
    Complete,
}

/// A TURN allocation owned by the gatherer.
#[derive(Clone)]
pub struct RelayAllocation {
    pub endpoint: String,
    pub relayed: SocketAddr,
    pub credentials: Option<Credentials>,
    pub expires_at: Instant,
    client: Arc<TurnClient>,
}

impl std::fmt::Debug for RelayAllocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayAllocation")
            .field("endpoint", &self.endpoint)
            .field("relayed", &self.relayed)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

type Allocations = Arc<Mutex<Vec<RelayAllocation>>>;

fn lock(allocations: &Allocations) -> MutexGuard<'_, Vec<RelayAllocation>> {
    match allocations.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct CandidateGatherer {
    config: GathererConfig,
    sockets: Vec<Arc<UdpSocket>>,
    demux: Demux,
}

impl CandidateGatherer {
    /// # Arguments
    /// * `config` - Endpoints and timing
    /// * `sockets` - Bound host sockets, one host candidate each
    /// * `demux` - Receives everything read on the gathered paths
    pub fn new(config: GathererConfig, sockets: Vec<Arc<UdpSocket>>, demux: Demux) -> Self {
        Self {
            config,
            sockets,
            demux,
        }
    }

    /// Starts gathering. Host candidates are queued before this returns.
    ///
    /// The returned stream owns every path it reports: dropping or closing
    /// it stops their readers and refreshers.
    pub fn gather(self) -> CandidateStream {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let allocations: Allocations = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = JoinSet::new();
        let mut hosts = Vec::new();
        let socket_count = self.sockets.len();

        for (index, socket) in self.sockets.into_iter().enumerate() {
            let path = LocalPath::direct(index, socket.clone());
            tasks.spawn(self.demux.clone().read_socket(path.clone(), socket.clone()));

            match host_candidate(&socket, index, &self.config) {
                Ok(candidate) => {
                    debug!(candidate = %candidate, "Gathered host candidate");
                    hosts.push(GatheredCandidate {
                        candidate: candidate.clone(),
                        path: path.clone(),
                    });
                    let _ = events_tx.send(GatherEvent::Candidate(GatheredCandidate { candidate, path }));
                }
                Err(error) => {
                    let _ = events_tx.send(GatherEvent::EndpointFailed {
                        endpoint: format!("host:{}", index),
                        error,
                    });
                }
            }
        }

        let host_paths = hosts.iter().map(|h| h.path.clone()).collect();
        let coordinator = Coordinator {
            config: self.config,
            demux: self.demux,
            events: events_tx,
            allocations: allocations.clone(),
            next_path: socket_count,
        };
        tasks.spawn(coordinator.run(hosts));

        CandidateStream {
            events: events_rx,
            tasks,
            allocations,
            host_paths,
            complete: false,
        }
    }
}

fn host_candidate(
    socket: &UdpSocket,
    index: usize,
    config: &GathererConfig,
) -> Result<Candidate, GatherError> {
    let bound = socket.local_addr()?;
    let ip = if bound.ip().is_unspecified() {
        config
            .advertised_address
            .or_else(detect_local_ip)
            .ok_or_else(|| GatherError::NoLocalAddress(bound.to_string()))?
    } else {
        bound.ip()
    };

    let candidate = CandidateBuilder::new()
        .foundation(foundation(CandidateType::Host, ip, None))
        .socket_addr(SocketAddr::new(ip, bound.port()))
        .candidate_type(CandidateType::Host)
        .local_preference(DEFAULT_LOCAL_PREFERENCE - index as u32)
        .build()
        .map_err(|e| GatherError::NoLocalAddress(e.to_string()))?;
    Ok(candidate)
}

/// Candidates of the same type, base address and server share a foundation.
fn foundation(kind: CandidateType, base: IpAddr, server: Option<&str>) -> String {
    crc32(&[
        kind.as_str().as_bytes(),
        base.to_string().as_bytes(),
        server.unwrap_or_default().as_bytes(),
    ])
    .to_string()
}

enum JobOutcome {
    Reflexive {
        endpoint: String,
        base: GatheredCandidate,
        mapped: SocketAddr,
    },
    Relay {
        endpoint: String,
        credentials: Option<Credentials>,
        client: Arc<TurnClient>,
        allocation: Allocation,
        data_rx: mpsc::Receiver<DataIndication>,
    },
    Failed {
        endpoint: String,
        error: GatherError,
    },
    Skipped,
}

struct Coordinator {
    config: GathererConfig,
    demux: Demux,
    events: mpsc::UnboundedSender<GatherEvent>,
    allocations: Allocations,
    next_path: PathId,
}

impl Coordinator {
    async fn run(mut self, hosts: Vec<GatheredCandidate>) {
        let mut jobs = JoinSet::new();
        for server in &self.config.servers {
            match server.kind {
                ServerKind::Stun => {
                    for host in &hosts {
                        jobs.spawn(reflexive_job(
                            server.clone(),
                            host.clone(),
                            self.config.request_timeout,
                        ));
                    }
                }
                ServerKind::Turn => {
                    jobs.spawn(relay_job(
                        server.clone(),
                        self.config.request_timeout,
                        self.config.allocation_lifetime,
                    ));
                }
            }
        }

        // Relay readers and refreshers outlive gathering
        let mut background = JoinSet::new();
        let mut reflexive: Vec<SocketAddr> = hosts.iter().map(|h| h.candidate.socket_addr()).collect();

        while let Some(joined) = jobs.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "Gathering job panicked");
                    continue;
                }
            };

            match outcome {
                JobOutcome::Reflexive {
                    endpoint,
                    base,
                    mapped,
                } => {
                    if reflexive.contains(&mapped) {
                        debug!(%endpoint, %mapped, "Skipping redundant reflexive address");
                        continue;
                    }
                    reflexive.push(mapped);
                    match reflexive_candidate(&endpoint, &base.candidate, mapped) {
                        Ok(candidate) => {
                            info!(%endpoint, candidate = %candidate, "Gathered server reflexive candidate");
                            self.emit(GatherEvent::Candidate(GatheredCandidate {
                                candidate,
                                path: base.path,
                            }));
                        }
                        Err(e) => warn!(%endpoint, error = %e, "Discarding reflexive candidate"),
                    }
                }
                JobOutcome::Relay {
                    endpoint,
                    credentials,
                    client,
                    allocation,
                    data_rx,
                } => {
                    let path = LocalPath::relayed(self.next_path, client.clone());
                    self.next_path += 1;

                    let candidate = match relay_candidate(&endpoint, &client, &allocation) {
                        Ok(candidate) => candidate,
                        Err(e) => {
                            warn!(%endpoint, error = %e, "Discarding relay candidate");
                            continue;
                        }
                    };
                    info!(%endpoint, candidate = %candidate, "Gathered relay candidate");

                    lock(&self.allocations).push(RelayAllocation {
                        endpoint: endpoint.clone(),
                        relayed: allocation.relayed,
                        credentials,
                        expires_at: Instant::now() + allocation.lifetime,
                        client: client.clone(),
                    });
                    background.spawn(self.demux.clone().read_relay(path.clone(), data_rx));
                    background.spawn(maintain_allocation(
                        client,
                        candidate.clone(),
                        self.config.allocation_lifetime,
                        allocation.lifetime,
                        self.config.refresh_ratio,
                        self.events.clone(),
                        self.allocations.clone(),
                    ));
                    self.emit(GatherEvent::Candidate(GatheredCandidate { candidate, path }));
                }
                JobOutcome::Failed { endpoint, error } => {
                    warn!(%endpoint, error = %error, "ICE server endpoint failed");
                    self.emit(GatherEvent::EndpointFailed { endpoint, error });
                }
                JobOutcome::Skipped => {}
            }
        }

        debug!("Candidate gathering complete");
        self.emit(GatherEvent::Complete);

        while background.join_next().await.is_some() {}
    }

    fn emit(&self, event: GatherEvent) {
        let _ = self.events.send(event);
    }
}

async fn reflexive_job(server: IceServer, base: GatheredCandidate, request_timeout: Duration) -> JobOutcome {
    let endpoint = server.to_string();
    let Some(socket) = base.path.socket().cloned() else {
        return JobOutcome::Skipped;
    };
    let family_v4 = base.candidate.address.is_ipv4();

    let resolved = match resolve_server(&server.address, request_timeout).await {
        Ok(addrs) => addrs,
        Err(e) => return JobOutcome::Failed { endpoint, error: e.into() },
    };
    let Some(target) = resolved.into_iter().find(|a| a.is_ipv4() == family_v4) else {
        let error = GatherError::NoMatchingFamily(base.candidate.address.to_string());
        return JobOutcome::Failed { endpoint, error };
    };

    let client = StunClient::new(socket, base.path.transactions().clone());
    match client.get_reflexive_address(target, request_timeout).await {
        Ok(mapped) => JobOutcome::Reflexive {
            endpoint,
            base,
            mapped,
        },
        Err(e) => JobOutcome::Failed { endpoint, error: e.into() },
    }
}

async fn relay_job(server: IceServer, request_timeout: Duration, lifetime: Duration) -> JobOutcome {
    let endpoint = server.to_string();
    let target = match resolve_server(&server.address, request_timeout).await {
        Ok(addrs) => addrs[0],
        Err(e) => return JobOutcome::Failed { endpoint, error: e.into() },
    };

    let (data_tx, data_rx) = mpsc::channel(RELAY_QUEUE_SIZE);
    let client = match TurnClient::connect(target, server.credentials.clone(), request_timeout, data_tx).await {
        Ok(client) => Arc::new(client),
        Err(e) => return JobOutcome::Failed { endpoint, error: e.into() },
    };

    match client.allocate(lifetime).await {
        Ok(allocation) => JobOutcome::Relay {
            endpoint,
            credentials: server.credentials,
            client,
            allocation,
            data_rx,
        },
        Err(e) => {
            client.close();
            JobOutcome::Failed { endpoint, error: e.into() }
        }
    }
}

fn reflexive_candidate(
    endpoint: &str,
    base: &Candidate,
    mapped: SocketAddr,
) -> Result<Candidate, crate::errors::IceError> {
    CandidateBuilder::new()
        .foundation(foundation(CandidateType::Srflx, base.address, Some(endpoint)))
        .socket_addr(mapped)
        .candidate_type(CandidateType::Srflx)
        .local_preference(base.local_preference())
        .related(base.socket_addr())
        .build()
}

fn relay_candidate(
    endpoint: &str,
    client: &TurnClient,
    allocation: &Allocation,
) -> Result<Candidate, crate::errors::IceError> {
    let related = match allocation.mapped {
        Some(mapped) => mapped,
        None => client
            .local_addr()
            .map_err(|e| crate::errors::IceError::SocketError(e.to_string()))?,
    };
    CandidateBuilder::new()
        .foundation(foundation(CandidateType::Relay, related.ip(), Some(endpoint)))
        .socket_addr(allocation.relayed)
        .candidate_type(CandidateType::Relay)
        .related(related)
        .build()
}

/// Refreshes an allocation at `ratio` of its remaining lifetime until a
/// refresh fails, then reports the relay candidate invalid.
async fn maintain_allocation(
    client: Arc<TurnClient>,
    candidate: Candidate,
    requested: Duration,
    mut lifetime: Duration,
    ratio: f64,
    events: mpsc::UnboundedSender<GatherEvent>,
    allocations: Allocations,
) {
    let relayed = candidate.socket_addr();
    loop {
        let wait = lifetime
            .mul_f64(ratio)
            .clamp(MIN_REFRESH_WAIT, PERMISSION_REFRESH_INTERVAL);
        sleep(wait).await;
        lifetime = lifetime.saturating_sub(wait);

        let failure = match client.refresh(requested).await {
            Ok(granted) if !granted.is_zero() => {
                lifetime = granted;
                if let Some(entry) = lock(&allocations).iter_mut().find(|a| a.relayed == relayed) {
                    entry.expires_at = Instant::now() + granted;
                }
                if let Err(e) = client.refresh_permissions().await {
                    debug!(%relayed, error = %e, "Permission refresh failed");
                }
                continue;
            }
            // A zero lifetime means the server already dropped the allocation
            Ok(_) => "server granted a zero lifetime".to_string(),
            Err(e) => e.to_string(),
        };

        warn!(%relayed, error = %failure, "TURN refresh failed, relay candidate invalidated");
        lock(&allocations).retain(|a| a.relayed != relayed);
        client.close();
        let _ = events.send(GatherEvent::RelayInvalidated { candidate });
        return;
    }
}

/// Lazily produced gathering results for one session.
pub struct CandidateStream {
    events: mpsc::UnboundedReceiver<GatherEvent>,
    tasks: JoinSet<()>,
    allocations: Allocations,
    host_paths: Vec<LocalPath>,
    complete: bool,
}

impl CandidateStream {
    /// Next gathering event. After [`GatherEvent::Complete`] only relay
    /// invalidations follow.
    pub async fn next(&mut self) -> Option<GatherEvent> {
        let event = self.events.recv().await;
        if matches!(event, Some(GatherEvent::Complete)) {
            self.complete = true;
        }
        event
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn host_paths(&self) -> &[LocalPath] {
        &self.host_paths
    }

    /// Snapshot of live relay allocations.
    pub fn allocations(&self) -> Vec<RelayAllocation> {
        lock(&self.allocations).clone()
    }

    /// Stops every reader and refresher and releases relay allocations,
    /// waiting at most `grace` for the TURN servers.
    pub async fn close(mut self, grace: Duration) {
        self.tasks.shutdown().await;

        let allocations: Vec<RelayAllocation> = lock(&self.allocations).drain(..).collect();
        if allocations.is_empty() {
            return;
        }

        let mut releases = JoinSet::new();
        for allocation in allocations {
            releases.spawn(async move {
                if let Err(e) = allocation.client.deallocate().await {
                    debug!(endpoint = %allocation.endpoint, error = %e, "Deallocate failed");
                }
                allocation.client.close();
            });
        }
        let drained = timeout(grace, async { while releases.join_next().await.is_some() {} }).await;
        if drained.is_err() {
            warn!("Relay allocations not released within grace period");
        }
    }
}
