//! Session registry
//!
//! The only state shared between sessions: the id → session table, the
//! client → id index and the ids reserved by creations still binding their
//! sockets. All three live behind one mutex so capacity checks, creation
//! and removal are atomic with respect to each other.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use webrtc::{Certificate, PeerConnection, PeerConnectionConfig, PeerConnectionError};

use crate::config::SessionsConfig;
use crate::domain::{Session, SessionId};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The live-session limit is reached; nothing was created
    #[error("session limit of {max} reached")]
    ResourceExhausted { max: usize },

    /// The peer connection could not be started
    #[error(transparent)]
    Connection(#[from] PeerConnectionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryLimits {
    pub max_sessions: usize,
    pub idle_timeout: Duration,
    pub terminal_grace: Duration,
}

impl From<&SessionsConfig> for RegistryLimits {
    fn from(config: &SessionsConfig) -> Self {
        Self {
            max_sessions: config.max_sessions,
            idle_timeout: config.idle_timeout(),
            terminal_grace: config.terminal_grace(),
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<SessionId, Arc<Session>>,
    clients: HashMap<String, SessionId>,
    /// Ids handed out to creations that have not finished yet
    reserved: HashSet<SessionId>,
}

impl RegistryInner {
    fn occupied(&self) -> usize {
        self.sessions.len() + self.reserved.len()
    }

    fn is_taken(&self, id: &str) -> bool {
        self.sessions.contains_key(id) || self.reserved.contains(id)
    }

    fn remove(&mut self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.remove(id)?;
        if let Some(client) = session.client_id()
            && self.clients.get(client).is_some_and(|owner| owner == id)
        {
            self.clients.remove(client);
        }
        Some(session)
    }

    fn detach_client(&mut self, client_id: &str) -> Option<Arc<Session>> {
        let id = self.clients.get(client_id)?.clone();
        self.remove(&id)
    }
}

#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    config: Arc<PeerConnectionConfig>,
    certificate: Arc<Certificate>,
    limits: RegistryLimits,
}

impl SessionRegistry {
    pub fn new(
        config: Arc<PeerConnectionConfig>,
        certificate: Arc<Certificate>,
        limits: RegistryLimits,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::default())),
            config,
            certificate,
            limits,
        }
    }

    /// Creates a session with a fresh peer connection.
    ///
    /// A live session already owned by `client_id` is replaced: it is
    /// detached together with the capacity check and closed before the new
    /// connection starts.
    ///
    /// # Errors
    ///
    /// * `ResourceExhausted` - At capacity; the registry is unchanged
    /// * `Connection` - The host sockets could not be bound
    pub async fn create(&self, client_id: Option<String>) -> Result<Arc<Session>, RegistryError> {
        let (id, replaced) = {
            let mut inner = self.lock();
            let replaceable = client_id
                .as_deref()
                .is_some_and(|client| inner.clients.contains_key(client));
            if inner.occupied() - usize::from(replaceable) >= self.limits.max_sessions {
                warn!(
                    max_sessions = self.limits.max_sessions,
                    "Rejecting session: limit reached"
                );
                return Err(RegistryError::ResourceExhausted {
                    max: self.limits.max_sessions,
                });
            }

            let replaced = client_id
                .as_deref()
                .and_then(|client| inner.detach_client(client));
            let id = loop {
                let candidate = generate_session_id();
                if !inner.is_taken(&candidate) {
                    break candidate;
                }
            };
            inner.reserved.insert(id.clone());
            (id, replaced)
        };

        if let Some(old) = replaced {
            info!(session_id = %old.id(), replaced_by = %id, "Replacing session of the same client");
            old.connection().close().await;
        }

        let connection =
            match PeerConnection::new(&id, self.config.clone(), self.certificate.clone()).await {
                Ok(connection) => connection,
                Err(e) => {
                    self.lock().reserved.remove(&id);
                    return Err(e.into());
                }
            };

        let session = Arc::new(Session::new(id.clone(), client_id.clone(), connection));
        let superseded = {
            let mut inner = self.lock();
            inner.reserved.remove(&id);
            // A concurrent create for the same client may have finished first
            let superseded = client_id
                .as_deref()
                .and_then(|client| inner.detach_client(client));
            if let Some(client) = client_id {
                inner.clients.insert(client, id.clone());
            }
            inner.sessions.insert(id.clone(), session.clone());
            info!(session_id = %id, live = inner.sessions.len(), "Session created");
            superseded
        };
        if let Some(old) = superseded {
            old.connection().close().await;
        }

        Ok(session)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Session>, RegistryError> {
        self.lock()
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Removes the session without closing it.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let mut inner = self.lock();
        let session = inner.remove(id);
        if session.is_some() {
            debug!(session_id = %id, live = inner.sessions.len(), "Session removed");
        }
        session
    }

    /// Removes the session, then closes it.
    ///
    /// The id is gone from the registry before the close starts.
    pub async fn close(&self, id: &str) -> Result<(), RegistryError> {
        let session = self
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        session.connection().close().await;
        info!(session_id = %id, "Session closed");
        Ok(())
    }

    /// Closes every session concurrently.
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut inner = self.lock();
            inner.clients.clear();
            inner.sessions.drain().map(|(_, session)| session).collect()
        };
        if sessions.is_empty() {
            return;
        }

        info!(count = sessions.len(), "Closing all sessions");
        let mut closing = JoinSet::new();
        for session in sessions {
            let connection = session.connection().clone();
            closing.spawn(async move { connection.close().await });
        }
        while closing.join_next().await.is_some() {}
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes terminal sessions past the grace period and closes idle
    /// ones. Returns how many sessions were removed.
    pub async fn sweep(&self, now: Instant) -> usize {
        let expired: Vec<(Arc<Session>, &'static str)> = {
            let mut inner = self.lock();
            let ids: Vec<(SessionId, &'static str)> = inner
                .sessions
                .values()
                .filter_map(|session| {
                    let reason = match session.terminal_for(now) {
                        Some(elapsed) if elapsed > self.limits.terminal_grace => "terminal",
                        Some(_) => return None,
                        None if session.idle_for(now) > self.limits.idle_timeout => "idle",
                        None => return None,
                    };
                    Some((session.id().to_string(), reason))
                })
                .collect();
            ids.into_iter()
                .filter_map(|(id, reason)| inner.remove(&id).map(|session| (session, reason)))
                .collect()
        };

        for (session, reason) in &expired {
            info!(session_id = %session.id(), state = %session.state(), reason, "Sweeping session");
            session.connection().close().await;
        }
        expired.len()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs [`SessionRegistry::sweep`] every `interval` until aborted.
pub fn spawn_sweeper(registry: SessionRegistry, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = registry.sweep(Instant::now()).await;
            if removed > 0 {
                debug!(removed, live = registry.len(), "Sweep finished");
            }
        }
    })
}

/// `sess_<unix millis>_<16 hex digits>`
fn generate_session_id() -> SessionId {
    format!(
        "sess_{}_{:016x}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u64>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::PeerConnectionState;

    fn registry(max_sessions: usize) -> SessionRegistry {
        SessionRegistry::new(
            Arc::new(PeerConnectionConfig::loopback()),
            Arc::new(Certificate::generate().unwrap()),
            RegistryLimits {
                max_sessions,
                idle_timeout: Duration::from_secs(300),
                terminal_grace: Duration::from_secs(30),
            },
        )
    }

    #[test]
    fn test_session_id_format() {
        let id = generate_session_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "sess");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 16);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_capacity_rejects_without_mutation() {
        let registry = registry(2);
        let first = registry.create(None).await.unwrap();
        let second = registry.create(None).await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(registry.len(), 2);

        let err = registry.create(None).await.unwrap_err();
        assert!(matches!(err, RegistryError::ResourceExhausted { max: 2 }));
        assert_eq!(registry.len(), 2);
        assert!(registry.get(first.id()).is_ok());

        registry.close_all().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_same_client_replaces_previous_session() {
        let registry = registry(1);
        let first = registry.create(Some("client-a".to_string())).await.unwrap();
        let second = registry.create(Some("client-a".to_string())).await.unwrap();

        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.get(first.id()),
            Err(RegistryError::NotFound(_))
        ));
        assert_eq!(first.state(), PeerConnectionState::Closed);
        assert_eq!(registry.get(second.id()).unwrap().client_id(), Some("client-a"));

        // A different client is still bound by the limit
        assert!(matches!(
            registry.create(Some("client-b".to_string())).await,
            Err(RegistryError::ResourceExhausted { .. })
        ));
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_close_removes_before_returning() {
        let registry = registry(4);
        let session = registry.create(None).await.unwrap();
        let id = session.id().to_string();

        registry.close(&id).await.unwrap();
        assert!(matches!(registry.get(&id), Err(RegistryError::NotFound(_))));
        assert_eq!(session.state(), PeerConnectionState::Closed);
        assert!(matches!(
            registry.close(&id).await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_keeps_connection_open() {
        let registry = registry(4);
        let session = registry.create(Some("client".to_string())).await.unwrap();

        let removed = registry.remove(session.id()).unwrap();
        assert_eq!(removed.state(), PeerConnectionState::New);
        assert!(registry.remove(session.id()).is_none());
        // The client index was cleared with it
        registry.create(Some("client".to_string())).await.unwrap();
        assert_eq!(registry.len(), 1);

        removed.connection().close().await;
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_sweep_closes_idle_sessions() {
        let registry = registry(4);
        let idle = registry.create(None).await.unwrap();
        let now = Instant::now();

        assert_eq!(registry.sweep(now).await, 0);
        assert_eq!(registry.sweep(now + Duration::from_secs(301)).await, 1);
        assert!(registry.is_empty());
        assert_eq!(idle.state(), PeerConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_touch_defers_idle_sweep() {
        let registry = registry(4);
        let session = registry.create(None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        session.touch();
        let now = Instant::now();
        assert!(session.idle_for(now) < Duration::from_millis(20));
        assert_eq!(registry.sweep(now + Duration::from_secs(299)).await, 0);
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_sweep_removes_terminal_sessions_after_grace() {
        let registry = registry(4);
        let session = registry.create(None).await.unwrap();
        session.connection().close().await;
        assert_eq!(session.state(), PeerConnectionState::Closed);

        let now = Instant::now();
        assert_eq!(registry.sweep(now).await, 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.sweep(now + Duration::from_secs(31)).await, 1);
        assert!(registry.is_empty());
    }
}
