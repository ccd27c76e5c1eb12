use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use webrtc::{PeerConnection, PeerConnectionState};

pub type SessionId = String;

#[derive(Debug)]
struct Activity {
    at: Instant,
    /// Echoed packet count when activity was last observed
    forwarded: u64,
}

/// One signaling exchange and the peer connection it owns.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    client_id: Option<String>,
    created_at: DateTime<Utc>,
    activity: Mutex<Activity>,
    connection: PeerConnection,
}

impl Session {
    pub fn new(id: SessionId, client_id: Option<String>, connection: PeerConnection) -> Self {
        Self {
            id,
            client_id,
            created_at: Utc::now(),
            activity: Mutex::new(Activity {
                at: Instant::now(),
                forwarded: 0,
            }),
            connection,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn connection(&self) -> &PeerConnection {
        &self.connection
    }

    pub fn state(&self) -> PeerConnectionState {
        self.connection.state()
    }

    /// Records signaling activity.
    pub fn touch(&self) {
        self.activity().at = Instant::now();
    }

    /// Time since the last signaling request or echoed packet.
    pub fn idle_for(&self, now: Instant) -> Duration {
        let forwarded = self.connection.stats().forwarded_packets;
        let mut activity = self.activity();
        if forwarded != activity.forwarded {
            activity.forwarded = forwarded;
            activity.at = now;
        }
        now.saturating_duration_since(activity.at)
    }

    /// Time spent in `failed` or `closed`, if the session is there.
    pub fn terminal_for(&self, now: Instant) -> Option<Duration> {
        let snapshot = self.connection.snapshot();
        snapshot
            .state
            .is_terminal()
            .then(|| now.saturating_duration_since(snapshot.changed_at))
    }

    fn activity(&self) -> MutexGuard<'_, Activity> {
        self.activity.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
