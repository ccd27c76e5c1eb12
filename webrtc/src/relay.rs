//! Media echo relay
//!
//! A single task per session consumes the media queue in arrival order and
//! writes each packet back on the path it came from, but only while that
//! path is the selected one.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ice::{Datagram, LocalPath};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// The path media is echoed on, as published by the session task.
#[derive(Debug, Clone)]
pub struct SelectedPath {
    pub path: LocalPath,
    pub remote: SocketAddr,
}

impl SelectedPath {
    fn carries(&self, datagram: &Datagram) -> bool {
        self.path.id() == datagram.path && self.remote == datagram.from
    }
}

#[derive(Debug, Default)]
pub struct RelayStats {
    forwarded_packets: AtomicU64,
    forwarded_bytes: AtomicU64,
    dropped_packets: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    pub forwarded_packets: u64,
    pub forwarded_bytes: u64,
    pub dropped_packets: u64,
}

impl RelayStats {
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            forwarded_packets: self.forwarded_packets.load(Ordering::Relaxed),
            forwarded_bytes: self.forwarded_bytes.load(Ordering::Relaxed),
            dropped_packets: self.dropped_packets.load(Ordering::Relaxed),
        }
    }

    fn forwarded(&self, bytes: usize) {
        self.forwarded_packets.fetch_add(1, Ordering::Relaxed);
        self.forwarded_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn dropped(&self) {
        self.dropped_packets.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct MediaRelay {
    media: mpsc::Receiver<Datagram>,
    selected: watch::Receiver<Option<SelectedPath>>,
    stats: Arc<RelayStats>,
}

impl MediaRelay {
    pub fn new(
        media: mpsc::Receiver<Datagram>,
        selected: watch::Receiver<Option<SelectedPath>>,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            media,
            selected,
            stats,
        }
    }

    /// Runs until every media sender is gone.
    pub async fn run(mut self) {
        while let Some(datagram) = self.media.recv().await {
            // Clone out of the watch so no borrow is held across the send
            let target = self.selected.borrow().clone();
            match target {
                Some(selected) if selected.carries(&datagram) => {
                    match selected.path.send_to(&datagram.data, datagram.from).await {
                        Ok(()) => self.stats.forwarded(datagram.data.len()),
                        Err(e) => {
                            debug!(from = %datagram.from, error = %e, "Echo send failed");
                            self.stats.dropped();
                        }
                    }
                }
                _ => {
                    trace!(path = datagram.path, from = %datagram.from, "Dropping media off the selected path");
                    self.stats.dropped();
                }
            }
        }
        debug!("Media relay stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    struct Fixture {
        media_tx: mpsc::Sender<Datagram>,
        selected_tx: watch::Sender<Option<SelectedPath>>,
        stats: Arc<RelayStats>,
        path: LocalPath,
        client: UdpSocket,
    }

    async fn fixture() -> Fixture {
        let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (media_tx, media_rx) = mpsc::channel(16);
        let (selected_tx, selected_rx) = watch::channel(None);
        let stats = Arc::new(RelayStats::default());
        tokio::spawn(MediaRelay::new(media_rx, selected_rx, stats.clone()).run());

        Fixture {
            media_tx,
            selected_tx,
            stats,
            path: LocalPath::direct(0, server),
            client,
        }
    }

    fn datagram(path: usize, from: SocketAddr, data: &[u8]) -> Datagram {
        Datagram {
            path,
            from,
            data: data.to_vec(),
        }
    }

    async fn recv(client: &UdpSocket) -> Option<Vec<u8>> {
        let mut buf = [0u8; 64];
        let (len, _) = timeout(Duration::from_millis(300), client.recv_from(&mut buf))
            .await
            .ok()?
            .ok()?;
        Some(buf[..len].to_vec())
    }

    #[tokio::test]
    async fn test_echoes_in_order_on_selected_path() {
        let f = fixture().await;
        let client_addr = f.client.local_addr().unwrap();
        f.selected_tx
            .send(Some(SelectedPath {
                path: f.path.clone(),
                remote: client_addr,
            }))
            .unwrap();

        for payload in [&b"one"[..], &b"two"[..], &b"three"[..]] {
            f.media_tx.send(datagram(0, client_addr, payload)).await.unwrap();
        }

        assert_eq!(recv(&f.client).await.as_deref(), Some(&b"one"[..]));
        assert_eq!(recv(&f.client).await.as_deref(), Some(&b"two"[..]));
        assert_eq!(recv(&f.client).await.as_deref(), Some(&b"three"[..]));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stats = f.stats.snapshot();
        assert_eq!(stats.forwarded_packets, 3);
        assert_eq!(stats.forwarded_bytes, 11);
        assert_eq!(stats.dropped_packets, 0);
    }

    #[tokio::test]
    async fn test_drops_without_selection() {
        let f = fixture().await;
        let client_addr = f.client.local_addr().unwrap();

        f.media_tx.send(datagram(0, client_addr, b"lost")).await.unwrap();
        assert_eq!(recv(&f.client).await, None);
        assert_eq!(f.stats.snapshot().dropped_packets, 1);
    }

    #[tokio::test]
    async fn test_drops_packets_from_other_sources() {
        let f = fixture().await;
        let client_addr = f.client.local_addr().unwrap();
        f.selected_tx
            .send(Some(SelectedPath {
                path: f.path.clone(),
                remote: client_addr,
            }))
            .unwrap();

        let stranger: SocketAddr = "127.0.0.1:9".parse().unwrap();
        f.media_tx.send(datagram(0, stranger, b"x")).await.unwrap();
        f.media_tx.send(datagram(1, client_addr, b"y")).await.unwrap();
        f.media_tx.send(datagram(0, client_addr, b"z")).await.unwrap();

        assert_eq!(recv(&f.client).await.as_deref(), Some(&b"z"[..]));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = f.stats.snapshot();
        assert_eq!(stats.forwarded_packets, 1);
        assert_eq!(stats.dropped_packets, 2);
    }

    #[tokio::test]
    async fn test_resumes_after_reselection() {
        let f = fixture().await;
        let client_addr = f.client.local_addr().unwrap();
        let selected = SelectedPath {
            path: f.path.clone(),
            remote: client_addr,
        };

        f.selected_tx.send(Some(selected.clone())).unwrap();
        f.media_tx.send(datagram(0, client_addr, b"a")).await.unwrap();
        assert_eq!(recv(&f.client).await.as_deref(), Some(&b"a"[..]));

        f.selected_tx.send(None).unwrap();
        f.media_tx.send(datagram(0, client_addr, b"b")).await.unwrap();
        assert_eq!(recv(&f.client).await, None);

        f.selected_tx.send(Some(selected)).unwrap();
        f.media_tx.send(datagram(0, client_addr, b"c")).await.unwrap();
        assert_eq!(recv(&f.client).await.as_deref(), Some(&b"c"[..]));
    }
}
