//! Local transport paths and inbound demultiplexing.
//!
//! A path is one way out of the server: a host UDP socket (shared by host
//! and server-reflexive candidates) or a TURN allocation. Every datagram
//! read on a path is classified once: STUN responses complete pending
//! transactions, STUN requests go to the ICE agent, and anything else is
//! media.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use stun::{Message, MessageClass, Response, StunError, TransactionMap, is_stun_message};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use turn::{DataIndication, TurnClient};

use crate::errors::IceError;

/// Identifies a local path within one session.
pub type PathId = usize;

/// Largest UDP payload; media is echoed byte for byte.
const MAX_UDP_PACKET_SIZE: usize = 65536;

#[derive(Clone)]
enum PathKind {
    Direct(Arc<UdpSocket>),
    Relayed(Arc<TurnClient>),
}

/// A local sending path with its own pending STUN transactions.
#[derive(Clone)]
pub struct LocalPath {
    id: PathId,
    kind: PathKind,
    transactions: TransactionMap,
}

impl std::fmt::Debug for LocalPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPath")
            .field("id", &self.id)
            .field("relayed", &self.is_relayed())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

impl LocalPath {
    pub fn direct(id: PathId, socket: Arc<UdpSocket>) -> Self {
        Self {
            id,
            kind: PathKind::Direct(socket),
            transactions: TransactionMap::new(),
        }
    }

    pub fn relayed(id: PathId, client: Arc<TurnClient>) -> Self {
        Self {
            id,
            kind: PathKind::Relayed(client),
            transactions: TransactionMap::new(),
        }
    }

    pub fn id(&self) -> PathId {
        self.id
    }

    pub fn is_relayed(&self) -> bool {
        matches!(self.kind, PathKind::Relayed(_))
    }

    pub fn transactions(&self) -> &TransactionMap {
        &self.transactions
    }

    /// Bound socket address, or the relayed address for TURN paths.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.kind {
            PathKind::Direct(socket) => socket.local_addr().ok(),
            PathKind::Relayed(client) => client.allocation().map(|a| a.relayed),
        }
    }

    pub fn socket(&self) -> Option<&Arc<UdpSocket>> {
        match &self.kind {
            PathKind::Direct(socket) => Some(socket),
            PathKind::Relayed(_) => None,
        }
    }

    /// Sends a datagram to `peer`; relayed paths install a permission first.
    pub async fn send_to(&self, data: &[u8], peer: SocketAddr) -> Result<(), IceError> {
        match &self.kind {
            PathKind::Direct(socket) => {
                socket
                    .send_to(data, peer)
                    .await
                    .map_err(|e| IceError::SocketError(e.to_string()))?;
            }
            PathKind::Relayed(client) => {
                client.ensure_permission(peer).await?;
                client.send_to(data, peer).await?;
            }
        }
        Ok(())
    }

    /// Runs a STUN transaction towards `peer` over this path.
    pub async fn transact(
        &self,
        request: &Message,
        peer: SocketAddr,
        timeout: Duration,
    ) -> Result<Response, StunError> {
        if let PathKind::Relayed(client) = &self.kind {
            client
                .ensure_permission(peer)
                .await
                .map_err(|e| StunError::SocketError(e.to_string()))?;
        }

        let path = self.clone();
        self.transactions
            .transact(request, timeout, move |bytes| {
                let path = path.clone();
                async move {
                    path.send_to(&bytes, peer)
                        .await
                        .map_err(|e| StunError::SocketError(e.to_string()))
                }
            })
            .await
    }
}

/// Non-STUN datagram received on a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub path: PathId,
    pub from: SocketAddr,
    pub data: Vec<u8>,
}

/// STUN request received on a path; the agent answers it.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub path: PathId,
    pub from: SocketAddr,
    pub message: Message,
}

/// Fans inbound datagrams out to the agent and the media relay.
#[derive(Clone)]
pub struct Demux {
    requests: mpsc::Sender<InboundRequest>,
    media: mpsc::Sender<Datagram>,
}

impl Demux {
    pub fn new(requests: mpsc::Sender<InboundRequest>, media: mpsc::Sender<Datagram>) -> Self {
        Self { requests, media }
    }

    /// Classifies one datagram received on `path`. Never blocks; when a
    /// consumer lags the datagram is dropped.
    pub fn dispatch(&self, path: &LocalPath, from: SocketAddr, data: &[u8]) {
        if !is_stun_message(data) {
            let datagram = Datagram {
                path: path.id,
                from,
                data: data.to_vec(),
            };
            if self.media.try_send(datagram).is_err() {
                trace!(path = path.id, %from, "Media queue full, dropping packet");
            }
            return;
        }

        let message = match Message::decode(data) {
            Ok(message) => message,
            Err(e) => {
                debug!(path = path.id, %from, error = %e, "Discarding malformed STUN message");
                return;
            }
        };

        match message.message_type().class {
            MessageClass::SuccessResponse | MessageClass::ErrorResponse => {
                if !path.transactions.complete(message, from) {
                    trace!(path = path.id, %from, "Stray STUN response");
                }
            }
            MessageClass::Request => {
                let request = InboundRequest {
                    path: path.id,
                    from,
                    message,
                };
                if self.requests.try_send(request).is_err() {
                    debug!(path = path.id, %from, "Request queue full, dropping STUN request");
                }
            }
            MessageClass::Indication => {}
        }
    }

    /// Reads a host socket until it errors or the task is aborted.
    pub async fn read_socket(self, path: LocalPath, socket: Arc<UdpSocket>) {
        let mut buf = vec![0u8; MAX_UDP_PACKET_SIZE];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, from)) => self.dispatch(&path, from, &buf[..len]),
                Err(e) if is_transient(&e) => continue,
                Err(e) => {
                    warn!(path = path.id, error = %e, "Socket reader stopped");
                    return;
                }
            }
        }
    }

    /// Forwards Data indications received through a TURN allocation.
    pub async fn read_relay(self, path: LocalPath, mut data_rx: mpsc::Receiver<DataIndication>) {
        while let Some(indication) = data_rx.recv().await {
            self.dispatch(&path, indication.peer, &indication.data);
        }
        debug!(path = path.id, "Relay reader stopped");
    }
}

/// ICMP port unreachable surfaces as ConnectionReset on some platforms.
fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionRefused
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use stun::{MessageBuilder, MessageType};

    async fn setup() -> (
        Demux,
        mpsc::Receiver<InboundRequest>,
        mpsc::Receiver<Datagram>,
        LocalPath,
    ) {
        let (req_tx, req_rx) = mpsc::channel(4);
        let (media_tx, media_rx) = mpsc::channel(1);
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        (
            Demux::new(req_tx, media_tx),
            req_rx,
            media_rx,
            LocalPath::direct(0, socket),
        )
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_media_goes_to_media_queue() {
        let (demux, _req_rx, mut media_rx, path) = setup().await;

        demux.dispatch(&path, peer(), &[0x80, 0x6f, 0x00, 0x01]);

        let datagram = media_rx.try_recv().unwrap();
        assert_eq!(datagram.path, 0);
        assert_eq!(datagram.from, peer());
        assert_eq!(datagram.data, vec![0x80, 0x6f, 0x00, 0x01]);
    }

    #[tokio::test]
    async fn test_full_media_queue_drops() {
        let (demux, _req_rx, mut media_rx, path) = setup().await;

        demux.dispatch(&path, peer(), &[0x80, 1]);
        demux.dispatch(&path, peer(), &[0x80, 2]);

        assert_eq!(media_rx.try_recv().unwrap().data, vec![0x80, 1]);
        assert!(media_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_requests_go_to_agent() {
        let (demux, mut req_rx, mut media_rx, path) = setup().await;
        let request = MessageBuilder::new(MessageType::binding_request())
            .random_transaction_id()
            .fingerprint()
            .build()
            .unwrap();

        demux.dispatch(&path, peer(), &request.encode());

        let inbound = req_rx.try_recv().unwrap();
        assert_eq!(inbound.from, peer());
        assert_eq!(inbound.message.transaction_id(), request.transaction_id());
        assert!(media_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_responses_complete_transactions() {
        let (demux, mut req_rx, _media_rx, path) = setup().await;
        let response = MessageBuilder::new(MessageType::binding_success())
            .random_transaction_id()
            .xor_address(stun::AttributeType::XorMappedAddress, peer())
            .build()
            .unwrap();
        let mut waiter = path.transactions().register(response.transaction_id());

        demux.dispatch(&path, peer(), &response.encode());

        let delivered = waiter.try_recv().unwrap();
        assert_eq!(delivered.from, peer());
        assert!(req_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_read_socket_keeps_large_datagrams_whole() {
        let (demux, _req_rx, mut media_rx, _) = setup().await;
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let path = LocalPath::direct(3, socket.clone());
        let reader = tokio::spawn(demux.read_socket(path, socket));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut payload = vec![0x80, 0x6f];
        payload.extend((0..1998u32).map(|i| (i % 253) as u8));
        sender.send_to(&payload, addr).await.unwrap();

        let datagram = tokio::time::timeout(Duration::from_secs(2), media_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(datagram.path, 3);
        assert_eq!(datagram.from, sender.local_addr().unwrap());
        assert_eq!(datagram.data.len(), 2000);
        assert_eq!(datagram.data, payload);
        reader.abort();
    }
}
