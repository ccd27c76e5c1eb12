//! TURN client implementation.
//!
//! Each client owns one UDP socket towards its TURN server and a reader
//! task that completes pending transactions and forwards Data indications.
//! Requests are authenticated with long-term credentials after the
//! server's first 401 challenge.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stun::{
    AttributeType, Message, MessageBuilder, MessageClass, StunError, TransactionMap,
    is_stun_message,
};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::credentials::{AuthContext, Credentials};
use crate::errors::{Result, TurnError};
use crate::turn_attribute_type::{TransportProtocol, TurnAttributeType, TurnMethod};

/// Largest UDP payload; anything smaller would truncate relayed media.
const MAX_UDP_PACKET_SIZE: usize = 65536;

/// Attempts per request: initial, after 401 challenge, after 438 stale nonce.
const MAX_AUTH_ATTEMPTS: usize = 3;

/// Result of a successful Allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub relayed: SocketAddr,
    /// Our reflexive address as seen by the server, when reported
    pub mapped: Option<SocketAddr>,
    pub lifetime: Duration,
}

/// Application data received through the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataIndication {
    pub peer: SocketAddr,
    pub data: Vec<u8>,
}

pub struct TurnClient {
    socket: Arc<UdpSocket>,
    server: SocketAddr,
    credentials: Option<Credentials>,
    auth: Mutex<Option<AuthContext>>,
    allocation: Mutex<Option<Allocation>>,
    permissions: Mutex<HashSet<IpAddr>>,
    transactions: TransactionMap,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl TurnClient {
    /// Binds a socket towards `server` and starts the reader task.
    ///
    /// # Arguments
    /// * `server` - TURN server address
    /// * `credentials` - Long-term credentials, if the server requires them
    /// * `request_timeout` - Bound on every request, retransmissions included
    /// * `data_tx` - Receives Data indications; full channels drop packets
    pub async fn connect(
        server: SocketAddr,
        credentials: Option<Credentials>,
        request_timeout: Duration,
        data_tx: mpsc::Sender<DataIndication>,
    ) -> Result<Self> {
        let bind_ip = match server {
            SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let socket = Arc::new(UdpSocket::bind(SocketAddr::new(bind_ip, 0)).await?);
        let transactions = TransactionMap::new();
        let reader = tokio::spawn(read_loop(
            socket.clone(),
            server,
            transactions.clone(),
            data_tx,
        ));

        Ok(Self {
            socket,
            server,
            credentials,
            auth: Mutex::new(None),
            allocation: Mutex::new(None),
            permissions: Mutex::new(HashSet::new()),
            transactions,
            request_timeout,
            reader,
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Local address of the socket towards the server.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn allocation(&self) -> Option<Allocation> {
        *lock(&self.allocation)
    }

    /// Allocates a relayed UDP address.
    ///
    /// # Returns
    /// * `Ok(Allocation)` - The relayed address and granted lifetime
    /// * `Err(TurnError::Unauthorized)` - Credentials missing or rejected
    /// * `Err(TurnError::Stun(StunError::Timeout))` - Server unreachable
    pub async fn allocate(&self, lifetime: Duration) -> Result<Allocation> {
        info!(server = %self.server, "Sending TURN Allocate request");

        let transport = TransportProtocol::Udp.requested_transport_value();
        let seconds = lifetime.as_secs() as u32;
        let response = self
            .request(TurnMethod::Allocate, &|builder| {
                builder
                    .attribute(TurnAttributeType::RequestedTransport, &transport)
                    .attribute(TurnAttributeType::Lifetime, &seconds.to_be_bytes())
            })
            .await?;

        let relayed = response
            .get_xor_address(TurnAttributeType::XorRelayedAddress)
            .ok_or(TurnError::MissingAttribute("XOR-RELAYED-ADDRESS"))?;
        let granted = response
            .get_u32(TurnAttributeType::Lifetime)
            .map(|s| Duration::from_secs(s as u64))
            .unwrap_or(lifetime);

        let allocation = Allocation {
            relayed,
            mapped: response.get_xor_address(AttributeType::XorMappedAddress),
            lifetime: granted,
        };
        *lock(&self.allocation) = Some(allocation);

        info!(server = %self.server, %relayed, lifetime_secs = granted.as_secs(), "Allocated relay address");
        Ok(allocation)
    }

    /// Refreshes the allocation.
    ///
    /// # Returns
    /// The lifetime granted by the server.
    pub async fn refresh(&self, lifetime: Duration) -> Result<Duration> {
        self.ensure_allocation()?;
        debug!(server = %self.server, lifetime_secs = lifetime.as_secs(), "Refreshing TURN allocation");

        let seconds = lifetime.as_secs() as u32;
        let response = self
            .request(TurnMethod::Refresh, &|builder| {
                builder.attribute(TurnAttributeType::Lifetime, &seconds.to_be_bytes())
            })
            .await?;

        let granted = response
            .get_u32(TurnAttributeType::Lifetime)
            .map(|s| Duration::from_secs(s as u64))
            .unwrap_or(lifetime);
        if let Some(allocation) = lock(&self.allocation).as_mut() {
            allocation.lifetime = granted;
        }
        Ok(granted)
    }

    /// Releases the allocation (Refresh with lifetime 0).
    pub async fn deallocate(&self) -> Result<()> {
        if lock(&self.allocation).is_none() {
            return Ok(());
        }
        let response = self
            .request(TurnMethod::Refresh, &|builder| {
                builder.attribute(TurnAttributeType::Lifetime, &0u32.to_be_bytes())
            })
            .await;
        *lock(&self.allocation) = None;
        lock(&self.permissions).clear();

        match response {
            Ok(_) => {
                info!(server = %self.server, "TURN allocation released");
                Ok(())
            }
            // 437 Allocation Mismatch: already gone on the server
            Err(TurnError::ErrorResponse { code: 437, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Installs a permission so the relay accepts traffic from `peer`.
    pub async fn create_permission(&self, peer: SocketAddr) -> Result<()> {
        self.ensure_allocation()?;
        debug!(server = %self.server, %peer, "Creating TURN permission");

        self.request(TurnMethod::CreatePermission, &|builder| {
            builder.xor_address(TurnAttributeType::XorPeerAddress, peer)
        })
        .await?;
        lock(&self.permissions).insert(peer.ip());
        Ok(())
    }

    /// Creates a permission for `peer` unless one was already installed.
    pub async fn ensure_permission(&self, peer: SocketAddr) -> Result<()> {
        if lock(&self.permissions).contains(&peer.ip()) {
            return Ok(());
        }
        self.create_permission(peer).await
    }

    /// Re-installs every known permission; they expire after five minutes.
    pub async fn refresh_permissions(&self) -> Result<()> {
        let peers: Vec<IpAddr> = lock(&self.permissions).iter().copied().collect();
        for ip in peers {
            self.create_permission(SocketAddr::new(ip, 0)).await?;
        }
        Ok(())
    }

    /// Sends data to a peer through the relay as a Send indication.
    ///
    /// A permission must exist for the peer.
    pub async fn send_to(&self, data: &[u8], peer: SocketAddr) -> Result<()> {
        self.ensure_allocation()?;

        let indication = MessageBuilder::new(TurnMethod::Send.indication())
            .random_transaction_id()
            .xor_address(TurnAttributeType::XorPeerAddress, peer)
            .attribute(TurnAttributeType::Data, data)
            .build()?;
        self.socket.send_to(&indication.encode(), self.server).await?;
        Ok(())
    }

    /// Stops the reader and fails every pending request.
    pub fn close(&self) {
        self.reader.abort();
        self.transactions.cancel_all();
    }

    fn ensure_allocation(&self) -> Result<()> {
        if lock(&self.allocation).is_some() {
            Ok(())
        } else {
            Err(TurnError::NoAllocation)
        }
    }

    /// Runs one request through the 401/438 authentication dance.
    async fn request(
        &self,
        method: TurnMethod,
        attributes: &(dyn Fn(MessageBuilder) -> MessageBuilder + Sync),
    ) -> Result<Message> {
        for _ in 0..MAX_AUTH_ATTEMPTS {
            let auth = lock(&self.auth).clone();

            let mut builder =
                attributes(MessageBuilder::new(method.request()).random_transaction_id());
            if let Some(auth) = &auth {
                builder = builder
                    .username(&auth.username)
                    .attribute(AttributeType::Realm, auth.realm.as_bytes())
                    .attribute(AttributeType::Nonce, auth.nonce.as_bytes())
                    .message_integrity(&auth.key);
            }
            let request = builder.fingerprint().build()?;

            let socket = self.socket.clone();
            let server = self.server;
            let response = self
                .transactions
                .transact(&request, self.request_timeout, move |bytes| {
                    let socket = socket.clone();
                    async move {
                        socket.send_to(&bytes, server).await?;
                        Ok(())
                    }
                })
                .await?
                .message;

            match response.message_type().class {
                MessageClass::SuccessResponse => return Ok(response),
                MessageClass::ErrorResponse => {
                    let (code, reason) = response.error_code().unwrap_or((0, String::new()));
                    match code {
                        401 => self.on_unauthorized(&response, auth.is_some())?,
                        438 => self.on_stale_nonce(&response)?,
                        _ => {
                            warn!(server = %self.server, method = method.as_str(), code, %reason, "TURN request rejected");
                            return Err(TurnError::ErrorResponse { code, reason });
                        }
                    }
                }
                _ => return Err(StunError::UnexpectedMessageType.into()),
            }
        }
        Err(TurnError::Unauthorized(self.server))
    }

    fn on_unauthorized(&self, challenge: &Message, had_auth: bool) -> Result<()> {
        let Some(credentials) = &self.credentials else {
            return Err(TurnError::Unauthorized(self.server));
        };
        // A second 401 after authenticating means the credentials are wrong
        if had_auth {
            return Err(TurnError::Unauthorized(self.server));
        }
        let realm = challenge
            .get_string(AttributeType::Realm)
            .ok_or(TurnError::MissingAttribute("REALM"))?;
        let nonce = challenge
            .get_string(AttributeType::Nonce)
            .ok_or(TurnError::MissingAttribute("NONCE"))?;

        *lock(&self.auth) = Some(AuthContext {
            username: credentials.username.clone(),
            key: credentials.long_term_key(&realm),
            realm,
            nonce,
        });
        Ok(())
    }

    fn on_stale_nonce(&self, response: &Message) -> Result<()> {
        let nonce = response
            .get_string(AttributeType::Nonce)
            .ok_or(TurnError::MissingAttribute("NONCE"))?;
        match lock(&self.auth).as_mut() {
            Some(auth) => {
                auth.nonce = nonce;
                Ok(())
            }
            None => Err(TurnError::Unauthorized(self.server)),
        }
    }
}

impl Drop for TurnClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn read_loop(
    socket: Arc<UdpSocket>,
    server: SocketAddr,
    transactions: TransactionMap,
    data_tx: mpsc::Sender<DataIndication>,
) {
    let mut buf = vec![0u8; MAX_UDP_PACKET_SIZE];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) if is_transient(&e) => {
                debug!(%server, error = %e, "TURN socket receive failed");
                continue;
            }
            Err(e) => {
                warn!(%server, error = %e, "TURN reader stopped");
                return;
            }
        };
        if from != server || !is_stun_message(&buf[..len]) {
            continue;
        }
        let Ok(message) = Message::decode(&buf[..len]) else {
            continue;
        };

        let message_type = message.message_type();
        if message_type.class.is_response() {
            transactions.complete(message, from);
        } else if message_type == TurnMethod::Data.indication() {
            let peer = message.get_xor_address(TurnAttributeType::XorPeerAddress);
            let data = message.get_attribute(TurnAttributeType::Data);
            if let (Some(peer), Some(data)) = (peer, data) {
                let indication = DataIndication {
                    peer,
                    data: data.to_vec(),
                };
                if data_tx.try_send(indication).is_err() && data_tx.is_closed() {
                    return;
                }
            }
        }
    }
}

/// Errors after which the socket is still usable.
fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock
    )
}
