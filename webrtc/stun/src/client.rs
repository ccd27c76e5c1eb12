//! STUN client for discovering reflexive (public) addresses.
//!
//! The client sends Binding Requests from a socket it shares with other
//! users (ICE checks, media). Responses are delivered by whoever reads the
//! socket through the shared [`TransactionMap`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::debug;

use crate::errors::StunError;
use crate::message::Message;
use crate::message_builder::MessageBuilder;
use crate::message_type::{MessageClass, MessageType};
use crate::transaction::TransactionMap;

#[derive(Clone)]
pub struct StunClient {
    socket: Arc<UdpSocket>,
    transactions: TransactionMap,
}

impl StunClient {
    pub fn new(socket: Arc<UdpSocket>, transactions: TransactionMap) -> Self {
        Self {
            socket,
            transactions,
        }
    }

    /// Performs a Binding Request to discover the reflexive address of the
    /// shared socket as seen by `server`.
    ///
    /// # Returns
    /// * `Ok(SocketAddr)` - The reflexive address returned by the server
    /// * `Err(StunError::Timeout)` - No answer within `timeout`
    /// * `Err(StunError::ErrorResponse)` - The server answered with an error
    pub async fn get_reflexive_address(
        &self,
        server: SocketAddr,
        timeout: Duration,
    ) -> Result<SocketAddr, StunError> {
        let request = MessageBuilder::new(MessageType::binding_request())
            .random_transaction_id()
            .fingerprint()
            .build()?;

        let socket = self.socket.clone();
        let response = self
            .transactions
            .transact(&request, timeout, move |bytes| {
                let socket = socket.clone();
                async move {
                    socket.send_to(&bytes, server).await?;
                    Ok(())
                }
            })
            .await?;

        let reflexive = extract_reflexive_address(&response.message)?;
        debug!(%server, %reflexive, "STUN binding succeeded");
        Ok(reflexive)
    }
}

fn extract_reflexive_address(response: &Message) -> Result<SocketAddr, StunError> {
    match response.message_type().class {
        MessageClass::SuccessResponse => response
            .mapped_address()
            .ok_or(StunError::MissingRequiredField("XOR-MAPPED-ADDRESS")),
        MessageClass::ErrorResponse => {
            let (code, reason) = response.error_code().unwrap_or((0, String::new()));
            Err(StunError::ErrorResponse { code, reason })
        }
        _ => Err(StunError::UnexpectedMessageType),
    }
}

/// Resolves a `host:port` STUN/TURN server name, giving up after `limit`.
///
/// # Returns
/// Every resolved address, IPv4 first.
pub async fn resolve_server(server: &str, limit: Duration) -> Result<Vec<SocketAddr>, StunError> {
    bounded_lookup(server, tokio::net::lookup_host(server), limit).await
}

async fn bounded_lookup<I>(
    server: &str,
    lookup: impl Future<Output = std::io::Result<I>>,
    limit: Duration,
) -> Result<Vec<SocketAddr>, StunError>
where
    I: Iterator<Item = SocketAddr>,
{
    let resolved = tokio::time::timeout(limit, lookup).await.map_err(|_| {
        debug!(%server, "Server name resolution timed out");
        StunError::Timeout
    })??;
    let mut addrs: Vec<SocketAddr> = resolved.collect();
    addrs.sort_by_key(|a| a.is_ipv6());
    if addrs.is_empty() {
        return Err(StunError::SocketError(format!(
            "no addresses resolved for {server}"
        )));
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute_type::AttributeType;

    /// Minimal STUN server answering one Binding Request.
    async fn answer_once(server: Arc<UdpSocket>) {
        let mut buf = [0u8; 1500];
        let (len, from) = server.recv_from(&mut buf).await.unwrap();
        let request = Message::decode(&buf[..len]).unwrap();
        let response = MessageBuilder::new(MessageType::binding_success())
            .transaction_id(request.transaction_id())
            .xor_address(AttributeType::XorMappedAddress, from)
            .build()
            .unwrap();
        server.send_to(&response.encode(), from).await.unwrap();
    }

    /// Reads the client socket and completes transactions.
    fn spawn_reader(socket: Arc<UdpSocket>, transactions: TransactionMap) {
        tokio::spawn(async move {
            let mut buf = [0u8; 1500];
            while let Ok((len, from)) = socket.recv_from(&mut buf).await {
                if let Ok(message) = Message::decode(&buf[..len]) {
                    transactions.complete(message, from);
                }
            }
        });
    }

    #[tokio::test]
    async fn test_get_reflexive_address() {
        let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(answer_once(server));

        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let local = socket.local_addr().unwrap();
        let transactions = TransactionMap::new();
        spawn_reader(socket.clone(), transactions.clone());

        let client = StunClient::new(socket, transactions);
        let reflexive = client
            .get_reflexive_address(server_addr, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reflexive, local);
    }

    #[tokio::test]
    async fn test_get_reflexive_address_times_out() {
        // Bound but silent
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let client = StunClient::new(socket, TransactionMap::new());

        let result = client
            .get_reflexive_address(silent.local_addr().unwrap(), Duration::from_millis(300))
            .await;
        assert!(matches!(result, Err(StunError::Timeout)));
    }

    #[test]
    fn test_error_response_is_reported() {
        let mut response = Message::new(MessageType::binding_error(), [0; 12]);
        response.add_error_code(420, "Unknown Attribute");
        assert!(matches!(
            extract_reflexive_address(&response),
            Err(StunError::ErrorResponse { code: 420, .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_server_literal() {
        let addrs = resolve_server("127.0.0.1:3478", Duration::from_secs(1)).await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:3478".parse().unwrap()]);
    }

    #[tokio::test]
    async fn test_stalled_resolver_times_out() {
        let stalled = std::future::pending::<std::io::Result<std::vec::IntoIter<SocketAddr>>>();
        let result = bounded_lookup("stun.example.org:3478", stalled, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(StunError::Timeout)));
    }

    #[tokio::test]
    async fn test_empty_resolution_is_an_error() {
        let empty = std::future::ready(Ok(Vec::<SocketAddr>::new().into_iter()));
        let result = bounded_lookup("nowhere.invalid:3478", empty, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(StunError::SocketError(_))));
    }
}
