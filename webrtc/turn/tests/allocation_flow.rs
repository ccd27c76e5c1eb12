//! TURN client flows against an in-process mock server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use stun::{AttributeType, Message, MessageBuilder, MessageClass, MessageType};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use turn::{Credentials, TurnAttributeType, TurnClient, TurnError, TurnMethod};

const REALM: &str = "example.org";
const NONCE: &str = "f00dcafe";
const RELAYED: &str = "198.51.100.1:50000";

/// Answers Allocate/Refresh/CreatePermission with long-term auth and echoes
/// Send indications back as Data indications.
async fn spawn_mock_server(password: &'static str) -> SocketAddr {
    let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let addr = socket.local_addr().unwrap();
    let key = Credentials::new("user", password).long_term_key(REALM);

    tokio::spawn(async move {
        let mut buf = vec![0u8; 65536];
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let Ok(request) = Message::decode(&buf[..len]) else {
                continue;
            };
            let message_type = request.message_type();

            if message_type == TurnMethod::Send.indication() {
                let peer = request
                    .get_xor_address(TurnAttributeType::XorPeerAddress)
                    .unwrap();
                let data = request.get_attribute(TurnAttributeType::Data).unwrap();
                let indication = MessageBuilder::new(TurnMethod::Data.indication())
                    .random_transaction_id()
                    .xor_address(TurnAttributeType::XorPeerAddress, peer)
                    .attribute(TurnAttributeType::Data, data)
                    .build()
                    .unwrap();
                socket.send_to(&indication.encode(), from).await.unwrap();
                continue;
            }

            let authenticated = request.verify_message_integrity(&key).is_ok();
            let response = if !authenticated {
                let mut challenge = Message::new(
                    MessageType::new(message_type.method, MessageClass::ErrorResponse),
                    request.transaction_id(),
                );
                challenge.add_error_code(401, "Unauthorized");
                challenge.add_attribute(AttributeType::Realm, REALM.as_bytes());
                challenge.add_attribute(AttributeType::Nonce, NONCE.as_bytes());
                challenge
            } else {
                let mut success = Message::new(
                    MessageType::new(message_type.method, MessageClass::SuccessResponse),
                    request.transaction_id(),
                );
                if message_type.method == TurnMethod::Allocate.code() {
                    success.add_xor_address(
                        TurnAttributeType::XorRelayedAddress,
                        RELAYED.parse().unwrap(),
                    );
                    success.add_xor_address(AttributeType::XorMappedAddress, from);
                }
                if let Some(lifetime) = request.get_attribute(TurnAttributeType::Lifetime) {
                    success.add_attribute(TurnAttributeType::Lifetime, lifetime);
                }
                success.add_message_integrity(&key);
                success
            };
            socket.send_to(&response.encode(), from).await.unwrap();
        }
    });

    addr
}

#[tokio::test]
async fn test_allocate_after_challenge() {
    let server = spawn_mock_server("pass").await;
    let (data_tx, _data_rx) = mpsc::channel(8);
    let client = TurnClient::connect(
        server,
        Some(Credentials::new("user", "pass")),
        Duration::from_secs(2),
        data_tx,
    )
    .await
    .unwrap();

    let allocation = client.allocate(Duration::from_secs(600)).await.unwrap();
    assert_eq!(allocation.relayed, RELAYED.parse::<SocketAddr>().unwrap());
    assert_eq!(allocation.mapped, Some(client.local_addr().unwrap()));
    assert_eq!(allocation.lifetime, Duration::from_secs(600));

    let granted = client.refresh(Duration::from_secs(300)).await.unwrap();
    assert_eq!(granted, Duration::from_secs(300));

    client.deallocate().await.unwrap();
    assert!(client.allocation().is_none());
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let server = spawn_mock_server("pass").await;
    let (data_tx, _data_rx) = mpsc::channel(8);
    let client = TurnClient::connect(
        server,
        Some(Credentials::new("user", "wrong")),
        Duration::from_secs(2),
        data_tx,
    )
    .await
    .unwrap();

    let err = client.allocate(Duration::from_secs(600)).await.unwrap_err();
    assert!(err.is_auth_rejection());
}

#[tokio::test]
async fn test_missing_credentials_are_rejected() {
    let server = spawn_mock_server("pass").await;
    let (data_tx, _data_rx) = mpsc::channel(8);
    let client = TurnClient::connect(server, None, Duration::from_secs(2), data_tx)
        .await
        .unwrap();

    let err = client.allocate(Duration::from_secs(600)).await.unwrap_err();
    assert!(matches!(err, TurnError::Unauthorized(addr) if addr == server));
}

#[tokio::test]
async fn test_unreachable_server_times_out() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let (data_tx, _data_rx) = mpsc::channel(8);
    let client = TurnClient::connect(
        silent.local_addr().unwrap(),
        None,
        Duration::from_millis(300),
        data_tx,
    )
    .await
    .unwrap();

    let err = client.allocate(Duration::from_secs(600)).await.unwrap_err();
    assert!(matches!(err, TurnError::Stun(stun::StunError::Timeout)));
}

#[tokio::test]
async fn test_send_and_receive_through_relay() {
    let server = spawn_mock_server("pass").await;
    let (data_tx, mut data_rx) = mpsc::channel(8);
    let client = TurnClient::connect(
        server,
        Some(Credentials::new("user", "pass")),
        Duration::from_secs(2),
        data_tx,
    )
    .await
    .unwrap();

    let peer: SocketAddr = "203.0.113.9:4000".parse().unwrap();
    assert!(matches!(
        client.send_to(b"early", peer).await,
        Err(TurnError::NoAllocation)
    ));

    client.allocate(Duration::from_secs(600)).await.unwrap();
    client.ensure_permission(peer).await.unwrap();
    client.send_to(b"hello relay", peer).await.unwrap();

    let indication = tokio::time::timeout(Duration::from_secs(2), data_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(indication.peer, peer);
    assert_eq!(indication.data, b"hello relay");
}

#[tokio::test]
async fn test_large_data_indication_arrives_whole() {
    let server = spawn_mock_server("pass").await;
    let (data_tx, mut data_rx) = mpsc::channel(8);
    let client = TurnClient::connect(
        server,
        Some(Credentials::new("user", "pass")),
        Duration::from_secs(2),
        data_tx,
    )
    .await
    .unwrap();

    let peer: SocketAddr = "203.0.113.9:4000".parse().unwrap();
    client.allocate(Duration::from_secs(600)).await.unwrap();
    client.ensure_permission(peer).await.unwrap();

    let payload: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
    client.send_to(&payload, peer).await.unwrap();

    let indication = tokio::time::timeout(Duration::from_secs(2), data_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(indication.data.len(), payload.len());
    assert_eq!(indication.data, payload);
}
