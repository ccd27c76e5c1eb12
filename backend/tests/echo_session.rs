//! A browser negotiating over HTTP and having its audio echoed.

mod common;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::http::{Method, StatusCode};
use common::{Browser, TestServer, test_config};
use ice::Candidate;
use tokio::time::timeout;

fn socket_addr(value: &serde_json::Value) -> SocketAddr {
    Candidate::parse(value.as_str().unwrap()).unwrap().socket_addr()
}

#[tokio::test]
async fn test_offer_trickle_connect_and_echo() {
    let server = TestServer::new(&test_config());
    let mut browser = Browser::new(2).await;

    let (status, body) = server.offer(&browser.offer(), Some("browser")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let session_id = body["session_id"].as_str().unwrap().to_string();
    assert_eq!(body["sdp"].as_str().unwrap().matches("a=candidate:").count(), 2);

    let (status, body) = server.trickle(&session_id, &browser.candidates(), true).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["candidates"], serde_json::json!([]));

    server.wait_for_state(&session_id, "connected").await;
    // Let the remaining checks settle so the selection is final
    tokio::time::sleep(Duration::from_millis(500)).await;
    let (_, snapshot) = server.session(&session_id).await;
    let server_addr = socket_addr(&snapshot["selected_pair"]["local"]);
    let browser_addr = socket_addr(&snapshot["selected_pair"]["remote"]);

    let socket = browser.socket_for(browser_addr);
    let packets: Vec<Vec<u8>> = (0u8..5)
        .map(|seq| vec![0x80, 0x6f, 0x00, seq, 0x00, 0x00, 0x03, 0xc0, seq])
        .collect();
    for packet in &packets {
        socket.socket.send_to(packet, server_addr).await.unwrap();
    }
    for packet in &packets {
        let echoed = timeout(Duration::from_secs(2), socket.media.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&echoed, packet);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (_, snapshot) = server.session(&session_id).await;
    assert_eq!(snapshot["state"], "connected");
    assert_eq!(snapshot["stats"]["forwarded_packets"], 5);
    assert_eq!(snapshot["stats"]["forwarded_bytes"], 45);

    let (status, _) = server
        .call(Method::DELETE, &format!("/sessions/{session_id}"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = server.session(&session_id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_close_during_check_removes_session() {
    let mut config = test_config();
    config.ice.check_timeout_ms = 30_000;
    let grace = Duration::from_millis(config.sessions.cancellation_grace_ms);
    let server = TestServer::new(&config);
    let browser = Browser::new(1).await;
    browser.stop_answering();

    let (_, body) = server.offer(&browser.offer(), None).await;
    let session_id = body["session_id"].as_str().unwrap().to_string();
    server.trickle(&session_id, &browser.candidates(), true).await;
    server.wait_for_state(&session_id, "connecting").await;

    let session = server.registry.get(&session_id).unwrap();
    let started = Instant::now();
    let (status, _) = server
        .call(Method::DELETE, &format!("/sessions/{session_id}"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(started.elapsed() < grace);

    assert!(server.registry.get(&session_id).is_err());
    assert_eq!(session.state(), webrtc::PeerConnectionState::Closed);
}

#[tokio::test]
async fn test_liveness_loss_fails_and_is_swept() {
    let mut config = test_config();
    config.sessions.terminal_grace_secs = 1;
    let server = TestServer::new(&config);
    let browser = Browser::new(1).await;

    let (_, body) = server.offer(&browser.offer(), None).await;
    let session_id = body["session_id"].as_str().unwrap().to_string();
    server.trickle(&session_id, &browser.candidates(), true).await;
    server.wait_for_state(&session_id, "connected").await;

    browser.stop_answering();
    let disconnected = server.wait_for_state(&session_id, "disconnected").await;
    assert!(disconnected["selected_pair"].is_null());
    server.wait_for_state(&session_id, "failed").await;

    assert_eq!(server.registry.sweep(Instant::now()).await, 0);
    let later = Instant::now() + Duration::from_secs(2);
    assert_eq!(server.registry.sweep(later).await, 1);
    let (status, _) = server.session(&session_id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
