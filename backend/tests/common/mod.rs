//! In-process server and a simulated browser for the signaling tests.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use echo_server::config::EchoServerConfig;
use echo_server::http::{AppState, router};
use echo_server::{SessionRegistry, SignalingUseCase};
use ice::{IceCredentials, success_response};
use serde_json::{Value, json};
use stun::{Message, MessageClass, is_stun_message};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tower::ServiceExt;
use webrtc::Certificate;

/// Fast-failing configuration bound to two loopback host sockets.
pub fn test_config() -> EchoServerConfig {
    let mut config = EchoServerConfig::default();
    config.ice.host_addresses = vec![IpAddr::V4(Ipv4Addr::LOCALHOST); 2];
    config.ice.check_timeout_ms = 300;
    config.ice.check_retries = 1;
    config.ice.keepalive_interval_ms = 100;
    config.ice.recovery_window_ms = 3_000;
    config.sessions.max_sessions = 4;
    config
}

pub struct TestServer {
    pub app: Router,
    pub registry: SessionRegistry,
}

impl TestServer {
    pub fn new(config: &EchoServerConfig) -> Self {
        let registry = SessionRegistry::new(
            Arc::new(config.peer_connection_config().unwrap()),
            Arc::new(Certificate::generate().unwrap()),
            (&config.sessions).into(),
        );
        let state = AppState::new(SignalingUseCase::new(registry.clone()));
        Self {
            app: router(state, config.server.request_timeout()),
            registry,
        }
    }

    pub async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        self.raw(method, uri, body).await
    }

    pub async fn raw(&self, method: Method, uri: &str, body: Body) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    pub async fn offer(&self, sdp: &str, client_id: Option<&str>) -> (StatusCode, Value) {
        let mut body = json!({ "sdp": sdp, "type": "offer" });
        if let Some(client_id) = client_id {
            body["client_id"] = json!(client_id);
        }
        self.call(Method::POST, "/offer", Some(body)).await
    }

    pub async fn trickle(&self, session_id: &str, candidates: &[String], done: bool) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            &format!("/sessions/{session_id}/candidates"),
            Some(json!({ "candidates": candidates, "end_of_candidates": done })),
        )
        .await
    }

    pub async fn session(&self, session_id: &str) -> (StatusCode, Value) {
        self.call(Method::GET, &format!("/sessions/{session_id}"), None).await
    }

    /// Polls the session until it reports `state`.
    pub async fn wait_for_state(&self, session_id: &str, state: &str) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let (status, body) = self.session(session_id).await;
            assert_eq!(status, StatusCode::OK, "{body}");
            if body["state"] == state {
                return body;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {state}, at {}",
                body["state"]
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

pub struct BrowserSocket {
    pub socket: Arc<UdpSocket>,
    pub media: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Host candidates that answer connectivity checks while `answering` is
/// set and collect everything else they receive.
pub struct Browser {
    pub credentials: IceCredentials,
    pub sockets: Vec<BrowserSocket>,
    pub answering: Arc<AtomicBool>,
}

impl Browser {
    pub async fn new(candidates: usize) -> Self {
        let credentials = IceCredentials::new("brws", "browserpasswordbrowserpw");
        let answering = Arc::new(AtomicBool::new(true));
        let mut sockets = Vec::new();
        for _ in 0..candidates {
            let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
            let (media_tx, media) = mpsc::unbounded_channel();
            tokio::spawn(answer_checks(
                socket.clone(),
                credentials.pwd.clone(),
                answering.clone(),
                media_tx,
            ));
            sockets.push(BrowserSocket { socket, media });
        }
        Self {
            credentials,
            sockets,
            answering,
        }
    }

    pub fn offer(&self) -> String {
        format!(
            "v=0\r\n\
             o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
             s=-\r\n\
             t=0 0\r\n\
             a=group:BUNDLE 0\r\n\
             m=audio 9 UDP/TLS/RTP/SAVPF 111 0\r\n\
             c=IN IP4 0.0.0.0\r\n\
             a=mid:0\r\n\
             a=sendrecv\r\n\
             a=rtcp-mux\r\n\
             a=ice-ufrag:{}\r\n\
             a=ice-pwd:{}\r\n\
             a=fingerprint:sha-256 AB:CD:EF\r\n\
             a=setup:actpass\r\n\
             a=rtpmap:111 opus/48000/2\r\n\
             a=rtpmap:0 PCMU/8000\r\n",
            self.credentials.ufrag, self.credentials.pwd
        )
    }

    pub fn candidates(&self) -> Vec<String> {
        self.sockets
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let port = s.socket.local_addr().unwrap().port();
                format!("candidate:{} 1 udp 2122260223 127.0.0.1 {} typ host", i + 1, port)
            })
            .collect()
    }

    pub fn socket_for(&mut self, addr: SocketAddr) -> &mut BrowserSocket {
        self.sockets
            .iter_mut()
            .find(|s| s.socket.local_addr().unwrap() == addr)
            .unwrap()
    }

    pub fn stop_answering(&self) {
        self.answering.store(false, Ordering::SeqCst);
    }
}

async fn answer_checks(
    socket: Arc<UdpSocket>,
    pwd: String,
    answering: Arc<AtomicBool>,
    media: mpsc::UnboundedSender<Vec<u8>>,
) {
    let mut buf = [0u8; 1500];
    while let Ok((len, from)) = socket.recv_from(&mut buf).await {
        let data = &buf[..len];
        if !is_stun_message(data) {
            let _ = media.send(data.to_vec());
            continue;
        }
        let Ok(request) = Message::decode(data) else {
            continue;
        };
        if request.message_type().class != MessageClass::Request || !answering.load(Ordering::SeqCst) {
            continue;
        }
        let response = success_response(&request, from, &pwd).unwrap();
        let _ = socket.send_to(&response.encode(), from).await;
    }
}
