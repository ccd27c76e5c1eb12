//! A simulated browser on loopback: offer, trickle, checks and echo.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ice::{IceAgentConfig, IceCredentials, success_response};
use stun::{Message, MessageClass, is_stun_message};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;
use webrtc::{
    Certificate, DecodeError, PeerConnection, PeerConnectionConfig, PeerConnectionError,
    PeerConnectionState, SdpType,
};

/// One browser host candidate: answers checks while `answering` is set and
/// collects everything else it receives.
struct BrowserSocket {
    socket: Arc<UdpSocket>,
    media: mpsc::UnboundedReceiver<Vec<u8>>,
}

struct Browser {
    credentials: IceCredentials,
    sockets: Vec<BrowserSocket>,
    answering: Arc<AtomicBool>,
}

impl Browser {
    async fn new(candidates: usize) -> Self {
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

    fn offer(&self) -> String {
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

    fn candidates(&self) -> Vec<String> {
        self.sockets
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let port = s.socket.local_addr().unwrap().port();
                format!("candidate:{} 1 udp 2122260223 127.0.0.1 {} typ host", i + 1, port)
            })
            .collect()
    }

    fn socket_for(&mut self, addr: SocketAddr) -> &mut BrowserSocket {
        self.sockets
            .iter_mut()
            .find(|s| s.socket.local_addr().unwrap() == addr)
            .unwrap()
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

fn config() -> PeerConnectionConfig {
    PeerConnectionConfig {
        host_addresses: vec![IpAddr::V4(Ipv4Addr::LOCALHOST); 2],
        agent: IceAgentConfig {
            check_timeout: Duration::from_millis(300),
            check_retries: 1,
            keepalive_interval: Duration::from_millis(100),
            liveness_failure_threshold: 5,
            recovery_window: Duration::from_secs(3),
            ..IceAgentConfig::default()
        },
        ..PeerConnectionConfig::loopback()
    }
}

async fn connection(config: PeerConnectionConfig) -> PeerConnection {
    let certificate = Arc::new(Certificate::generate().unwrap());
    PeerConnection::new("sess_test", Arc::new(config), certificate)
        .await
        .unwrap()
}

async fn wait_for(connection: &PeerConnection, target: PeerConnectionState) {
    let mut states = connection.subscribe();
    timeout(Duration::from_secs(10), states.wait_for(|s| s.state == target))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {target}, at {}", connection.state()))
        .unwrap();
}

#[tokio::test]
async fn test_offer_trickle_connect_and_echo() {
    let mut browser = Browser::new(2).await;
    let pc = connection(config()).await;

    let answer = pc.accept_offer(&browser.offer()).await.unwrap();
    assert_eq!(answer.sdp_type, SdpType::Answer);
    assert_eq!(pc.state(), PeerConnectionState::Stable);

    let audio = &answer.media[0];
    assert_eq!(audio.formats, vec!["111", "0"]);
    assert_eq!(audio.candidates.len(), 2);
    assert!(audio.end_of_candidates);
    assert!(audio.fingerprint.is_some());
    // Everything gathered went out with the answer
    assert!(pc.take_local_candidates().await.unwrap().is_empty());

    pc.add_remote_candidates(&browser.candidates(), true).await.unwrap();
    wait_for(&pc, PeerConnectionState::Connected).await;
    // Let the remaining checks settle so the selection is final
    tokio::time::sleep(Duration::from_millis(500)).await;

    let selected = pc.snapshot().selected.expect("selected pair");
    let server_addr = selected.local.socket_addr();
    let browser_socket = browser.socket_for(selected.remote.socket_addr());

    let packets: Vec<Vec<u8>> = (0u8..3).map(|seq| vec![0x80, 0x6f, 0x00, seq, 0xde, 0xad]).collect();
    for packet in &packets {
        browser_socket.socket.send_to(packet, server_addr).await.unwrap();
    }
    for packet in &packets {
        let echoed = timeout(Duration::from_secs(2), browser_socket.media.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&echoed, packet);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stats = pc.stats();
    assert_eq!(stats.forwarded_packets, 3);
    assert_eq!(stats.forwarded_bytes, 18);

    pc.close().await;
    assert_eq!(pc.state(), PeerConnectionState::Closed);
}

#[tokio::test]
async fn test_liveness_loss_disconnects_then_fails() {
    let browser = Browser::new(1).await;
    let pc = connection(config()).await;

    pc.accept_offer(&browser.offer()).await.unwrap();
    pc.add_remote_candidates(&browser.candidates(), true).await.unwrap();
    wait_for(&pc, PeerConnectionState::Connected).await;

    browser.answering.store(false, Ordering::SeqCst);
    wait_for(&pc, PeerConnectionState::Disconnected).await;
    assert!(pc.snapshot().selected.is_none());
    wait_for(&pc, PeerConnectionState::Failed).await;

    let err = pc
        .add_remote_candidates(&browser.candidates(), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PeerConnectionError::InvalidTransition {
            state: PeerConnectionState::Failed,
            ..
        }
    ));
    pc.close().await;
}

#[tokio::test]
async fn test_close_cancels_in_flight_checks() {
    let mut config = config();
    config.agent.check_timeout = Duration::from_secs(30);
    let grace = config.cancellation_grace;

    let browser = Browser::new(1).await;
    browser.answering.store(false, Ordering::SeqCst);
    let pc = connection(config).await;

    pc.accept_offer(&browser.offer()).await.unwrap();
    pc.add_remote_candidates(&browser.candidates(), true).await.unwrap();
    wait_for(&pc, PeerConnectionState::Connecting).await;

    let started = Instant::now();
    pc.close().await;
    assert!(started.elapsed() < grace);
    assert_eq!(pc.state(), PeerConnectionState::Closed);

    let err = pc.create_answer().await.unwrap_err();
    assert!(matches!(
        err,
        PeerConnectionError::InvalidTransition {
            state: PeerConnectionState::Closed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_renegotiation_is_rejected() {
    let browser = Browser::new(1).await;
    let pc = connection(config()).await;

    pc.accept_offer(&browser.offer()).await.unwrap();
    let err = pc.accept_offer(&browser.offer()).await.unwrap_err();
    assert!(matches!(
        err,
        PeerConnectionError::InvalidTransition {
            state: PeerConnectionState::Stable,
            ..
        }
    ));
    assert_eq!(pc.state(), PeerConnectionState::Stable);
    pc.close().await;
}

#[tokio::test]
async fn test_bad_offers_leave_state_unchanged() {
    let pc = connection(config()).await;

    let err = pc.accept_offer("v=0\r\nnonsense\r\n").await.unwrap_err();
    assert!(matches!(err, PeerConnectionError::Decode(DecodeError::MalformedSyntax(_))));

    let video_only = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
                      m=video 9 UDP/TLS/RTP/SAVPF 96\r\na=rtpmap:96 VP8/90000\r\n";
    let err = pc.accept_offer(video_only).await.unwrap_err();
    assert!(matches!(err, PeerConnectionError::Decode(DecodeError::UnsupportedMedia)));

    assert_eq!(pc.state(), PeerConnectionState::New);
    assert!(matches!(
        pc.add_remote_candidates(&[], false).await,
        Err(PeerConnectionError::InvalidTransition { .. })
    ));
    pc.close().await;
}

#[tokio::test]
async fn test_local_offer_then_remote_answer() {
    let browser = Browser::new(1).await;
    let pc = connection(config()).await;

    let offer = pc.create_offer().await.unwrap();
    assert_eq!(offer.sdp_type, SdpType::Offer);
    assert_eq!(pc.state(), PeerConnectionState::HaveLocalOffer);

    let answer = browser.offer().replace("a=setup:actpass", "a=setup:active");
    pc.set_remote_description(SdpType::Answer, &answer).await.unwrap();
    assert_eq!(pc.state(), PeerConnectionState::Stable);
    pc.close().await;
}
