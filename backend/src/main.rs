use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use echo_server::SignalingUseCase;
use echo_server::config::EchoServerConfig;
use echo_server::http::{self, AppState};
use echo_server::infrastructure::{SessionRegistry, spawn_sweeper};
use tokio::net::TcpListener;
use tracing::info;
use webrtc::Certificate;

/// WebRTC audio echo server
#[derive(Debug, Parser)]
#[command(name = "echo-server", version, about)]
struct Cli {
    /// JSON configuration file (defaults to server_config.json lookup)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP port, overriding configuration and PORT
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, source) =
        EchoServerConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    logging::init(&config.logging).context("failed to initialise logging")?;
    info!(%source, "Configuration loaded");

    let peer_config = config
        .peer_connection_config()
        .context("invalid ICE server configuration")?;
    info!(
        servers = peer_config.gatherer.servers.len(),
        host_addresses = ?peer_config.host_addresses,
        max_sessions = config.sessions.max_sessions,
        "Echo server starting"
    );

    let certificate = Certificate::generate().context("failed to generate certificate")?;
    info!(fingerprint = %certificate.fingerprint(), "Transport certificate generated");

    let registry = SessionRegistry::new(
        Arc::new(peer_config),
        Arc::new(certificate),
        (&config.sessions).into(),
    );
    let sweeper = spawn_sweeper(registry.clone(), config.sessions.sweep_interval());

    let bind_addr = config.server.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    let state = AppState::new(SignalingUseCase::new(registry));
    http::serve(
        listener,
        state,
        config.server.request_timeout(),
        http::shutdown_signal(),
    )
    .await
    .context("HTTP server error")?;

    sweeper.abort();
    info!("Echo server stopped");
    Ok(())
}
