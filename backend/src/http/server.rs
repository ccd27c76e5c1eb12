//! HTTP signaling server.

use std::future::Future;
use std::io;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::application::usecases::SignalingUseCase;
use crate::http::handlers;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub signaling: SignalingUseCase,
}

impl AppState {
    pub fn new(signaling: SignalingUseCase) -> Self {
        Self { signaling }
    }
}

/// Builds the signaling router.
///
/// # Routes
/// - `POST /offer` - Create a session and answer its offer
/// - `POST /sessions/{id}/candidates` - Trickle candidates both ways
/// - `GET /sessions/{id}` - Session state, selected pair and echo counters
/// - `DELETE /sessions/{id}` - Close a session
/// - `GET /health` - Liveness and live session count
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/offer", post(handlers::offer))
        .route(
            "/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/{id}/candidates", post(handlers::candidates))
        .route("/health", get(handlers::health))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until `shutdown` resolves, then closes every live session.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    request_timeout: Duration,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> io::Result<()> {
    let signaling = state.signaling.clone();
    info!(addr = %listener.local_addr()?, "HTTP signaling server listening");

    axum::serve(listener, router(state, request_timeout))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!(
        sessions = signaling.live_sessions(),
        "HTTP server stopped, closing sessions"
    );
    signaling.shutdown().await;
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
