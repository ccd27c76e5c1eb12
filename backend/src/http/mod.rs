//! HTTP signaling transport

pub mod error;
pub mod handlers;
pub mod messages;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, router, serve, shutdown_signal};
