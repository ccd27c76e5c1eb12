//! Echo server library
//!
//! Session registry, signaling use cases and the HTTP transport, exposed
//! for the binary and for integration tests.

pub mod application;
pub mod config;
pub mod domain;
pub mod http;
pub mod infrastructure;

pub use application::usecases::{SignalingError, SignalingUseCase};
pub use config::EchoServerConfig;
pub use domain::Session;
pub use infrastructure::{RegistryError, RegistryLimits, SessionRegistry};
