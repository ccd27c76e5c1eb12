//! Server configuration

pub mod echo_server_config;
pub mod ice_config;
pub mod server_config;
pub mod sessions_config;

pub use echo_server_config::{ConfigSource, EchoServerConfig};
pub use ice_config::{IceConfig, IceServerConfig};
pub use logging::LoggingConfig;
pub use server_config::ServerConfig;
pub use sessions_config::SessionsConfig;
