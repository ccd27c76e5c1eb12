//! Structured logging set-up on top of `tracing-subscriber`.
//!
//! ```no_run
//! use logging::{LoggingConfig, init};
//!
//! init(&LoggingConfig::default()).expect("logging");
//! tracing::info!("Application started");
//! ```

mod config;
pub mod error;
mod log_level;
mod logger;

pub use config::LoggingConfig;
pub use error::{LoggingError, Result};
pub use log_level::LogLevel;
pub use logger::{build_subscriber, init};
