//! Connectivity state of an ICE agent.

use std::fmt;

/// ```text
/// New -> Checking -> Connected <-> Disconnected
///           |                          |
///           +--------> Failed <--------+
/// ```
/// Any state may move to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    New,
    Checking,
    Connected,
    /// The selected pair stopped answering; remaining pairs are re-checked
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }

    /// Failed and Closed accept no further input.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
