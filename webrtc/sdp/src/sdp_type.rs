//! SDP message type enumeration.
//!
//! Defines whether an SDP message is an offer or an answer. The type is
//! carried next to the SDP text by signaling (the JSON `type` field), never
//! inside it.

use serde::{Deserialize, Serialize};

/// Represents the type of SDP message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Represents an SDP offer from the initiator
    Offer,
    /// Represents an SDP answer from the receiver
    Answer,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

impl std::fmt::Display for SdpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
