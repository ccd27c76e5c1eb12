//! Candidate types (RFC 8445 Section 5.1.1) and their type preferences.

use std::fmt;
use std::str::FromStr;

use crate::errors::IceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CandidateType {
    /// Bound on a local interface
    #[default]
    Host,
    /// Mapped address learned from a STUN server
    Srflx,
    /// Allocated on a TURN server
    Relay,
    /// Learned from the source of an incoming check
    Prflx,
}

impl CandidateType {
    pub const ALL: [CandidateType; 4] = [
        CandidateType::Host,
        CandidateType::Srflx,
        CandidateType::Relay,
        CandidateType::Prflx,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CandidateType::Host => "host",
            CandidateType::Srflx => "srflx",
            CandidateType::Relay => "relay",
            CandidateType::Prflx => "prflx",
        }
    }

    /// Recommended type preference (RFC 8445 Section 5.1.2.2).
    pub fn type_preference(self) -> u32 {
        match self {
            CandidateType::Host => 126,
            CandidateType::Prflx => 110,
            CandidateType::Srflx => 100,
            CandidateType::Relay => 0,
        }
    }
}

impl FromStr for CandidateType {
    type Err = IceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CandidateType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| IceError::InvalidCandidateType(s.to_string()))
    }
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
