//! ICE candidates in their SDP attribute form (RFC 8839 Section 5.1).
//!
//! ```text
//! candidate:<foundation> <component-id> <transport> <priority>
//!           <connection-address> <port> typ <cand-type>
//!           [raddr <rel-addr>] [rport <rel-port>] *(<ext-name> <ext-value>)
//! ```

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::{candidate_type::CandidateType, errors::IceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub foundation: String,
    /// 1 for RTP, 2 for RTCP
    pub component_id: u32,
    /// Uppercased: "UDP" or "TCP"
    pub transport: String,
    pub priority: u32,
    pub address: IpAddr,
    pub port: u16,
    pub candidate_type: CandidateType,
    pub related_address: Option<IpAddr>,
    pub related_port: Option<u16>,
}

impl Candidate {
    /// Parses a candidate line.
    ///
    /// The bare value, `candidate:` and `a=candidate:` forms are all
    /// accepted. Unknown extension attributes (generation, ufrag,
    /// network-cost, tcptype...) are skipped.
    ///
    /// # Returns
    /// * `Ok(Candidate)` - Successfully parsed candidate
    /// * `Err(IceError::UnresolvedHostname)` - The address is a hostname (mDNS)
    /// * `Err(IceError)` - Any other malformed field
    pub fn parse(value: &str) -> Result<Self, IceError> {
        let value = value.trim();
        let value = value.strip_prefix("a=").unwrap_or(value);
        let value = value.strip_prefix("candidate:").unwrap_or(value);

        let mut tokens = value.split_whitespace();
        let mut next = || tokens.next().ok_or(IceError::InvalidCandidateFormat);

        let foundation = next()?.to_string();
        let component_id = next()?
            .parse()
            .map_err(|_| IceError::InvalidComponentId)?;
        let transport = next()?.to_ascii_uppercase();
        let priority = next()?.parse().map_err(|_| IceError::InvalidPriority)?;
        let address = parse_address(next()?)?;
        let port = next()?.parse().map_err(|_| IceError::InvalidPort)?;
        if next()? != "typ" {
            return Err(IceError::InvalidCandidateFormat);
        }
        let candidate_type = next()?.parse()?;

        let mut candidate = Candidate {
            foundation,
            component_id,
            transport,
            priority,
            address,
            port,
            candidate_type,
            related_address: None,
            related_port: None,
        };

        let rest: Vec<&str> = tokens.collect();
        for pair in rest.chunks(2) {
            match pair {
                ["raddr", addr] => {
                    candidate.related_address =
                        Some(addr.parse().map_err(|_| IceError::InvalidIpAddress)?);
                }
                ["rport", port] => {
                    candidate.related_port = Some(port.parse().map_err(|_| IceError::InvalidPort)?);
                }
                _ => {}
            }
        }

        candidate.validate()?;
        Ok(candidate)
    }

    pub fn validate(&self) -> Result<(), IceError> {
        if self.foundation.is_empty() {
            return Err(IceError::InvalidFoundation);
        }
        if !matches!(self.component_id, 1 | 2) {
            return Err(IceError::InvalidComponentId);
        }
        if !matches!(self.transport.as_str(), "UDP" | "TCP") {
            return Err(IceError::InvalidTransportProtocol);
        }
        if self.port == 0 {
            return Err(IceError::InvalidPort);
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// The base for srflx, the mapped address for relay.
    pub fn related_socket_addr(&self) -> Option<SocketAddr> {
        Some(SocketAddr::new(self.related_address?, self.related_port?))
    }

    pub fn is_udp(&self) -> bool {
        self.transport == "UDP"
    }

    /// `2^24 * type + 2^8 * local + (256 - component)` (RFC 8445 Section 5.1.2.1)
    pub fn calculate_priority(type_pref: u32, local_pref: u32, component_id: u32) -> u32 {
        (type_pref << 24) + (local_pref << 8) + (256 - component_id)
    }

    pub fn local_preference(&self) -> u32 {
        (self.priority >> 8) & 0xFFFF
    }

    /// PRIORITY sent in checks from this candidate: the same local
    /// preference under the peer-reflexive type preference.
    pub fn peer_reflexive_priority(&self) -> u32 {
        Self::calculate_priority(
            CandidateType::Prflx.type_preference(),
            self.local_preference(),
            self.component_id,
        )
    }
}

impl FromStr for Candidate {
    type Err = IceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Candidate::parse(s)
    }
}

fn parse_address(token: &str) -> Result<IpAddr, IceError> {
    token.parse().map_err(|_| {
        if is_hostname(token) {
            IceError::UnresolvedHostname(token.to_string())
        } else {
            IceError::InvalidIpAddress
        }
    })
}

/// Browsers hide host IPs behind random `<uuid>.local` mDNS names.
fn is_hostname(address: &str) -> bool {
    address.ends_with(".local")
        || (address.contains('.')
            && address
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            && address.chars().any(|c| c.is_ascii_alphabetic()))
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "candidate:{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component_id,
            self.transport,
            self.priority,
            self.address,
            self.port,
            self.candidate_type
        )?;
        if let Some(raddr) = self.related_address {
            write!(f, " raddr {raddr}")?;
        }
        if let Some(rport) = self.related_port {
            write!(f, " rport {rport}")?;
        }
        Ok(())
    }
}
