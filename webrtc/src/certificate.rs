//! Transport certificate identity
//!
//! A self-signed certificate is generated once at start-up; answers
//! advertise its SHA-256 fingerprint.

use rcgen::generate_simple_self_signed;
use sdp::Fingerprint;
use sha2::{Digest, Sha256};

use crate::errors::PeerConnectionError;

/// Fingerprint hash function advertised in answers
pub const FINGERPRINT_ALGORITHM: &str = "sha-256";

#[derive(Debug, Clone)]
pub struct Certificate {
    der: Vec<u8>,
    fingerprint: Fingerprint,
}

impl Certificate {
    /// Generates a fresh self-signed certificate.
    pub fn generate() -> Result<Self, PeerConnectionError> {
        let certified = generate_simple_self_signed(vec!["webrtc-echo".to_string()])
            .map_err(|e| PeerConnectionError::Certificate(e.to_string()))?;
        Ok(Self::from_der(certified.cert.der().to_vec()))
    }

    pub fn from_der(der: Vec<u8>) -> Self {
        let fingerprint = Fingerprint::new(FINGERPRINT_ALGORITHM, sha256_fingerprint(&der));
        Self { der, fingerprint }
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

/// Uppercase colon-separated hex digest (RFC 8122 Section 5).
fn sha256_fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}
