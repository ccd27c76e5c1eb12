//! XOR-MAPPED-ADDRESS attribute encoding and decoding
//!
//! The address is XOR'd with the magic cookie (and, for IPv6, the
//! transaction ID) so that NATs rewriting payload addresses leave it
//! untouched. TURN reuses the same layout for XOR-PEER-ADDRESS and
//! XOR-RELAYED-ADDRESS.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::message_header::{MAGIC_COOKIE, TransactionId};

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

fn xor_mask(transaction_id: &TransactionId) -> [u8; 16] {
    let mut mask = [0u8; 16];
    mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    mask[4..].copy_from_slice(transaction_id);
    mask
}

/// Encodes a socket address as an XOR-MAPPED-ADDRESS value.
pub fn encode(addr: SocketAddr, transaction_id: &TransactionId) -> Vec<u8> {
    let mask = xor_mask(transaction_id);
    let port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;

    let mut value = Vec::with_capacity(20);
    value.push(0);
    match addr.ip() {
        IpAddr::V4(ip) => {
            value.push(FAMILY_IPV4);
            value.extend_from_slice(&port.to_be_bytes());
            value.extend(ip.octets().iter().zip(&mask[..4]).map(|(b, m)| b ^ m));
        }
        IpAddr::V6(ip) => {
            value.push(FAMILY_IPV6);
            value.extend_from_slice(&port.to_be_bytes());
            value.extend(ip.octets().iter().zip(&mask).map(|(b, m)| b ^ m));
        }
    }
    value
}

/// Decodes an XOR-MAPPED-ADDRESS attribute value.
///
/// # Returns
/// * `Some(SocketAddr)` - If decoding succeeds
/// * `None` - If the family is unknown or the value is truncated
pub fn decode(bytes: &[u8], transaction_id: &TransactionId) -> Option<SocketAddr> {
    if bytes.len() < 4 {
        return None;
    }

    let mask = xor_mask(transaction_id);
    let port = u16::from_be_bytes([bytes[2], bytes[3]]) ^ (MAGIC_COOKIE >> 16) as u16;

    match bytes[1] {
        FAMILY_IPV4 => {
            let raw = bytes.get(4..8)?;
            let mut octets = [0u8; 4];
            for (i, octet) in octets.iter_mut().enumerate() {
                *octet = raw[i] ^ mask[i];
            }
            Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port))
        }
        FAMILY_IPV6 => {
            let raw = bytes.get(4..20)?;
            let mut octets = [0u8; 16];
            for (i, octet) in octets.iter_mut().enumerate() {
                *octet = raw[i] ^ mask[i];
            }
            Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ipv4() {
        // 192.168.1.100:8080 with transaction_id = [1..=12]
        let transaction_id = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        let encoded = vec![
            0x00, // Reserved
            0x01, // Family IPv4
            0x3E, 0x82, // 8080 ^ 0x2112
            0xE1, 0xBA, 0xA5, 0x26, // 192.168.1.100 ^ 0x2112A442
        ];

        let decoded = decode(&encoded, &transaction_id);
        let expected = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)), 8080);
        assert_eq!(Some(expected), decoded);
        assert_eq!(encode(expected, &transaction_id), encoded);
    }

    #[test]
    fn test_ipv6_uses_transaction_id() {
        let addr: SocketAddr = "[2001:db8::1]:8080".parse().unwrap();
        let a = encode(addr, &[1; 12]);
        let b = encode(addr, &[2; 12]);
        assert_ne!(a, b);
        assert_eq!(decode(&a, &[1; 12]), Some(addr));
        assert_eq!(decode(&b, &[2; 12]), Some(addr));
    }

    #[test]
    fn test_decode_invalid_family() {
        let bytes = vec![0x00, 0xFF, 0x1F, 0x90, 192, 168, 1, 100];
        assert_eq!(None, decode(&bytes, &[0; 12]));
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(None, decode(&[0x00, 0x01, 0x3E, 0x82, 0xE1], &[0; 12]));
    }
}
