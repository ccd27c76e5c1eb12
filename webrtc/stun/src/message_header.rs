//! STUN message header
//!
//! The header is a fixed 20-byte structure that precedes all STUN message bodies.
//!
//! # Header Format (RFC 5389 Section 6)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |0 0|     STUN Message Type     |         Message Length        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Magic Cookie                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Transaction ID (96 bits)                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::errors::StunError;
use crate::message_type::MessageType;

/// Magic cookie value defined in RFC 5389.
pub const MAGIC_COOKIE: u32 = 0x2112A442;

/// A STUN transaction identifier.
pub type TransactionId = [u8; 12];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_type: MessageType,
    /// Length of the message body (excluding the header)
    pub message_length: u16,
    pub transaction_id: TransactionId,
}

impl MessageHeader {
    /// Size of the STUN message header in bytes.
    pub const SIZE: usize = 20;

    pub fn new(message_type: MessageType, transaction_id: TransactionId) -> Self {
        Self {
            message_type,
            message_length: 0,
            transaction_id,
        }
    }

    /// Encodes the header with an explicit length field.
    ///
    /// MESSAGE-INTEGRITY and FINGERPRINT are computed over a header whose
    /// length already accounts for the attribute being added.
    pub(crate) fn encode_with_length(&self, message_length: u16) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..2].copy_from_slice(&self.message_type.to_u16().to_be_bytes());
        bytes[2..4].copy_from_slice(&message_length.to_be_bytes());
        bytes[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        bytes[8..20].copy_from_slice(&self.transaction_id);
        bytes
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        self.encode_with_length(self.message_length)
    }

    /// Decodes a header from bytes.
    ///
    /// # Returns
    /// * `Err(StunError::MessageTooShort)` - Fewer than 20 bytes
    /// * `Err(StunError::InvalidMessageType)` - Top two bits set
    /// * `Err(StunError::InvalidMagicCookie)` - Cookie mismatch
    pub fn decode(bytes: &[u8]) -> Result<Self, StunError> {
        if bytes.len() < Self::SIZE {
            return Err(StunError::MessageTooShort);
        }

        let message_type = MessageType::from_u16(u16::from_be_bytes([bytes[0], bytes[1]]))?;
        let message_length = u16::from_be_bytes([bytes[2], bytes[3]]);

        let magic = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if magic != MAGIC_COOKIE {
            return Err(StunError::InvalidMagicCookie);
        }
        if message_length % 4 != 0 {
            return Err(StunError::InvalidAttributeFormat);
        }

        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&bytes[8..20]);

        Ok(Self {
            message_type,
            message_length,
            transaction_id,
        })
    }

    pub fn set_message_length(&mut self, length: u16) {
        self.message_length = length;
    }
}

/// Returns true if a datagram looks like a STUN message.
///
/// The first two bits must be zero and the magic cookie must match. Used to
/// demultiplex STUN from media on a shared socket.
pub fn is_stun_message(data: &[u8]) -> bool {
    if data.len() < MessageHeader::SIZE || data[0] & 0xC0 != 0 {
        return false;
    }
    u32::from_be_bytes([data[4], data[5], data[6], data[7]]) == MAGIC_COOKIE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_header_encode_decode() {
        let transaction_id = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        let header = MessageHeader::new(MessageType::binding_request(), transaction_id);

        let encoded = header.encode();
        let decoded = MessageHeader::decode(&encoded).unwrap();
        assert_eq!(decoded.message_type, MessageType::binding_request());
        assert_eq!(decoded.transaction_id, transaction_id);
        assert_eq!(decoded.message_length, 0);
    }

    #[test]
    fn test_message_header_decode_invalid_magic_cookie() {
        let mut bytes = [0u8; 20];
        bytes[1] = 0x01;
        bytes[4..8].copy_from_slice(&[0xFF; 4]);

        let result = MessageHeader::decode(&bytes);
        assert!(matches!(result, Err(StunError::InvalidMagicCookie)));
    }

    #[test]
    fn test_message_header_decode_too_short() {
        let result = MessageHeader::decode(&[0u8; 10]);
        assert!(matches!(result, Err(StunError::MessageTooShort)));
    }

    #[test]
    fn test_is_stun_message_rejects_rtp() {
        // RTP version 2 sets the top bits of the first byte
        let mut rtp = vec![0x80, 0x6F, 0x00, 0x01];
        rtp.extend_from_slice(&[0u8; 28]);
        assert!(!is_stun_message(&rtp));

        let header = MessageHeader::new(MessageType::binding_request(), [7; 12]);
        assert!(is_stun_message(&header.encode()));
    }
}
