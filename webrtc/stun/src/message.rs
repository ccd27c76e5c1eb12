//! STUN message structure
//!
//! A STUN message consists of a 20-byte header followed by zero or more
//! attributes. Attributes are kept in their encoded form so that integrity
//! and fingerprint checks can be computed over the exact received bytes.

use std::net::SocketAddr;

use crate::attribute_type::AttributeType;
use crate::errors::StunError;
use crate::integrity::{
    FINGERPRINT_ATTRIBUTE_SIZE, FINGERPRINT_XOR, INTEGRITY_ATTRIBUTE_SIZE, crc32, hmac_sha1,
};
use crate::message_header::{MessageHeader, TransactionId};
use crate::message_type::MessageType;
use crate::xor_mapped_address;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    /// Encoded attributes (type-length-value format, padded)
    pub attributes: Vec<u8>,
}

/// A decoded view of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAttribute<'a> {
    pub attr_type: u16,
    pub value: &'a [u8],
    /// Offset of the TLV header inside the attribute area
    pub offset: usize,
}

/// Iterator over the attributes of a message.
pub struct Attributes<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Attributes<'a> {
    type Item = RawAttribute<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = self.bytes.get(self.offset..self.offset + 4)?;
        let attr_type = u16::from_be_bytes([header[0], header[1]]);
        let length = u16::from_be_bytes([header[2], header[3]]) as usize;
        let start = self.offset + 4;
        let value = self.bytes.get(start..start + length)?;

        let attribute = RawAttribute {
            attr_type,
            value,
            offset: self.offset,
        };
        self.offset = start + length + padding(length);
        Some(attribute)
    }
}

fn padding(length: usize) -> usize {
    (4 - (length % 4)) % 4
}

impl Message {
    pub fn new(message_type: MessageType, transaction_id: TransactionId) -> Self {
        Self {
            header: MessageHeader::new(message_type, transaction_id),
            attributes: Vec::new(),
        }
    }

    /// Adds an attribute to the message.
    ///
    /// Attributes are padded to 4-byte boundaries as required by RFC 5389.
    pub fn add_attribute(&mut self, attr_type: impl Into<u16>, value: &[u8]) {
        let pad = padding(value.len());
        self.attributes.reserve(4 + value.len() + pad);

        self.attributes
            .extend_from_slice(&attr_type.into().to_be_bytes());
        self.attributes
            .extend_from_slice(&(value.len() as u16).to_be_bytes());
        self.attributes.extend_from_slice(value);
        self.attributes.resize(self.attributes.len() + pad, 0);

        self.header.set_message_length(self.attributes.len() as u16);
    }

    /// Adds an XOR-encoded address attribute (XOR-MAPPED-ADDRESS and the
    /// TURN XOR-PEER/RELAYED-ADDRESS variants).
    pub fn add_xor_address(&mut self, attr_type: impl Into<u16>, addr: SocketAddr) {
        let value = xor_mapped_address::encode(addr, &self.header.transaction_id);
        self.add_attribute(attr_type, &value);
    }

    /// Adds an ERROR-CODE attribute.
    pub fn add_error_code(&mut self, code: u16, reason: &str) {
        let mut value = vec![0, 0, (code / 100) as u8, (code % 100) as u8];
        value.extend_from_slice(reason.as_bytes());
        self.add_attribute(AttributeType::ErrorCode, &value);
    }

    /// Appends MESSAGE-INTEGRITY keyed with `key`.
    ///
    /// Must be added after every attribute it protects; only FINGERPRINT may
    /// follow it.
    pub fn add_message_integrity(&mut self, key: &[u8]) {
        let length = (self.attributes.len() + INTEGRITY_ATTRIBUTE_SIZE) as u16;
        let header = self.header.encode_with_length(length);
        let digest = hmac_sha1(key, &[&header, &self.attributes]);
        self.add_attribute(AttributeType::MessageIntegrity, &digest);
    }

    /// Appends FINGERPRINT. Must be the last attribute.
    pub fn add_fingerprint(&mut self) {
        let length = (self.attributes.len() + FINGERPRINT_ATTRIBUTE_SIZE) as u16;
        let header = self.header.encode_with_length(length);
        let crc = crc32(&[&header, &self.attributes]) ^ FINGERPRINT_XOR;
        self.add_attribute(AttributeType::Fingerprint, &crc.to_be_bytes());
    }

    /// Verifies MESSAGE-INTEGRITY against `key`.
    ///
    /// # Returns
    /// * `Err(StunError::MissingAttribute)` - No MESSAGE-INTEGRITY present
    /// * `Err(StunError::IntegrityMismatch)` - Digest does not match
    pub fn verify_message_integrity(&self, key: &[u8]) -> Result<(), StunError> {
        let attribute = self
            .iter_attributes()
            .find(|a| a.attr_type == AttributeType::MessageIntegrity.to_u16())
            .ok_or(StunError::MissingAttribute(
                AttributeType::MessageIntegrity.to_u16(),
            ))?;

        let covered = &self.attributes[..attribute.offset];
        let length = (attribute.offset + INTEGRITY_ATTRIBUTE_SIZE) as u16;
        let header = self.header.encode_with_length(length);
        let digest = hmac_sha1(key, &[&header, covered]);

        if digest.as_slice() == attribute.value {
            Ok(())
        } else {
            Err(StunError::IntegrityMismatch)
        }
    }

    /// Verifies FINGERPRINT if present. A message without one passes.
    pub fn verify_fingerprint(&self) -> Result<(), StunError> {
        let Some(attribute) = self
            .iter_attributes()
            .find(|a| a.attr_type == AttributeType::Fingerprint.to_u16())
        else {
            return Ok(());
        };
        if attribute.value.len() != 4 {
            return Err(StunError::InvalidAttributeFormat);
        }

        let covered = &self.attributes[..attribute.offset];
        let length = (attribute.offset + FINGERPRINT_ATTRIBUTE_SIZE) as u16;
        let header = self.header.encode_with_length(length);
        let expected = crc32(&[&header, covered]) ^ FINGERPRINT_XOR;

        let received = u32::from_be_bytes([
            attribute.value[0],
            attribute.value[1],
            attribute.value[2],
            attribute.value[3],
        ]);
        if received == expected {
            Ok(())
        } else {
            Err(StunError::FingerprintMismatch)
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MessageHeader::SIZE + self.attributes.len());
        bytes.extend_from_slice(&self.header.encode());
        bytes.extend_from_slice(&self.attributes);
        bytes
    }

    /// Decodes a message from bytes.
    ///
    /// Trailing bytes beyond the header's length field are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, StunError> {
        let header = MessageHeader::decode(bytes)?;

        let total_len = MessageHeader::SIZE + header.message_length as usize;
        if bytes.len() < total_len {
            return Err(StunError::MessageTooShort);
        }

        let message = Self {
            header,
            attributes: bytes[MessageHeader::SIZE..total_len].to_vec(),
        };

        // Every TLV must fit inside the declared length
        let consumed = message
            .iter_attributes()
            .last()
            .map(|a| a.offset + 4 + a.value.len() + padding(a.value.len()))
            .unwrap_or(0);
        if consumed != message.attributes.len() {
            return Err(StunError::InvalidAttributeFormat);
        }

        Ok(message)
    }

    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.header.transaction_id
    }

    pub fn iter_attributes(&self) -> Attributes<'_> {
        Attributes {
            bytes: &self.attributes,
            offset: 0,
        }
    }

    /// Returns the value of the first attribute of the given type.
    pub fn get_attribute(&self, attr_type: impl Into<u16>) -> Option<&[u8]> {
        let attr_type = attr_type.into();
        self.iter_attributes()
            .find(|a| a.attr_type == attr_type)
            .map(|a| a.value)
    }

    pub fn has_attribute(&self, attr_type: impl Into<u16>) -> bool {
        self.get_attribute(attr_type).is_some()
    }

    /// Returns a UTF-8 attribute value (USERNAME, REALM, NONCE, SOFTWARE).
    pub fn get_string(&self, attr_type: impl Into<u16>) -> Option<String> {
        self.get_attribute(attr_type)
            .and_then(|v| std::str::from_utf8(v).ok())
            .map(str::to_string)
    }

    /// Returns a big-endian u32 attribute value (PRIORITY, LIFETIME).
    pub fn get_u32(&self, attr_type: impl Into<u16>) -> Option<u32> {
        let value = self.get_attribute(attr_type)?;
        let bytes: [u8; 4] = value.get(..4)?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    /// Returns a big-endian u64 attribute value (ICE-CONTROLLED/CONTROLLING).
    pub fn get_u64(&self, attr_type: impl Into<u16>) -> Option<u64> {
        let value = self.get_attribute(attr_type)?;
        let bytes: [u8; 8] = value.get(..8)?.try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }

    /// Decodes an XOR-encoded address attribute.
    pub fn get_xor_address(&self, attr_type: impl Into<u16>) -> Option<SocketAddr> {
        let value = self.get_attribute(attr_type)?;
        xor_mapped_address::decode(value, &self.header.transaction_id)
    }

    /// Returns the reflexive address, preferring XOR-MAPPED-ADDRESS over the
    /// legacy MAPPED-ADDRESS.
    pub fn mapped_address(&self) -> Option<SocketAddr> {
        self.get_xor_address(AttributeType::XorMappedAddress)
            .or_else(|| self.legacy_mapped_address())
    }

    fn legacy_mapped_address(&self) -> Option<SocketAddr> {
        let value = self.get_attribute(AttributeType::MappedAddress)?;
        let port = u16::from_be_bytes([*value.get(2)?, *value.get(3)?]);
        match value.get(1)? {
            0x01 => {
                let octets: [u8; 4] = value.get(4..8)?.try_into().ok()?;
                Some(SocketAddr::from((octets, port)))
            }
            0x02 => {
                let octets: [u8; 16] = value.get(4..20)?.try_into().ok()?;
                Some(SocketAddr::from((octets, port)))
            }
            _ => None,
        }
    }

    /// Returns the ERROR-CODE as (code, reason phrase).
    pub fn error_code(&self) -> Option<(u16, String)> {
        let value = self.get_attribute(AttributeType::ErrorCode)?;
        if value.len() < 4 {
            return None;
        }
        let code = (value[2] & 0x07) as u16 * 100 + value[3] as u16;
        let reason = String::from_utf8_lossy(&value[4..]).into_owned();
        Some((code, reason))
    }
}
