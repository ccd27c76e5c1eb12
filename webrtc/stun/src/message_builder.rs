//! STUN message builder
//!
//! Fluent API for constructing STUN messages. Integrity and fingerprint
//! are applied last, in that order, regardless of call order.

use std::net::SocketAddr;

use rand::RngCore;

use crate::attribute_type::AttributeType;
use crate::errors::StunError;
use crate::message::Message;
use crate::message_header::TransactionId;
use crate::message_type::MessageType;

/// Builder for constructing STUN messages.
///
/// # Example
///
/// ```
/// use stun::{AttributeType, MessageBuilder, MessageType};
///
/// let request = MessageBuilder::new(MessageType::binding_request())
///     .random_transaction_id()
///     .attribute(AttributeType::Username, b"remote:local")
///     .message_integrity(b"remote-password")
///     .fingerprint()
///     .build()
///     .unwrap();
/// assert!(request.verify_message_integrity(b"remote-password").is_ok());
/// ```
pub struct MessageBuilder {
    message_type: MessageType,
    transaction_id: Option<TransactionId>,
    attributes: Vec<(u16, Vec<u8>)>,
    xor_addresses: Vec<(u16, SocketAddr)>,
    integrity_key: Option<Vec<u8>>,
    fingerprint: bool,
}

impl MessageBuilder {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            transaction_id: None,
            attributes: Vec::new(),
            xor_addresses: Vec::new(),
            integrity_key: None,
            fingerprint: false,
        }
    }

    /// Generates a random 96-bit transaction ID.
    pub fn random_transaction_id(mut self) -> Self {
        self.transaction_id = Some(random_transaction_id());
        self
    }

    /// Uses an explicit transaction ID (responses echo the request's).
    pub fn transaction_id(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn attribute(mut self, attr_type: impl Into<u16>, value: &[u8]) -> Self {
        self.attributes.push((attr_type.into(), value.to_vec()));
        self
    }

    pub fn username(self, username: &str) -> Self {
        self.attribute(AttributeType::Username, username.as_bytes())
    }

    pub fn xor_address(mut self, attr_type: impl Into<u16>, addr: SocketAddr) -> Self {
        self.xor_addresses.push((attr_type.into(), addr));
        self
    }

    /// Requests MESSAGE-INTEGRITY keyed with `key` (short-term: the password,
    /// long-term: MD5 of username:realm:password).
    pub fn message_integrity(mut self, key: &[u8]) -> Self {
        self.integrity_key = Some(key.to_vec());
        self
    }

    pub fn fingerprint(mut self) -> Self {
        self.fingerprint = true;
        self
    }

    /// Builds the STUN message.
    ///
    /// # Returns
    /// * `Err(StunError::MissingRequiredField)` - If no transaction ID was set
    pub fn build(self) -> Result<Message, StunError> {
        let transaction_id = self
            .transaction_id
            .ok_or(StunError::MissingRequiredField("transaction_id"))?;

        let mut message = Message::new(self.message_type, transaction_id);
        for (attr_type, value) in &self.attributes {
            message.add_attribute(*attr_type, value);
        }
        for (attr_type, addr) in &self.xor_addresses {
            message.add_xor_address(*attr_type, *addr);
        }
        if let Some(key) = &self.integrity_key {
            message.add_message_integrity(key);
        }
        if self.fingerprint {
            message.add_fingerprint();
        }

        Ok(message)
    }
}

/// Returns a fresh random transaction ID.
pub fn random_transaction_id() -> TransactionId {
    let mut id = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut id);
    id
}
