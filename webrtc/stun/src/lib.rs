//! STUN Module - Session Traversal Utilities for NAT
//!
//! Implementation of STUN as per RFC 5389: message codec, short- and
//! long-term credential integrity, fingerprinting, and an async
//! transaction layer that shares its socket with ICE and media traffic.

mod attribute_type;
mod client;
mod errors;
mod integrity;
mod message;
mod message_builder;
mod message_header;
mod message_type;
mod transaction;
pub mod xor_mapped_address;

pub use attribute_type::AttributeType;
pub use client::{StunClient, resolve_server};
pub use errors::StunError;
pub use integrity::{crc32, hmac_sha1};
pub use message::{Attributes, Message, RawAttribute};
pub use message_builder::{MessageBuilder, random_transaction_id};
pub use message_header::{MAGIC_COOKIE, MessageHeader, TransactionId, is_stun_message};
pub use message_type::{METHOD_BINDING, MessageClass, MessageType};
pub use transaction::{INITIAL_RTO, Response, TransactionMap};
