//! TURN Module - Traversal Using Relays around NAT
//!
//! Async TURN client (RFC 5766) over UDP: allocation with long-term
//! credentials, refresh, permissions and Send/Data indications.

pub mod client;
pub mod credentials;
pub mod errors;
pub mod turn_attribute_type;

pub use client::{Allocation, DataIndication, TurnClient};
pub use credentials::Credentials;
pub use errors::{Result, TurnError};
pub use turn_attribute_type::{TransportProtocol, TurnAttributeType, TurnMethod};
