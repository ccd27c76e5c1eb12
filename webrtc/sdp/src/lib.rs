//! SDP Module - Session Description Protocol
//!
//! Typed offer/answer codec for WebRTC (RFC 4566, RFC 8839, RFC 8122):
//! parsing, capability checking and deterministic serialization.

pub mod attribute;
pub mod codec;
pub mod connection;
pub mod errors;
pub mod media_description;
pub mod origin;
pub mod sdp_codec;
pub mod sdp_type;
pub mod session_description;
pub mod session_description_builder;
pub mod timing;

pub use attribute::{Attribute, Direction, Fingerprint, Setup};
pub use codec::{Codec, CodecCapability};
pub use connection::{AddressType, Connection};
pub use errors::DecodeError;
pub use media_description::MediaDescription;
pub use origin::Origin;
pub use sdp_codec::SdpCodec;
pub use sdp_type::SdpType;
pub use session_description::SessionDescription;
pub use session_description_builder::SessionDescriptionBuilder;
pub use timing::Timing;
