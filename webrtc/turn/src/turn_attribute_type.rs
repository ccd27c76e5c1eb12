//! TURN-specific attributes and methods.
//!
//! TURN extends STUN with relay methods and attributes (RFC 5766).

use stun::{MessageClass, MessageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnAttributeType {
    /// CHANNEL-NUMBER: 0x000C
    ChannelNumber = 0x000C,
    /// LIFETIME: 0x000D, allocation lifetime in seconds
    Lifetime = 0x000D,
    /// XOR-PEER-ADDRESS: 0x0012
    XorPeerAddress = 0x0012,
    /// DATA: 0x0013, relayed application data
    Data = 0x0013,
    /// XOR-RELAYED-ADDRESS: 0x0016
    XorRelayedAddress = 0x0016,
    /// REQUESTED-TRANSPORT: 0x0019
    RequestedTransport = 0x0019,
    /// DONT-FRAGMENT: 0x001A
    DontFragment = 0x001A,
}

impl From<TurnAttributeType> for u16 {
    fn from(value: TurnAttributeType) -> Self {
        value as u16
    }
}

/// Transport protocol numbers for REQUESTED-TRANSPORT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProtocol {
    Udp = 17,
    Tcp = 6,
}

impl TransportProtocol {
    /// Encodes the REQUESTED-TRANSPORT value: protocol byte plus RFFU.
    pub fn requested_transport_value(self) -> [u8; 4] {
        [self as u8, 0, 0, 0]
    }
}

/// TURN methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnMethod {
    Allocate,
    Refresh,
    Send,
    Data,
    CreatePermission,
    ChannelBind,
}

impl TurnMethod {
    pub fn code(self) -> u16 {
        match self {
            TurnMethod::Allocate => 0x003,
            TurnMethod::Refresh => 0x004,
            TurnMethod::Send => 0x006,
            TurnMethod::Data => 0x007,
            TurnMethod::CreatePermission => 0x008,
            TurnMethod::ChannelBind => 0x009,
        }
    }

    pub fn request(self) -> MessageType {
        MessageType::new(self.code(), MessageClass::Request)
    }

    pub fn indication(self) -> MessageType {
        MessageType::new(self.code(), MessageClass::Indication)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TurnMethod::Allocate => "Allocate",
            TurnMethod::Refresh => "Refresh",
            TurnMethod::Send => "Send",
            TurnMethod::Data => "Data",
            TurnMethod::CreatePermission => "CreatePermission",
            TurnMethod::ChannelBind => "ChannelBind",
        }
    }
}
