//! STUN message types
//!
//! A STUN message type packs a 12-bit method and a 2-bit class into the
//! 14 low bits of the first header word (RFC 5389 Section 6):
//!
//! ```text
//!  0                 1
//!  2  3  4 5 6 7 8 9 0 1 2 3 4 5
//! +--+--+-+-+-+-+-+-+-+-+-+-+-+-+
//! |M |M |M|M|M|C|M|M|M|C|M|M|M|M|
//! |11|10|9|8|7|1|6|5|4|0|3|2|1|0|
//! +--+--+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::errors::StunError;

/// Binding method (RFC 5389).
pub const METHOD_BINDING: u16 = 0x001;

/// Message class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

impl MessageClass {
    fn bits(self) -> u16 {
        match self {
            MessageClass::Request => 0b00,
            MessageClass::Indication => 0b01,
            MessageClass::SuccessResponse => 0b10,
            MessageClass::ErrorResponse => 0b11,
        }
    }

    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0b00 => MessageClass::Request,
            0b01 => MessageClass::Indication,
            0b10 => MessageClass::SuccessResponse,
            _ => MessageClass::ErrorResponse,
        }
    }

    /// Returns true for success and error responses.
    pub fn is_response(self) -> bool {
        matches!(
            self,
            MessageClass::SuccessResponse | MessageClass::ErrorResponse
        )
    }
}

/// A STUN message type: method plus class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageType {
    pub method: u16,
    pub class: MessageClass,
}

impl MessageType {
    pub const fn new(method: u16, class: MessageClass) -> Self {
        Self { method, class }
    }

    /// Binding request (0x0001).
    pub const fn binding_request() -> Self {
        Self::new(METHOD_BINDING, MessageClass::Request)
    }

    /// Binding success response (0x0101).
    pub const fn binding_success() -> Self {
        Self::new(METHOD_BINDING, MessageClass::SuccessResponse)
    }

    /// Binding error response (0x0111).
    pub const fn binding_error() -> Self {
        Self::new(METHOD_BINDING, MessageClass::ErrorResponse)
    }

    /// Converts the message type to its wire value.
    pub fn to_u16(self) -> u16 {
        let m = self.method & 0x0FFF;
        let c = self.class.bits();
        (m & 0x000F)
            | ((m & 0x0070) << 1)
            | ((m & 0x0F80) << 2)
            | ((c & 0b01) << 4)
            | ((c & 0b10) << 7)
    }

    /// Parses a message type from its wire value.
    ///
    /// # Returns
    /// * `Err(StunError::InvalidMessageType)` - If either of the two most
    ///   significant bits is set
    pub fn from_u16(value: u16) -> Result<Self, StunError> {
        if value & 0xC000 != 0 {
            return Err(StunError::InvalidMessageType(value));
        }
        let class = ((value >> 4) & 0b01) | ((value >> 7) & 0b10);
        let method = (value & 0x000F) | ((value >> 1) & 0x0070) | ((value >> 2) & 0x0F80);
        Ok(Self {
            method,
            class: MessageClass::from_bits(class),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_wire_values() {
        assert_eq!(MessageType::binding_request().to_u16(), 0x0001);
        assert_eq!(MessageType::binding_success().to_u16(), 0x0101);
        assert_eq!(MessageType::binding_error().to_u16(), 0x0111);
    }

    #[test]
    fn test_turn_wire_values() {
        // Allocate request / success, Send and Data indications
        assert_eq!(MessageType::new(0x003, MessageClass::Request).to_u16(), 0x0003);
        assert_eq!(
            MessageType::new(0x003, MessageClass::SuccessResponse).to_u16(),
            0x0103
        );
        assert_eq!(
            MessageType::new(0x006, MessageClass::Indication).to_u16(),
            0x0016
        );
        assert_eq!(
            MessageType::new(0x007, MessageClass::Indication).to_u16(),
            0x0017
        );
    }

    #[test]
    fn test_from_u16_inverts_to_u16() {
        for method in [0x001, 0x003, 0x004, 0x008, 0x009, 0x0FFF] {
            for class in [
                MessageClass::Request,
                MessageClass::Indication,
                MessageClass::SuccessResponse,
                MessageClass::ErrorResponse,
            ] {
                let message_type = MessageType::new(method, class);
                assert_eq!(
                    MessageType::from_u16(message_type.to_u16()).unwrap(),
                    message_type
                );
            }
        }
    }

    #[test]
    fn test_from_u16_rejects_top_bits() {
        assert!(matches!(
            MessageType::from_u16(0x4001),
            Err(StunError::InvalidMessageType(0x4001))
        ));
    }
}
