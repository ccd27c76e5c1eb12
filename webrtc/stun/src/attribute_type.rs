//! STUN attribute types
//!
//! Attributes are Type-Length-Value records following the header. Types
//! in the range 0x0000-0x7FFF are comprehension-required; 0x8000-0xFFFF
//! are comprehension-optional.

/// STUN and ICE attribute types (RFC 5389, RFC 8445).
///
/// TURN attributes live in the `turn` crate; anything that converts into a
/// `u16` can be used as an attribute type on a [`crate::Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// MAPPED-ADDRESS (0x0001) - legacy, non-XOR'd reflexive address
    MappedAddress,
    /// USERNAME (0x0006)
    Username,
    /// MESSAGE-INTEGRITY (0x0008) - HMAC-SHA1 over the message
    MessageIntegrity,
    /// ERROR-CODE (0x0009)
    ErrorCode,
    /// REALM (0x0014)
    Realm,
    /// NONCE (0x0015)
    Nonce,
    /// XOR-MAPPED-ADDRESS (0x0020) - XOR'd reflexive transport address (recommended)
    XorMappedAddress,
    /// PRIORITY (0x0024)
    Priority,
    /// USE-CANDIDATE (0x0025)
    UseCandidate,
    /// SOFTWARE (0x8022)
    Software,
    /// FINGERPRINT (0x8028) - CRC-32 of the message XOR'd with 0x5354554E
    Fingerprint,
    /// ICE-CONTROLLED (0x8029)
    IceControlled,
    /// ICE-CONTROLLING (0x802A)
    IceControlling,
}

impl AttributeType {
    /// Converts the attribute type to its wire value.
    pub fn to_u16(self) -> u16 {
        match self {
            AttributeType::MappedAddress => 0x0001,
            AttributeType::Username => 0x0006,
            AttributeType::MessageIntegrity => 0x0008,
            AttributeType::ErrorCode => 0x0009,
            AttributeType::Realm => 0x0014,
            AttributeType::Nonce => 0x0015,
            AttributeType::XorMappedAddress => 0x0020,
            AttributeType::Priority => 0x0024,
            AttributeType::UseCandidate => 0x0025,
            AttributeType::Software => 0x8022,
            AttributeType::Fingerprint => 0x8028,
            AttributeType::IceControlled => 0x8029,
            AttributeType::IceControlling => 0x802A,
        }
    }
}

impl From<AttributeType> for u16 {
    fn from(value: AttributeType) -> Self {
        value.to_u16()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_type_to_u16() {
        assert_eq!(AttributeType::XorMappedAddress.to_u16(), 0x0020);
        assert_eq!(AttributeType::MessageIntegrity.to_u16(), 0x0008);
        assert_eq!(u16::from(AttributeType::IceControlling), 0x802A);
    }
}
