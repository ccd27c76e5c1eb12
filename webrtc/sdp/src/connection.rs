//! Connection data (`c=`) and the `IN IP4|IP6` address prefix it shares with
//! the origin line.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::errors::DecodeError;

/// `<addrtype>` of an `IN` network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressType {
    #[default]
    Ip4,
    Ip6,
}

impl AddressType {
    pub fn of(address: &IpAddr) -> Self {
        match address {
            IpAddr::V4(_) => AddressType::Ip4,
            IpAddr::V6(_) => AddressType::Ip6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AddressType::Ip4 => "IP4",
            AddressType::Ip6 => "IP6",
        }
    }

    /// Consumes the `IN <addrtype>` pair.
    pub(crate) fn parse_network(
        network_type: &str,
        address_type: &str,
    ) -> Result<Self, DecodeError> {
        if network_type != "IN" {
            return Err(DecodeError::malformed(format!(
                "Unknown network type {network_type}"
            )));
        }
        address_type.parse()
    }
}

impl FromStr for AddressType {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IP4" => Ok(AddressType::Ip4),
            "IP6" => Ok(AddressType::Ip6),
            other => Err(DecodeError::malformed(format!("Unknown address type {other}"))),
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `c=IN <addrtype> <address>[/<ttl>[/<count>]]`
///
/// The address type is implied by `address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub address: IpAddr,
    pub ttl: Option<u8>,
    pub num_addresses: Option<u8>,
}

impl Connection {
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            ttl: None,
            num_addresses: None,
        }
    }

    pub fn address_type(&self) -> AddressType {
        AddressType::of(&self.address)
    }

    /// Parses the value of a `c=` line.
    ///
    /// # Returns
    /// * `Ok(Connection)` - A successfully parsed connection field
    /// * `Err(DecodeError::MalformedSyntax)` - Wrong field count, unknown
    ///   network or address type, or a bad address suffix
    pub fn parse(value: &str) -> Result<Self, DecodeError> {
        let [network, addr_type, address_field] = value.split_whitespace().collect::<Vec<_>>()[..] else {
            return Err(DecodeError::malformed("Invalid connection format"));
        };
        let declared = AddressType::parse_network(network, addr_type)?;

        let mut pieces = address_field.split('/');
        let address: IpAddr = pieces
            .next()
            .unwrap_or_default()
            .parse()
            .map_err(|_| DecodeError::malformed(format!("Invalid connection address {address_field}")))?;
        if AddressType::of(&address) != declared {
            return Err(DecodeError::malformed(format!(
                "{address} is not an {declared} address"
            )));
        }

        let mut suffix = || -> Result<Option<u8>, DecodeError> {
            pieces
                .next()
                .map(|n| {
                    n.parse()
                        .map_err(|_| DecodeError::malformed(format!("Invalid connection suffix {n}")))
                })
                .transpose()
        };
        let ttl = suffix()?;
        let num_addresses = suffix()?;
        if pieces.next().is_some() {
            return Err(DecodeError::malformed("Invalid connection address"));
        }

        Ok(Self {
            address,
            ttl,
            num_addresses,
        })
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c=IN {} {}", self.address_type(), self.address)?;
        if let Some(ttl) = self.ttl {
            write!(f, "/{ttl}")?;
            if let Some(count) = self.num_addresses {
                write!(f, "/{count}")?;
            }
        }
        f.write_str("\r\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unicast() {
        let conn = Connection::parse("IN IP4 192.168.1.1").unwrap();
        assert_eq!(conn, Connection::new("192.168.1.1".parse().unwrap()));

        let conn = Connection::parse("IN IP6 ::1").unwrap();
        assert_eq!(conn.address_type(), AddressType::Ip6);
    }

    #[test]
    fn test_parse_multicast_suffix() {
        let conn = Connection::parse("IN IP4 224.2.1.1/127/3").unwrap();
        assert_eq!(conn.ttl, Some(127));
        assert_eq!(conn.num_addresses, Some(3));
        assert_eq!(conn.to_string(), "c=IN IP4 224.2.1.1/127/3\r\n");
    }

    #[test]
    fn test_parse_rejects() {
        for bad in [
            "IN IP4",
            "XX IP4 192.168.1.1",
            "IN IP5 192.168.1.1",
            "IN IP4 999.999.999.999",
            "IN IP6 10.0.0.1",
            "IN IP4 224.2.1.1/256",
            "IN IP4 224.2.1.1/127/abc",
            "IN IP4 224.2.1.1/1/2/3",
        ] {
            assert!(Connection::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_unspecified_display() {
        let conn = Connection::new("0.0.0.0".parse().unwrap());
        assert_eq!(conn.to_string(), "c=IN IP4 0.0.0.0\r\n");
    }
}
