//! Session origin (`o=`).

use std::fmt;

use crate::connection::AddressType;
use crate::errors::DecodeError;

/// `o=<username> <sess-id> <sess-version> IN <addrtype> <unicast-address>`
///
/// The unicast address is kept as text: browsers put hostnames and
/// placeholder values here and nothing downstream routes on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub username: String,
    pub session_id: u64,
    pub session_version: u64,
    pub address_type: AddressType,
    pub unicast_address: String,
}

impl Origin {
    /// Parses the value of an `o=` line.
    ///
    /// # Returns
    /// * `Ok(Origin)` - If all six fields are present and well formed
    /// * `Err(DecodeError::MalformedSyntax)` - Otherwise
    pub fn parse(value: &str) -> Result<Self, DecodeError> {
        let [username, id, version, network, addr_type, unicast] =
            value.split_whitespace().collect::<Vec<_>>()[..]
        else {
            return Err(DecodeError::malformed("Invalid origin format"));
        };

        let number = |field: &str, what: &str| {
            field
                .parse::<u64>()
                .map_err(|_| DecodeError::malformed(format!("Invalid origin {what} {field}")))
        };

        Ok(Self {
            username: username.to_string(),
            session_id: number(id, "session id")?,
            session_version: number(version, "session version")?,
            address_type: AddressType::parse_network(network, addr_type)?,
            unicast_address: unicast.to_string(),
        })
    }

    /// Fails if the fields would not survive [`Origin::parse`].
    pub fn validate(&self) -> Result<(), DecodeError> {
        let blank = |s: &str| s.is_empty() || s.chars().any(char::is_whitespace);
        if blank(&self.username) || blank(&self.unicast_address) {
            return Err(DecodeError::malformed(
                "Origin username and address must be single tokens",
            ));
        }
        Ok(())
    }
}

impl Default for Origin {
    fn default() -> Self {
        Self {
            username: "-".to_string(),
            session_id: 0,
            session_version: 0,
            address_type: AddressType::Ip4,
            unicast_address: "0.0.0.0".to_string(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "o={} {} {} IN {} {}\r\n",
            self.username,
            self.session_id,
            self.session_version,
            self.address_type,
            self.unicast_address
        )
    }
}
