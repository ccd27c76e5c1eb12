//! SDP attribute representation.
//!
//! Attributes in SDP provide additional information about the session
//! or media descriptions. The ones WebRTC negotiation relies on get a
//! typed form here; everything else stays an [`Attribute`].

use crate::errors::DecodeError;

/// Represents an attribute (a=) in an SDP message as defined in RFC 4566.
///
/// # Format
/// - `a=<attribute-name>` for flag attributes (no value)
/// - `a=<attribute-name>:<attribute-value>` for value attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn flag(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    /// Parses an attribute string into an `Attribute` struct.
    ///
    /// # Arguments
    /// * `value` - The attribute string to parse, without the leading "a="
    ///
    /// # Returns
    /// * `Ok(Attribute)` - Successfully parsed attribute
    /// * `Err(DecodeError::MalformedSyntax)` - If the attribute has no name
    pub fn parse(value: &str) -> Result<Self, DecodeError> {
        let (name, value) = match value.split_once(':') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (value, None),
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(DecodeError::malformed("Invalid attribute format"));
        }
        Ok(Attribute {
            name: name.to_string(),
            value,
        })
    }

    pub(crate) fn is_flag(&self, name: &str) -> bool {
        self.name == name && self.value.is_none()
    }

    pub(crate) fn value_of(&self, name: &str) -> Option<&str> {
        if self.name == name {
            self.value.as_deref()
        } else {
            None
        }
    }
}

/// Formats `a=<name>[:<value>]`, CRLF terminated.
impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(val) => write!(f, "a={}:{}\r\n", self.name, val),
            None => write!(f, "a={}\r\n", self.name),
        }
    }
}

/// Media direction flag (RFC 4566 Section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl Direction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sendrecv" => Some(Direction::SendRecv),
            "sendonly" => Some(Direction::SendOnly),
            "recvonly" => Some(Direction::RecvOnly),
            "inactive" => Some(Direction::Inactive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::SendRecv => "sendrecv",
            Direction::SendOnly => "sendonly",
            Direction::RecvOnly => "recvonly",
            Direction::Inactive => "inactive",
        }
    }

    /// The direction an answerer uses in reply to this one.
    pub fn reversed(&self) -> Self {
        match self {
            Direction::SendOnly => Direction::RecvOnly,
            Direction::RecvOnly => Direction::SendOnly,
            other => *other,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DTLS role negotiation (`a=setup`, RFC 4145).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setup {
    Active,
    Passive,
    ActPass,
    HoldConn,
}

impl Setup {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Setup::Active),
            "passive" => Some(Setup::Passive),
            "actpass" => Some(Setup::ActPass),
            "holdconn" => Some(Setup::HoldConn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Setup::Active => "active",
            Setup::Passive => "passive",
            Setup::ActPass => "actpass",
            Setup::HoldConn => "holdconn",
        }
    }
}

impl std::fmt::Display for Setup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Certificate fingerprint (`a=fingerprint:<hash-func> <hex>`, RFC 8122).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub algorithm: String,
    pub value: String,
}

impl Fingerprint {
    pub fn new(algorithm: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            value: value.into(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (algorithm, hex) = value.split_once(' ')?;
        if algorithm.is_empty() || hex.is_empty() {
            return None;
        }
        Some(Self::new(algorithm, hex))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.algorithm, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_parse_flag() {
        let attr = Attribute::parse("recvonly").unwrap();
        assert_eq!(attr.name, "recvonly");
        assert_eq!(attr.value, None);
    }

    #[test]
    fn test_attribute_parse_with_colon_in_value() {
        let attr = Attribute::parse("fingerprint:sha-256 AA:BB:CC").unwrap();
        assert_eq!(attr.name, "fingerprint");
        assert_eq!(attr.value.as_deref(), Some("sha-256 AA:BB:CC"));
    }

    #[test]
    fn test_attribute_parse_rejects_empty_name() {
        assert!(Attribute::parse("").is_err());
        assert!(Attribute::parse(":value").is_err());
    }

    #[test]
    fn test_attribute_display() {
        assert_eq!(Attribute::flag("sendrecv").to_string(), "a=sendrecv\r\n");
        assert_eq!(
            Attribute::new("rtpmap", Some("111 opus/48000/2".into())).to_string(),
            "a=rtpmap:111 opus/48000/2\r\n"
        );
    }

    #[test]
    fn test_direction_reversed() {
        assert_eq!(Direction::SendOnly.reversed(), Direction::RecvOnly);
        assert_eq!(Direction::RecvOnly.reversed(), Direction::SendOnly);
        assert_eq!(Direction::SendRecv.reversed(), Direction::SendRecv);
        assert_eq!(Direction::Inactive.reversed(), Direction::Inactive);
    }

    #[test]
    fn test_setup_parse() {
        assert_eq!(Setup::parse("actpass"), Some(Setup::ActPass));
        assert_eq!(Setup::parse("bogus"), None);
    }

    #[test]
    fn test_fingerprint_parse() {
        let fp = Fingerprint::parse("sha-256 AB:CD").unwrap();
        assert_eq!(fp.algorithm, "sha-256");
        assert_eq!(fp.value, "AB:CD");
        assert!(Fingerprint::parse("sha-256").is_none());
    }
}
