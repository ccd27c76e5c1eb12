//! SDP media description representation.
//!
//! Media descriptions define the properties of individual media streams
//! within an SDP session.

use crate::attribute::{Attribute, Direction, Fingerprint, Setup};
use crate::codec::{Codec, split_payload_type};
use crate::connection::Connection;
use crate::errors::DecodeError;

/// Valid media types as per RFC 4566.
const VALID_MEDIA_TYPES: &[&str] = &["audio", "video", "text", "application", "message"];

/// Represents a media description (m=) in an SDP message as defined in RFC 4566.
///
/// ```text
/// m=<media> <port> <proto> <fmt> ...
/// ```
///
/// Attributes the negotiation understands are lifted into typed fields.
/// For single-valued ones the first occurrence wins; anything else,
/// including later duplicates, stays in `attributes` in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub media_type: String,
    pub port: u16,
    pub protocol: String,
    pub formats: Vec<String>,
    pub connection: Option<Connection>,
    pub mid: Option<String>,
    pub direction: Option<Direction>,
    pub ice_ufrag: Option<String>,
    pub ice_pwd: Option<String>,
    pub fingerprint: Option<Fingerprint>,
    pub setup: Option<Setup>,
    pub rtcp_mux: bool,
    /// One entry per payload type in `formats` with a known encoding, in format order
    pub codecs: Vec<Codec>,
    /// Values of `a=candidate` lines, without the attribute name
    pub candidates: Vec<String>,
    pub end_of_candidates: bool,
    pub attributes: Vec<Attribute>,
}

impl MediaDescription {
    pub fn new(media_type: impl Into<String>, port: u16, protocol: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            port,
            protocol: protocol.into(),
            formats: Vec::new(),
            connection: None,
            mid: None,
            direction: None,
            ice_ufrag: None,
            ice_pwd: None,
            fingerprint: None,
            setup: None,
            rtcp_mux: false,
            codecs: Vec::new(),
            candidates: Vec::new(),
            end_of_candidates: false,
            attributes: Vec::new(),
        }
    }

    /// Parses a media description line according to RFC 4566.
    ///
    /// # Arguments
    /// * `value` - The media description string to parse (without the "m=" prefix)
    ///
    /// # Returns
    /// * `Ok(MediaDescription)` - The media line, without attributes yet
    /// * `Err(DecodeError::MalformedSyntax)` - If the line is incomplete, the
    ///   port does not parse or the media type is unknown
    pub fn parse(value: &str) -> Result<Self, DecodeError> {
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 4 {
            return Err(DecodeError::malformed("Invalid media description format"));
        }

        if !VALID_MEDIA_TYPES.contains(&parts[0]) {
            return Err(DecodeError::malformed(format!(
                "Invalid media type: {}",
                parts[0]
            )));
        }

        let port = parts[1]
            .parse()
            .map_err(|_| DecodeError::malformed("Invalid port number"))?;

        let mut media = Self::new(parts[0], port, parts[2]);
        media.formats = parts[3..].iter().map(|s| s.to_string()).collect();
        Ok(media)
    }

    /// RTP-based transport (as opposed to e.g. SCTP data channels).
    pub fn is_rtp(&self) -> bool {
        self.protocol.contains("RTP")
    }

    /// A port of zero marks a rejected or disabled section.
    pub fn is_rejected(&self) -> bool {
        self.port == 0
    }

    pub fn codec(&self, payload_type: u8) -> Option<&Codec> {
        self.codecs.iter().find(|c| c.payload_type == payload_type)
    }

    /// Lifts the section's attributes into typed fields.
    ///
    /// `rtpmap` lines are resolved first so that `fmtp` and `rtcp-fb`
    /// lines may precede the `rtpmap` they refer to.
    pub(crate) fn apply_attributes(&mut self, attributes: Vec<Attribute>) {
        let mut consumed = vec![false; attributes.len()];
        let mut mapped: Vec<Codec> = Vec::new();

        for (i, attr) in attributes.iter().enumerate() {
            let Some(codec) = attr.value_of("rtpmap").and_then(Codec::parse_rtpmap) else {
                continue;
            };
            let listed = self
                .formats
                .iter()
                .any(|f| f.parse::<u8>() == Ok(codec.payload_type));
            if listed && !mapped.iter().any(|c| c.payload_type == codec.payload_type) {
                mapped.push(codec);
                consumed[i] = true;
            }
        }

        for format in &self.formats {
            let Ok(pt) = format.parse::<u8>() else {
                continue;
            };
            if self.codecs.iter().any(|c| c.payload_type == pt) {
                continue;
            }
            let codec = mapped
                .iter()
                .find(|c| c.payload_type == pt)
                .cloned()
                .or_else(|| Codec::from_static(pt));
            if let Some(codec) = codec {
                self.codecs.push(codec);
            }
        }

        for (attr, consumed) in attributes.into_iter().zip(consumed) {
            if !consumed && !self.apply_attribute(&attr) {
                self.attributes.push(attr);
            }
        }
    }

    /// Returns false when the attribute is not lifted into a typed field.
    fn apply_attribute(&mut self, attr: &Attribute) -> bool {
        if attr.value.is_none() {
            if let Some(direction) = Direction::from_name(&attr.name) {
                return set_once(&mut self.direction, direction);
            }
            return match attr.name.as_str() {
                "rtcp-mux" => set_flag(&mut self.rtcp_mux),
                "end-of-candidates" => set_flag(&mut self.end_of_candidates),
                _ => false,
            };
        }

        let value = attr.value.as_deref().unwrap_or_default();
        match attr.name.as_str() {
            "mid" => set_once(&mut self.mid, value.to_string()),
            "ice-ufrag" => set_once(&mut self.ice_ufrag, value.to_string()),
            "ice-pwd" => set_once(&mut self.ice_pwd, value.to_string()),
            "fingerprint" => match Fingerprint::parse(value) {
                Some(fp) => set_once(&mut self.fingerprint, fp),
                None => false,
            },
            "setup" => match Setup::parse(value) {
                Some(setup) => set_once(&mut self.setup, setup),
                None => false,
            },
            "candidate" => {
                self.candidates.push(value.to_string());
                true
            }
            "fmtp" => match split_payload_type(value) {
                Some((pt, params)) => match self.codecs.iter_mut().find(|c| c.payload_type == pt) {
                    Some(codec) => set_once(&mut codec.fmtp, params.to_string()),
                    None => false,
                },
                None => false,
            },
            "rtcp-fb" => match split_payload_type(value) {
                Some((pt, feedback)) => match self.codecs.iter_mut().find(|c| c.payload_type == pt) {
                    Some(codec) => {
                        codec.rtcp_fb.push(feedback.to_string());
                        true
                    }
                    None => false,
                },
                None => false,
            },
            _ => false,
        }
    }
}

pub(crate) fn set_once<T>(slot: &mut Option<T>, value: T) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(value);
    true
}

pub(crate) fn set_flag(flag: &mut bool) -> bool {
    if *flag {
        return false;
    }
    *flag = true;
    true
}

/// Formats the media section: the m= line, connection, typed attributes in
/// a fixed order, codec lines, candidates, then the remaining attributes.
impl std::fmt::Display for MediaDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "m={} {} {} {}\r\n",
            self.media_type,
            self.port,
            self.protocol,
            self.formats.join(" ")
        )?;

        if let Some(ref conn) = self.connection {
            write!(f, "{}", conn)?;
        }
        if let Some(ref mid) = self.mid {
            write!(f, "a=mid:{}\r\n", mid)?;
        }
        if let Some(direction) = self.direction {
            write!(f, "a={}\r\n", direction)?;
        }
        if let Some(ref ufrag) = self.ice_ufrag {
            write!(f, "a=ice-ufrag:{}\r\n", ufrag)?;
        }
        if let Some(ref pwd) = self.ice_pwd {
            write!(f, "a=ice-pwd:{}\r\n", pwd)?;
        }
        if let Some(ref fingerprint) = self.fingerprint {
            write!(f, "a=fingerprint:{}\r\n", fingerprint)?;
        }
        if let Some(setup) = self.setup {
            write!(f, "a=setup:{}\r\n", setup)?;
        }
        if self.rtcp_mux {
            f.write_str("a=rtcp-mux\r\n")?;
        }

        for codec in &self.codecs {
            write!(f, "a=rtpmap:{}\r\n", codec.rtpmap())?;
            if let Some(ref params) = codec.fmtp {
                write!(f, "a=fmtp:{} {}\r\n", codec.payload_type, params)?;
            }
            for feedback in &codec.rtcp_fb {
                write!(f, "a=rtcp-fb:{} {}\r\n", codec.payload_type, feedback)?;
            }
        }

        for candidate in &self.candidates {
            write!(f, "a=candidate:{}\r\n", candidate)?;
        }
        if self.end_of_candidates {
            f.write_str("a=end-of-candidates\r\n")?;
        }

        for attr in &self.attributes {
            write!(f, "{}", attr)?;
        }

        Ok(())
    }
}
