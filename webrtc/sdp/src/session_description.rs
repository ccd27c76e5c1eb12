//! Complete SDP session description.
//!
//! This module provides the main `SessionDescription` type that represents
//! a complete SDP message according to RFC 4566, with the ICE (RFC 8839)
//! and DTLS (RFC 8122, RFC 4145) attributes of a WebRTC offer or answer.

use crate::{
    attribute::{Attribute, Fingerprint, Setup},
    connection::Connection,
    errors::DecodeError,
    media_description::{MediaDescription, set_flag, set_once},
    origin::Origin,
    sdp_type::SdpType,
    session_description_builder::SessionDescriptionBuilder,
    timing::Timing,
};

/// Represents a complete Session Description according to RFC 4566.
///
/// The value is immutable in use: a new offer or answer produces a new
/// `SessionDescription` rather than editing an old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub origin: Origin,
    pub session_name: String,
    pub timing: Timing,
    /// Further `t=` lines, in order
    pub repeat_timings: Vec<Timing>,
    pub connection: Option<Connection>,
    pub ice_ufrag: Option<String>,
    pub ice_pwd: Option<String>,
    pub ice_lite: bool,
    pub ice_options: Option<String>,
    pub fingerprint: Option<Fingerprint>,
    pub setup: Option<Setup>,
    /// Values of `a=group` lines, e.g. `BUNDLE 0 1`
    pub groups: Vec<String>,
    pub media: Vec<MediaDescription>,
    pub attributes: Vec<Attribute>,
}

/// Represents the different types of SDP lines for pattern matching.
enum SdpLineType {
    Version,
    Origin,
    SessionName,
    Timing,
    Connection,
    Media,
    Attribute,
    Unknown,
}

impl From<char> for SdpLineType {
    fn from(c: char) -> Self {
        match c {
            'v' => Self::Version,
            'o' => Self::Origin,
            's' => Self::SessionName,
            't' => Self::Timing,
            'c' => Self::Connection,
            'm' => Self::Media,
            'a' => Self::Attribute,
            _ => Self::Unknown,
        }
    }
}

/// Parser state: the section currently receiving lines.
#[derive(Default)]
struct ParseState {
    saw_origin: bool,
    saw_session_name: bool,
    saw_timing: bool,
    session_attributes: Vec<Attribute>,
    current_media: Option<(MediaDescription, Vec<Attribute>)>,
}

impl SessionDescription {
    /// Creates a new empty `SessionDescription` with default values.
    pub fn new(sdp_type: SdpType) -> Self {
        Self {
            sdp_type,
            origin: Origin::default(),
            session_name: String::from("-"),
            timing: Timing::default(),
            repeat_timings: Vec::new(),
            connection: None,
            ice_ufrag: None,
            ice_pwd: None,
            ice_lite: false,
            ice_options: None,
            fingerprint: None,
            setup: None,
            groups: Vec::new(),
            media: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Creates a builder for constructing `SessionDescription` instances.
    pub fn builder(sdp_type: SdpType) -> SessionDescriptionBuilder {
        SessionDescriptionBuilder::new(sdp_type)
    }

    /// Parses an SDP string into a `SessionDescription`.
    ///
    /// Accepts CRLF or bare LF line endings. Line types other than
    /// v/o/s/t/c/m/a are ignored.
    ///
    /// # Arguments
    /// * `sdp_type` - The type of SDP message, carried beside the text
    /// * `sdp_str` - The SDP message string to parse
    ///
    /// # Returns
    /// * `Ok(SessionDescription)` - A fully parsed session description
    /// * `Err(DecodeError::MalformedSyntax)` - If the text is not a valid SDP
    pub fn parse(sdp_type: SdpType, sdp_str: &str) -> Result<Self, DecodeError> {
        let mut session = SessionDescription::new(sdp_type);
        let mut state = ParseState::default();
        let mut lines = sdp_str.lines().filter(|line| !line.is_empty());

        match lines.next().map(Self::split_line).transpose()? {
            Some(('v', value)) => Self::check_version(value)?,
            _ => return Err(DecodeError::malformed("Session description must start with v=")),
        }

        for line in lines {
            let (type_char, value) = Self::split_line(line)?;
            session.process_line(&mut state, type_char, value)?;
        }

        if !state.saw_origin {
            return Err(DecodeError::malformed("Missing origin (o=) line"));
        }

        session.finish_media(&mut state);
        session.apply_session_attributes(std::mem::take(&mut state.session_attributes));
        Ok(session)
    }

    /// Splits an SDP line into its type character and value components.
    ///
    /// Each SDP line must be in the format `<type>=<value>` where `type` is
    /// a single character.
    fn split_line(line: &str) -> Result<(char, &str), DecodeError> {
        let (type_str, value) = line
            .split_once('=')
            .ok_or_else(|| DecodeError::malformed("Line must be in format 'type=value'"))?;

        let mut chars = type_str.chars();
        match (chars.next(), chars.next()) {
            (Some(type_char), None) => Ok((type_char, value)),
            _ => Err(DecodeError::malformed("Line must be in format 'type=value'")),
        }
    }

    fn check_version(value: &str) -> Result<(), DecodeError> {
        match value.parse::<u32>() {
            Ok(0) => Ok(()),
            _ => Err(DecodeError::malformed("SDP version must be 0")),
        }
    }

    /// Processes a single line of SDP and updates the session accordingly.
    ///
    /// `o=` and `s=` appear once and `c=` at most once per level. Extra
    /// `t=` lines are kept in order.
    fn process_line(
        &mut self,
        state: &mut ParseState,
        type_char: char,
        value: &str,
    ) -> Result<(), DecodeError> {
        let in_media = state.current_media.is_some();
        match SdpLineType::from(type_char) {
            SdpLineType::Version => Self::check_version(value),
            SdpLineType::Origin | SdpLineType::SessionName | SdpLineType::Timing if in_media => {
                Err(DecodeError::malformed(format!(
                    "{type_char}= line inside a media section"
                )))
            }
            SdpLineType::Origin => {
                if !set_flag(&mut state.saw_origin) {
                    return Err(DecodeError::malformed("Duplicate origin (o=) line"));
                }
                self.origin = Origin::parse(value)?;
                Ok(())
            }
            SdpLineType::SessionName => {
                if !set_flag(&mut state.saw_session_name) {
                    return Err(DecodeError::malformed("Duplicate session name (s=) line"));
                }
                self.session_name = value.to_string();
                Ok(())
            }
            SdpLineType::Timing => {
                let timing = Timing::parse(value)?;
                if set_flag(&mut state.saw_timing) {
                    self.timing = timing;
                } else {
                    self.repeat_timings.push(timing);
                }
                Ok(())
            }
            SdpLineType::Connection => {
                let conn = Connection::parse(value)?;
                let slot = match state.current_media.as_mut() {
                    Some((media, _)) => &mut media.connection,
                    None => &mut self.connection,
                };
                if !set_once(slot, conn) {
                    return Err(DecodeError::malformed("Duplicate connection (c=) line"));
                }
                Ok(())
            }
            SdpLineType::Media => {
                self.finish_media(state);
                state.current_media = Some((MediaDescription::parse(value)?, Vec::new()));
                Ok(())
            }
            SdpLineType::Attribute => {
                let attr = Attribute::parse(value)?;
                match state.current_media.as_mut() {
                    Some((_, attributes)) => attributes.push(attr),
                    None => state.session_attributes.push(attr),
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn finish_media(&mut self, state: &mut ParseState) {
        if let Some((mut media, attributes)) = state.current_media.take() {
            media.apply_attributes(attributes);
            self.media.push(media);
        }
    }

    fn apply_session_attributes(&mut self, attributes: Vec<Attribute>) {
        for attr in attributes {
            let lifted = match (attr.name.as_str(), attr.value.as_deref()) {
                ("ice-lite", None) => set_flag(&mut self.ice_lite),
                ("ice-ufrag", Some(v)) => set_once(&mut self.ice_ufrag, v.to_string()),
                ("ice-pwd", Some(v)) => set_once(&mut self.ice_pwd, v.to_string()),
                ("ice-options", Some(v)) => set_once(&mut self.ice_options, v.to_string()),
                ("fingerprint", Some(v)) => match Fingerprint::parse(v) {
                    Some(fp) => set_once(&mut self.fingerprint, fp),
                    None => false,
                },
                ("setup", Some(v)) => match Setup::parse(v) {
                    Some(setup) => set_once(&mut self.setup, setup),
                    None => false,
                },
                ("group", Some(v)) => {
                    self.groups.push(v.to_string());
                    true
                }
                _ => false,
            };
            if !lifted {
                self.attributes.push(attr);
            }
        }
    }

    /// ICE credentials for `media`, falling back to the session level.
    pub fn ice_credentials<'a>(&'a self, media: &'a MediaDescription) -> Option<(&'a str, &'a str)> {
        let ufrag = media.ice_ufrag.as_deref().or(self.ice_ufrag.as_deref())?;
        let pwd = media.ice_pwd.as_deref().or(self.ice_pwd.as_deref())?;
        Some((ufrag, pwd))
    }

    /// Fingerprint for `media`, falling back to the session level.
    pub fn fingerprint_for<'a>(&'a self, media: &'a MediaDescription) -> Option<&'a Fingerprint> {
        media.fingerprint.as_ref().or(self.fingerprint.as_ref())
    }

    /// Setup role for `media`, falling back to the session level.
    pub fn setup_for(&self, media: &MediaDescription) -> Option<Setup> {
        media.setup.or(self.setup)
    }

    /// Mids of the `BUNDLE` group, if the session bundles.
    pub fn bundle_mids(&self) -> Option<Vec<&str>> {
        self.groups.iter().find_map(|group| {
            let mut tokens = group.split_whitespace();
            (tokens.next() == Some("BUNDLE")).then(|| tokens.collect())
        })
    }

    /// Deterministic text form: CRLF line endings, typed fields in a fixed
    /// order followed by the remaining attributes.
    pub fn serialize(&self) -> String {
        self.to_string()
    }
}

/// Formats a session description according to RFC 4566.
///
/// Order: `v=`, `o=`, `s=`, session `c=`, every `t=`, typed session attributes,
/// remaining session attributes, then each media section.
impl std::fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("v=0\r\n")?;
        write!(f, "{}", self.origin)?;
        write!(f, "s={}\r\n", self.session_name)?;
        if let Some(ref conn) = self.connection {
            write!(f, "{}", conn)?;
        }
        write!(f, "{}", self.timing)?;
        for timing in &self.repeat_timings {
            write!(f, "{}", timing)?;
        }

        for group in &self.groups {
            write!(f, "a=group:{}\r\n", group)?;
        }
        if self.ice_lite {
            f.write_str("a=ice-lite\r\n")?;
        }
        if let Some(ref ufrag) = self.ice_ufrag {
            write!(f, "a=ice-ufrag:{}\r\n", ufrag)?;
        }
        if let Some(ref pwd) = self.ice_pwd {
            write!(f, "a=ice-pwd:{}\r\n", pwd)?;
        }
        if let Some(ref options) = self.ice_options {
            write!(f, "a=ice-options:{}\r\n", options)?;
        }
        if let Some(ref fingerprint) = self.fingerprint {
            write!(f, "a=fingerprint:{}\r\n", fingerprint)?;
        }
        if let Some(setup) = self.setup {
            write!(f, "a=setup:{}\r\n", setup)?;
        }

        for attr in &self.attributes {
            write!(f, "{}", attr)?;
        }

        for media in &self.media {
            write!(f, "{}", media)?;
        }

        Ok(())
    }
}
