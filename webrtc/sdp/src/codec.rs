//! RTP payload formats of a media section.
//!
//! A [`Codec`] gathers the `rtpmap`, `fmtp` and `rtcp-fb` lines that refer
//! to one payload type.

/// Static payload types usable without an `rtpmap` line (RFC 3551).
const STATIC_PAYLOAD_TYPES: &[(u8, &str, u32)] =
    &[(0, "PCMU", 8000), (8, "PCMA", 8000), (9, "G722", 8000)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codec {
    pub payload_type: u8,
    pub name: String,
    pub clock_rate: u32,
    pub channels: Option<u16>,
    pub fmtp: Option<String>,
    pub rtcp_fb: Vec<String>,
}

impl Codec {
    pub fn new(payload_type: u8, name: impl Into<String>, clock_rate: u32) -> Self {
        Self {
            payload_type,
            name: name.into(),
            clock_rate,
            channels: None,
            fmtp: None,
            rtcp_fb: Vec::new(),
        }
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Parses an `rtpmap` value: `<pt> <name>/<clock>[/<channels>]`.
    pub fn parse_rtpmap(value: &str) -> Option<Self> {
        let (pt, encoding) = value.split_once(' ')?;
        let payload_type = pt.parse().ok()?;

        let mut parts = encoding.split('/');
        let name = parts.next().filter(|n| !n.is_empty())?;
        let clock_rate = parts.next()?.parse().ok()?;
        let channels = match parts.next() {
            Some(ch) => Some(ch.parse().ok()?),
            None => None,
        };
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            channels,
            ..Self::new(payload_type, name, clock_rate)
        })
    }

    /// The codec a static payload type stands for.
    pub fn from_static(payload_type: u8) -> Option<Self> {
        STATIC_PAYLOAD_TYPES
            .iter()
            .find(|(pt, _, _)| *pt == payload_type)
            .map(|(pt, name, rate)| Self::new(*pt, *name, *rate))
    }

    /// Value of the `rtpmap` line describing this codec.
    pub fn rtpmap(&self) -> String {
        match self.channels {
            Some(channels) => format!(
                "{} {}/{}/{}",
                self.payload_type, self.name, self.clock_rate, channels
            ),
            None => format!("{} {}/{}", self.payload_type, self.name, self.clock_rate),
        }
    }
}

/// Splits `<pt> <rest>` as used by `fmtp` and `rtcp-fb`.
pub(crate) fn split_payload_type(value: &str) -> Option<(u8, &str)> {
    let (pt, rest) = value.split_once(' ')?;
    Some((pt.parse().ok()?, rest))
}

/// A codec this endpoint is able to echo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecCapability {
    pub name: String,
    pub clock_rate: u32,
    pub channels: Option<u16>,
}

impl CodecCapability {
    pub fn new(name: impl Into<String>, clock_rate: u32, channels: Option<u16>) -> Self {
        Self {
            name: name.into(),
            clock_rate,
            channels,
        }
    }

    /// Encoding names compare case-insensitively; absent channel counts mean one.
    pub fn matches(&self, codec: &Codec) -> bool {
        self.name.eq_ignore_ascii_case(&codec.name)
            && self.clock_rate == codec.clock_rate
            && self.channels.unwrap_or(1) == codec.channels.unwrap_or(1)
    }

    /// opus/48000/2, PCMU/8000, PCMA/8000 and G722/8000.
    pub fn default_audio() -> Vec<Self> {
        vec![
            Self::new("opus", 48000, Some(2)),
            Self::new("PCMU", 8000, None),
            Self::new("PCMA", 8000, None),
            Self::new("G722", 8000, None),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rtpmap_with_channels() {
        let codec = Codec::parse_rtpmap("111 opus/48000/2").unwrap();
        assert_eq!(codec.payload_type, 111);
        assert_eq!(codec.name, "opus");
        assert_eq!(codec.clock_rate, 48000);
        assert_eq!(codec.channels, Some(2));
        assert_eq!(codec.rtpmap(), "111 opus/48000/2");
    }

    #[test]
    fn test_parse_rtpmap_rejects_garbage() {
        assert!(Codec::parse_rtpmap("111").is_none());
        assert!(Codec::parse_rtpmap("abc opus/48000").is_none());
        assert!(Codec::parse_rtpmap("111 opus").is_none());
        assert!(Codec::parse_rtpmap("111 /48000").is_none());
        assert!(Codec::parse_rtpmap("111 opus/48000/2/1").is_none());
    }

    #[test]
    fn test_static_payload_types() {
        assert_eq!(Codec::from_static(0).unwrap().name, "PCMU");
        assert_eq!(Codec::from_static(8).unwrap().name, "PCMA");
        assert_eq!(Codec::from_static(9).unwrap().name, "G722");
        assert!(Codec::from_static(96).is_none());
    }

    #[test]
    fn test_capability_matching() {
        let caps = CodecCapability::default_audio();
        let opus = Codec::new(111, "OPUS", 48000).with_channels(2);
        let mono_opus = Codec::new(111, "opus", 48000);
        let pcmu = Codec::new(0, "PCMU", 8000).with_channels(1);

        assert!(caps.iter().any(|c| c.matches(&opus)));
        assert!(!caps.iter().any(|c| c.matches(&mono_opus)));
        assert!(caps.iter().any(|c| c.matches(&pcmu)));
        assert!(!caps.iter().any(|c| c.matches(&Codec::new(96, "VP8", 90000))));
    }
}
