//! Offer/answer decoding with a capability check.

use crate::codec::{Codec, CodecCapability};
use crate::errors::DecodeError;
use crate::media_description::MediaDescription;
use crate::sdp_type::SdpType;
use crate::session_description::SessionDescription;

/// Session description codec bound to the codecs this endpoint supports.
///
/// [`SessionDescription::parse`] is the purely syntactic layer; `SdpCodec`
/// additionally rejects descriptions that share no codec with us.
#[derive(Debug, Clone)]
pub struct SdpCodec {
    capabilities: Vec<CodecCapability>,
}

impl Default for SdpCodec {
    fn default() -> Self {
        Self::new(CodecCapability::default_audio())
    }
}

impl SdpCodec {
    pub fn new(capabilities: Vec<CodecCapability>) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> &[CodecCapability] {
        &self.capabilities
    }

    /// Parses `text` and checks that some RTP section offers a supported codec.
    ///
    /// # Returns
    /// * `Ok(SessionDescription)` - The parsed description
    /// * `Err(DecodeError::MalformedSyntax)` - Structurally invalid text
    /// * `Err(DecodeError::UnsupportedMedia)` - No mutually supported codec
    pub fn parse(&self, sdp_type: SdpType, text: &str) -> Result<SessionDescription, DecodeError> {
        let session = SessionDescription::parse(sdp_type, text)?;

        let supported = session
            .media
            .iter()
            .filter(|m| m.is_rtp() && !m.is_rejected())
            .any(|m| !self.supported_codecs(m).is_empty());
        if !supported {
            return Err(DecodeError::UnsupportedMedia);
        }

        Ok(session)
    }

    pub fn serialize(&self, session: &SessionDescription) -> String {
        session.serialize()
    }

    /// Codecs of `media` we can handle, in the offerer's preference order.
    pub fn supported_codecs<'a>(&self, media: &'a MediaDescription) -> Vec<&'a Codec> {
        media
            .codecs
            .iter()
            .filter(|codec| self.capabilities.iter().any(|cap| cap.matches(codec)))
            .collect()
    }
}
