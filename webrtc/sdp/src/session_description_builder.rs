//! Builder pattern for SDP session descriptions.
//!
//! Provides a fluent API for constructing offers and answers.

use crate::{
    attribute::{Attribute, Fingerprint, Setup},
    connection::Connection,
    errors::DecodeError,
    media_description::MediaDescription,
    origin::Origin,
    sdp_type::SdpType,
    session_description::SessionDescription,
    timing::Timing,
};

/// Builder for constructing `SessionDescription` instances.
pub struct SessionDescriptionBuilder {
    session: SessionDescription,
}

impl SessionDescriptionBuilder {
    /// Creates a new builder with the specified SDP type.
    pub fn new(sdp_type: SdpType) -> Self {
        Self {
            session: SessionDescription::new(sdp_type),
        }
    }

    pub fn origin(mut self, origin: Origin) -> Self {
        self.session.origin = origin;
        self
    }

    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.session.session_name = name.into();
        self
    }

    pub fn timing(mut self, timing: Timing) -> Self {
        self.session.timing = timing;
        self
    }

    pub fn connection(mut self, connection: Connection) -> Self {
        self.session.connection = Some(connection);
        self
    }

    /// Sets session-level ICE credentials.
    ///
    /// # Example
    /// ```no_run
    /// use sdp::{SessionDescriptionBuilder, SdpType};
    ///
    /// let sdp = SessionDescriptionBuilder::new(SdpType::Answer)
    ///     .ice_credentials("abcd", "secret_password_here_xyz")
    ///     // ... other fields
    ///     .build();
    /// ```
    pub fn ice_credentials(mut self, ufrag: &str, pwd: &str) -> Self {
        self.session.ice_ufrag = Some(ufrag.to_string());
        self.session.ice_pwd = Some(pwd.to_string());
        self
    }

    pub fn ice_options(mut self, options: impl Into<String>) -> Self {
        self.session.ice_options = Some(options.into());
        self
    }

    pub fn fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.session.fingerprint = Some(fingerprint);
        self
    }

    pub fn setup(mut self, setup: Setup) -> Self {
        self.session.setup = Some(setup);
        self
    }

    /// Adds an `a=group` line, e.g. `BUNDLE 0`.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.session.groups.push(group.into());
        self
    }

    pub fn add_media(mut self, media: MediaDescription) -> Self {
        self.session.media.push(media);
        self
    }

    pub fn add_attribute(mut self, attr: Attribute) -> Self {
        self.session.attributes.push(attr);
        self
    }

    /// Builds and validates the `SessionDescription`.
    ///
    /// # Returns
    /// * `Ok(SessionDescription)` - If the description would parse back unchanged
    /// * `Err(DecodeError::MalformedSyntax)` - If validation fails
    pub fn build(self) -> Result<SessionDescription, DecodeError> {
        self.session.validate()?;
        Ok(self.session)
    }
}

impl SessionDescription {
    /// Checks the fields a serialized description must satisfy to parse.
    pub fn validate(&self) -> Result<(), DecodeError> {
        self.origin.validate()?;
        self.timing.validate()?;

        for media in &self.media {
            if media.formats.is_empty() {
                return Err(DecodeError::malformed(
                    "Media description must have at least one format",
                ));
            }
            for codec in &media.codecs {
                let listed = media
                    .formats
                    .iter()
                    .any(|f| f.parse::<u8>() == Ok(codec.payload_type));
                if !listed {
                    return Err(DecodeError::malformed(format!(
                        "Codec {} is not in the format list",
                        codec.payload_type
                    )));
                }
            }
        }

        Ok(())
    }
}
