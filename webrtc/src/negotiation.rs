//! Offer/answer negotiation for the audio echo
//!
//! Only audio sections sharing a codec with us are accepted. Every other
//! section is answered as rejected (port 0, `a=inactive`).

use std::net::{IpAddr, Ipv4Addr};

use ice::{Candidate, IceCredentials, IceError};
use sdp::{
    Codec, Connection, DecodeError, Direction, Fingerprint, MediaDescription, Origin, SdpCodec,
    SdpType, SessionDescription, Setup,
};
use tracing::debug;

use crate::errors::PeerConnectionError;

const AUDIO: &str = "audio";
const DEFAULT_PROTOCOL: &str = "UDP/TLS/RTP/SAVPF";
/// Payload type used for opus in locally generated offers
const OPUS_PAYLOAD_TYPE: u8 = 111;

/// Everything the local side contributes to a description.
#[derive(Debug, Clone, Copy)]
pub struct LocalParameters<'a> {
    pub credentials: &'a IceCredentials,
    pub fingerprint: &'a Fingerprint,
    pub candidates: &'a [Candidate],
    pub end_of_candidates: bool,
}

/// ICE parameters the peer put in its description.
#[derive(Debug, Clone)]
pub struct RemoteParameters {
    pub credentials: IceCredentials,
    pub candidates: Vec<Candidate>,
    pub end_of_candidates: bool,
}

/// `a=candidate` value for `candidate`, without the attribute name.
pub fn candidate_value(candidate: &Candidate) -> String {
    let text = candidate.to_string();
    match text.strip_prefix("candidate:") {
        Some(value) => value.to_string(),
        None => text,
    }
}

/// Indices of the sections we accept; audio only, shared codec required.
///
/// Without BUNDLE every accepted section would need its own transport, so
/// only the first one is accepted.
pub fn accepted_sections(codec: &SdpCodec, description: &SessionDescription) -> Vec<usize> {
    let accepted: Vec<usize> = description
        .media
        .iter()
        .enumerate()
        .filter(|(_, m)| {
            m.media_type == AUDIO
                && m.is_rtp()
                && !m.is_rejected()
                && !codec.supported_codecs(m).is_empty()
        })
        .map(|(i, _)| i)
        .collect();

    let bundled = description.bundle_mids().is_some_and(|mids| !mids.is_empty());
    if bundled {
        accepted
    } else {
        accepted.into_iter().take(1).collect()
    }
}

/// Extracts the peer's ICE credentials and candidates from its description.
///
/// Candidates that do not parse (e.g. mDNS host names) are skipped.
pub fn remote_parameters(
    codec: &SdpCodec,
    description: &SessionDescription,
) -> Result<RemoteParameters, PeerConnectionError> {
    let index = *accepted_sections(codec, description)
        .first()
        .ok_or(DecodeError::UnsupportedMedia)?;
    let media = &description.media[index];

    let (ufrag, pwd) = description
        .ice_credentials(media)
        .ok_or_else(|| DecodeError::MalformedSyntax("missing ICE credentials".to_string()))?;

    let candidates = media
        .candidates
        .iter()
        .filter_map(|value| match Candidate::parse(value) {
            Ok(candidate) => Some(candidate),
            Err(IceError::UnresolvedHostname(host)) => {
                debug!(%host, "Skipping unresolved candidate host name");
                None
            }
            Err(e) => {
                debug!(candidate = %value, error = %e, "Skipping invalid candidate");
                None
            }
        })
        .collect();

    Ok(RemoteParameters {
        credentials: IceCredentials::new(ufrag, pwd),
        candidates,
        end_of_candidates: media.end_of_candidates,
    })
}

/// Builds our answer to `offer`.
///
/// # Returns
/// * `Ok(SessionDescription)` - The answer, role `answer`
/// * `Err(PeerConnectionError::Decode(UnsupportedMedia))` - Nothing to accept
pub fn build_answer(
    codec: &SdpCodec,
    offer: &SessionDescription,
    local: LocalParameters<'_>,
) -> Result<SessionDescription, PeerConnectionError> {
    let accepted = accepted_sections(codec, offer);
    if accepted.is_empty() {
        return Err(DecodeError::UnsupportedMedia.into());
    }

    let mut builder = SessionDescription::builder(SdpType::Answer)
        .origin(new_origin())
        .ice_options("trickle");

    let mut bundle = Vec::new();
    for (index, offered) in offer.media.iter().enumerate() {
        let media = if accepted.contains(&index) {
            let setup = match offer.setup_for(offered) {
                Some(Setup::Passive) => Setup::Active,
                _ => Setup::Passive,
            };
            let codecs = codec.supported_codecs(offered).into_iter().cloned().collect();
            let mut media = transport_section(&offered.protocol, codecs, setup, local, index == accepted[0]);
            media.mid = offered.mid.clone();
            media.direction = Some(offered.direction.unwrap_or(Direction::SendRecv).reversed());
            media.rtcp_mux = offered.rtcp_mux;
            if let Some(ref mid) = offered.mid {
                bundle.push(mid.clone());
            }
            media
        } else {
            rejected_section(offered)
        };
        builder = builder.add_media(media);
    }

    if offer.bundle_mids().is_some() && !bundle.is_empty() {
        builder = builder.group(format!("BUNDLE {}", bundle.join(" ")));
    }

    Ok(builder.build()?)
}

/// Builds a local offer with a single sendrecv audio section.
pub fn build_offer(
    codec: &SdpCodec,
    local: LocalParameters<'_>,
) -> Result<SessionDescription, PeerConnectionError> {
    let codecs = offer_codecs(codec);
    if codecs.is_empty() {
        return Err(DecodeError::UnsupportedMedia.into());
    }

    let mut media = transport_section(DEFAULT_PROTOCOL, codecs, Setup::ActPass, local, true);
    media.mid = Some("0".to_string());
    media.direction = Some(Direction::SendRecv);
    media.rtcp_mux = true;

    Ok(SessionDescription::builder(SdpType::Offer)
        .origin(new_origin())
        .ice_options("trickle")
        .group("BUNDLE 0")
        .add_media(media)
        .build()?)
}

/// Payload types for our capabilities: static ones where defined, dynamic otherwise.
fn offer_codecs(codec: &SdpCodec) -> Vec<Codec> {
    let mut next_dynamic = OPUS_PAYLOAD_TYPE;
    codec
        .capabilities()
        .iter()
        .map(|cap| {
            let static_pt = [0u8, 8, 9]
                .into_iter()
                .find(|pt| Codec::from_static(*pt).is_some_and(|c| cap.matches(&c)));
            let payload_type = static_pt.unwrap_or_else(|| {
                let pt = next_dynamic;
                next_dynamic = next_dynamic.saturating_add(1);
                pt
            });
            Codec {
                channels: cap.channels,
                ..Codec::new(payload_type, cap.name.clone(), cap.clock_rate)
            }
        })
        .collect()
}

fn transport_section(
    protocol: &str,
    codecs: Vec<Codec>,
    setup: Setup,
    local: LocalParameters<'_>,
    carries_candidates: bool,
) -> MediaDescription {
    let mut media = MediaDescription::new(AUDIO, 9, protocol);
    media.formats = codecs.iter().map(|c| c.payload_type.to_string()).collect();
    media.codecs = codecs;
    media.connection = Some(Connection::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED)));
    media.ice_ufrag = Some(local.credentials.ufrag.clone());
    media.ice_pwd = Some(local.credentials.pwd.clone());
    media.fingerprint = Some(local.fingerprint.clone());
    media.setup = Some(setup);
    if carries_candidates {
        media.candidates = local.candidates.iter().map(candidate_value).collect();
        media.end_of_candidates = local.end_of_candidates;
    }
    media
}

fn rejected_section(offered: &MediaDescription) -> MediaDescription {
    let mut media = MediaDescription::new(offered.media_type.clone(), 0, offered.protocol.clone());
    media.formats = offered.formats.clone();
    media.mid = offered.mid.clone();
    media.direction = Some(Direction::Inactive);
    media
}

fn new_origin() -> Origin {
    Origin {
        // Kept below 2^63 as RFC 3264 recommends
        session_id: rand::random::<u64>() >> 1,
        session_version: 1,
        ..Origin::default()
    }
}
