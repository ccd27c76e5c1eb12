//! Connectivity check messages.
//!
//! Checks are STUN Binding requests authenticated with short-term
//! credentials: USERNAME is `<remote ufrag>:<local ufrag>` and
//! MESSAGE-INTEGRITY is keyed with the password of the agent receiving
//! the request (RFC 8445 Section 7.2.2).

use std::net::SocketAddr;
use std::time::Duration;

use stun::{AttributeType, Message, MessageBuilder, MessageClass, MessageType};
use stun::{StunError, random_transaction_id};
use tracing::trace;

use crate::credentials::IceCredentials;
use crate::errors::IceError;
use crate::transport::LocalPath;

/// Why an incoming check was refused; answered with a STUN error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    BadRequest,
    Unauthorized,
    RoleConflict,
}

impl Rejection {
    pub fn code(&self) -> u16 {
        match self {
            Rejection::BadRequest => 400,
            Rejection::Unauthorized => 401,
            Rejection::RoleConflict => 487,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::BadRequest => "Bad Request",
            Rejection::Unauthorized => "Unauthorized",
            Rejection::RoleConflict => "Role Conflict",
        }
    }
}

/// Fields of an authenticated incoming check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCheck {
    pub remote_ufrag: String,
    pub priority: u32,
    pub use_candidate: bool,
}

/// Builds an outgoing connectivity check for the controlled role.
///
/// # Arguments
/// * `local` - Our credentials (right half of USERNAME)
/// * `remote` - The peer's credentials; the password keys the integrity
/// * `priority` - Peer-reflexive priority of the local candidate
/// * `tie_breaker` - Role conflict tie-breaker of this agent
pub fn build_binding_request(
    local: &IceCredentials,
    remote: &IceCredentials,
    priority: u32,
    tie_breaker: u64,
) -> Result<Message, StunError> {
    MessageBuilder::new(MessageType::binding_request())
        .transaction_id(random_transaction_id())
        .username(&format!("{}:{}", remote.ufrag, local.ufrag))
        .attribute(AttributeType::Priority, &priority.to_be_bytes())
        .attribute(AttributeType::IceControlled, &tie_breaker.to_be_bytes())
        .message_integrity(remote.pwd.as_bytes())
        .fingerprint()
        .build()
}

/// Sends `request` to `remote` over `path` and validates the answer.
///
/// # Returns
/// * `Ok(SocketAddr)` - Our address as seen by the peer
/// * `Err(IceError::CheckTimeout)` - No answer within `timeout`
/// * `Err(IceError::CheckFailed)` - Error response or bad integrity
/// * `Err(IceError::Closed)` - The path was torn down mid-check
pub async fn perform_connectivity_check(
    path: &LocalPath,
    remote: SocketAddr,
    request: &Message,
    remote_pwd: &str,
    timeout: Duration,
) -> Result<SocketAddr, IceError> {
    let response = path.transact(request, remote, timeout).await?;
    let message = response.message;

    match message.message_type().class {
        MessageClass::SuccessResponse => {
            message.verify_fingerprint()?;
            message
                .verify_message_integrity(remote_pwd.as_bytes())
                .map_err(|e| IceError::CheckFailed(e.to_string()))?;
            let mapped = message
                .mapped_address()
                .ok_or(IceError::MissingRequiredField("XOR-MAPPED-ADDRESS"))?;
            trace!(path = path.id(), %remote, %mapped, "Connectivity check succeeded");
            Ok(mapped)
        }
        MessageClass::ErrorResponse => {
            let (code, reason) = message.error_code().unwrap_or((0, String::new()));
            Err(IceError::CheckFailed(format!("{} {}", code, reason)))
        }
        _ => Err(IceError::CheckFailed("unexpected message class".to_string())),
    }
}

/// Authenticates an incoming check addressed to `local`.
pub fn validate_incoming_request(
    message: &Message,
    local: &IceCredentials,
) -> Result<IncomingCheck, Rejection> {
    if message.verify_fingerprint().is_err() {
        return Err(Rejection::BadRequest);
    }

    let username = message
        .get_string(AttributeType::Username)
        .ok_or(Rejection::BadRequest)?;
    if !message.has_attribute(AttributeType::MessageIntegrity) {
        return Err(Rejection::BadRequest);
    }

    let (target, remote_ufrag) = username.split_once(':').ok_or(Rejection::Unauthorized)?;
    if target != local.ufrag {
        return Err(Rejection::Unauthorized);
    }
    message
        .verify_message_integrity(local.pwd.as_bytes())
        .map_err(|_| Rejection::Unauthorized)?;

    // Both sides claiming the controlled role
    if message.has_attribute(AttributeType::IceControlled) {
        return Err(Rejection::RoleConflict);
    }

    let priority = message
        .get_u32(AttributeType::Priority)
        .ok_or(Rejection::BadRequest)?;

    Ok(IncomingCheck {
        remote_ufrag: remote_ufrag.to_string(),
        priority,
        use_candidate: message.has_attribute(AttributeType::UseCandidate),
    })
}

/// Success response echoing the requester's address.
pub fn success_response(
    request: &Message,
    from: SocketAddr,
    local_pwd: &str,
) -> Result<Message, StunError> {
    MessageBuilder::new(MessageType::binding_success())
        .transaction_id(request.transaction_id())
        .xor_address(AttributeType::XorMappedAddress, from)
        .message_integrity(local_pwd.as_bytes())
        .fingerprint()
        .build()
}

pub fn error_response(request: &Message, rejection: Rejection) -> Result<Message, StunError> {
    let mut message = Message::new(MessageType::binding_error(), request.transaction_id());
    message.add_error_code(rejection.code(), rejection.reason());
    message.add_fingerprint();
    Ok(message)
}
