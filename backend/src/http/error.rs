//! Mapping of signaling failures to HTTP responses.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;
use webrtc::PeerConnectionError;

use crate::application::usecases::SignalingError;
use crate::http::messages::ErrorBody;
use crate::infrastructure::RegistryError;

const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Error returned by every handler, rendered as `{ "error": <message> }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn peer_connection_status(err: &PeerConnectionError) -> StatusCode {
    match err {
        PeerConnectionError::Decode(_) | PeerConnectionError::InvalidCandidate(_) => {
            StatusCode::BAD_REQUEST
        }
        PeerConnectionError::InvalidTransition { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<SignalingError> for ApiError {
    fn from(err: SignalingError) -> Self {
        let status = match &err {
            SignalingError::BadRequest(_) => StatusCode::BAD_REQUEST,
            SignalingError::Registry(RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
            SignalingError::Registry(RegistryError::ResourceExhausted { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SignalingError::Registry(RegistryError::Connection(e))
            | SignalingError::PeerConnection(e) => peer_connection_status(e),
        };

        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!(error = %err, "Signaling request failed");
            INTERNAL_ERROR_MESSAGE.to_string()
        } else {
            err.to_string()
        };
        Self { status, message }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}
