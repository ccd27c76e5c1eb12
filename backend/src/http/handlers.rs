//! Signaling endpoint handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::http::error::ApiError;
use crate::http::messages::{
    CandidatesRequest, CandidatesResponse, HealthResponse, OfferRequest, OfferResponse,
    SessionResponse,
};
use crate::http::server::AppState;

pub async fn offer(
    State(state): State<AppState>,
    payload: Result<Json<OfferRequest>, JsonRejection>,
) -> Result<Json<OfferResponse>, ApiError> {
    let Json(request) = payload?;
    let outcome = state
        .signaling
        .handle_offer(request.sdp_type, &request.sdp, request.client_id)
        .await?;
    Ok(Json(outcome.into()))
}

pub async fn candidates(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    payload: Result<Json<CandidatesRequest>, JsonRejection>,
) -> Result<Json<CandidatesResponse>, ApiError> {
    let Json(request) = payload?;
    let candidates = state
        .signaling
        .handle_candidates(&session_id, &request.candidates, request.end_of_candidates)
        .await?;
    Ok(Json(CandidatesResponse { candidates }))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let status = state.signaling.session_status(&session_id)?;
    Ok(Json(status.into()))
}

/// Responds once the session is closed and no longer registered.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.signaling.close_session(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sessions: state.signaling.live_sessions(),
    })
}
