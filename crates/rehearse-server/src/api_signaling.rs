//! Handlers for the signaling service.

use crate::api::ApiError;
use crate::SignalingState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
};
use rehearse_types::{
    AnswerResponse, CandidateRequest, CreateSessionResponse, OfferRequest, SdpType,
};

/// Handler for `POST /sessions`.
pub async fn create_session_handler(
    Extension(state): Extension<SignalingState>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let session_id = state.store.create_session()?;
    tracing::info!(%session_id, "signaling session created");
    Ok(Json(CreateSessionResponse { session_id }))
}

/// Handler for `POST /sessions/{id}/offer`.
///
/// Creates the record on first use and overwrites any earlier offer.
pub async fn submit_offer_handler(
    Extension(state): Extension<SignalingState>,
    Path(session_id): Path<String>,
    Json(payload): Json<OfferRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    if payload.offer.kind != SdpType::Offer {
        return Err(ApiError::BadRequest(format!(
            "expected an offer, got {}",
            payload.offer.kind
        )));
    }
    let answer = state.store.submit_offer(&session_id, payload.offer)?;
    tracing::debug!(%session_id, "offer answered");
    Ok(Json(AnswerResponse { answer }))
}

/// Handler for `POST /sessions/{id}/ice`.
pub async fn submit_candidate_handler(
    Extension(state): Extension<SignalingState>,
    Path(session_id): Path<String>,
    Json(payload): Json<CandidateRequest>,
) -> Result<StatusCode, ApiError> {
    state.store.submit_candidate(&session_id, payload.candidate)?;
    Ok(StatusCode::NO_CONTENT)
}
