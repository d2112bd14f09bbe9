use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::engine_error_response;
use crate::{
    models::{StartSessionRequest, SubmitAnswerRequest},
    services::{AppState, SessionEngine},
};

pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    req.validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    tracing::info!(
        "Starting session for user_id={}, assignment_id={:?}, template_id={:?}",
        req.user_id,
        req.assignment_id,
        req.template_id
    );

    let engine = SessionEngine::from_state(&state);
    match engine.start(&req).await {
        Ok(response) => Ok((StatusCode::CREATED, Json(response))),
        Err(e) => Err(engine_error_response(e)),
    }
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let engine = SessionEngine::from_state(&state);
    match engine.get_session(&session_id).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => Err(engine_error_response(e)),
    }
}

pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    req.validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    tracing::info!(
        "Submitting answer for session={}, question={}",
        session_id,
        req.question_id
    );

    let engine = SessionEngine::from_state(&state);
    match engine.submit_answer(&session_id, &req).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => Err(engine_error_response(e)),
    }
}

pub async fn pause_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Pausing session: {}", session_id);

    let engine = SessionEngine::from_state(&state);
    match engine.pause(&session_id).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => Err(engine_error_response(e)),
    }
}

pub async fn resume_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Resuming session: {}", session_id);

    let engine = SessionEngine::from_state(&state);
    match engine.resume(&session_id).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => Err(engine_error_response(e)),
    }
}

pub async fn finish_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Finishing session: {}", session_id);

    let engine = SessionEngine::from_state(&state);
    match engine.finish(&session_id).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => Err(engine_error_response(e)),
    }
}

pub async fn retake_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Retaking session: {}", session_id);

    let engine = SessionEngine::from_state(&state);
    match engine.retake(&session_id).await {
        Ok(response) => Ok((StatusCode::CREATED, Json(response))),
        Err(e) => Err(engine_error_response(e)),
    }
}
