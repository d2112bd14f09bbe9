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
    models::credit::{CreditBalanceResponse, CreditHistoryResponse, GrantCreditsRequest},
    services::AppState,
};

pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match state.credits.available_credits(&user_id).await {
        Ok(available_credits) => Ok((
            StatusCode::OK,
            Json(CreditBalanceResponse {
                user_id,
                available_credits,
            }),
        )),
        Err(e) => Err(engine_error_response(e)),
    }
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match state.credits.history(&user_id).await {
        Ok(entries) => Ok((
            StatusCode::OK,
            Json(CreditHistoryResponse { user_id, entries }),
        )),
        Err(e) => Err(engine_error_response(e)),
    }
}

/// Appends a top-up entry (purchase or bonus). Consumption and refunds are
/// only ever written by the engine itself.
pub async fn grant_credits(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<GrantCreditsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    req.validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    tracing::info!(
        "Granting {} credits to user {} ({})",
        req.credits,
        user_id,
        req.description
    );

    let result = state
        .credits
        .add_entry(
            &user_id,
            req.kind.into(),
            req.credits,
            &req.description,
            req.source_ref.clone(),
            req.expires_at,
        )
        .await;

    match result {
        Ok(entry) => Ok((StatusCode::CREATED, Json(entry))),
        Err(e) => Err(engine_error_response(e)),
    }
}
