use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    extractors::AppJson,
    handlers::error::ApiError,
    middlewares::auth::JwtClaims,
    models::attempt::{ListAttemptsQuery, StartAttemptRequest, SubmitAnswerRequest},
    services::{attempt_service::AttemptService, error::parse_object_id, AppState},
};

/// POST /api/test-attempts - Start an attempt, or resume the open one (200)
pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<StartAttemptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.user_id()?;
    let (response, created) = AttemptService::new(&state.mongo)
        .start(&user_id, req)
        .await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(response)))
}

/// GET /api/test-attempts - Completed attempts, newest first
pub async fn list_attempts(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(query): Query<ListAttemptsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let latest_only = query.latest.unwrap_or(false);
    let attempts = AttemptService::new(&state.mongo)
        .list(&claims, query)
        .await?;

    if latest_only {
        return Ok(Json(json!(attempts.into_iter().next())));
    }
    Ok(Json(json!(attempts)))
}

/// POST /api/user-answers
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let answer = AttemptService::new(&state.mongo)
        .submit_answer(&claims.user_id()?, req)
        .await?;
    Ok(Json(answer))
}

/// PUT /api/test-attempts/{id}/complete - Score, grant achievements, notify
pub async fn complete_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let attempt_id = parse_object_id(&id, "attemptId")?;
    let completed = AttemptService::new(&state.mongo)
        .complete(&claims.user_id()?, &attempt_id)
        .await?;
    Ok(Json(completed))
}

/// GET /api/test-attempts/{id}/results - Owner or admin
pub async fn attempt_results(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let attempt_id = parse_object_id(&id, "attemptId")?;
    let results = AttemptService::new(&state.mongo)
        .results(&claims, &attempt_id)
        .await?;
    Ok(Json(results))
}
