use axum::{extract::State, response::IntoResponse, Extension, Json};
use serde_json::json;
use std::sync::Arc;

use crate::{
    extractors::AppJson,
    handlers::error::ApiError,
    middlewares::auth::JwtClaims,
    models::settings::UpdateSettingsRequest,
    services::{settings_service::SettingsService, AppState},
};

/// GET /api/settings - Stored values merged over defaults
pub async fn get_settings(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let settings = SettingsService::new(&state.mongo).current().await?;
    Ok(Json(settings))
}

/// PUT /api/settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<UpdateSettingsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = SettingsService::new(&state.mongo).update(req).await?;

    tracing::info!(admin_id = %claims.sub, "Settings updated");
    Ok(Json(json!({
        "message": "Settings updated successfully",
        "settings": settings,
    })))
}
