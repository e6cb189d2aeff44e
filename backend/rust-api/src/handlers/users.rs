use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::{
    extractors::AppJson,
    handlers::error::ApiError,
    middlewares::auth::JwtClaims,
    models::user::{ListUsersQuery, UpdateProfileRequest, UpdateUserRequest},
    services::{error::parse_object_id, user_service::UserService, AppState},
};

/// GET /api/users - Admin user listing with per-user activity counts
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUsersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let users = UserService::new(&state.mongo).list(query).await?;
    Ok(Json(users))
}

/// GET /api/users/{id}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "userId")?;
    let user = UserService::new(&state.mongo).get(&id).await?;
    Ok(Json(user))
}

/// PUT /api/users/{id}
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "userId")?;
    req.validate()?;
    let user = UserService::new(&state.mongo).update(&id, req).await?;

    tracing::info!(admin_id = %claims.sub, user_id = %id, "User updated");
    Ok(Json(user))
}

/// DELETE /api/users/{id} - Only users without children or attempts
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "userId")?;
    UserService::new(&state.mongo).delete(&id).await?;

    tracing::info!(admin_id = %claims.sub, user_id = %id, "User deleted");
    Ok(Json(json!({ "message": "User deleted successfully" })))
}

/// GET /api/users/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = UserService::new(&state.mongo)
        .profile(&claims.user_id()?)
        .await?;
    Ok(Json(profile))
}

/// PUT /api/users/profile - Role and email are not editable here
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let profile = UserService::new(&state.mongo)
        .update_profile(&claims.user_id()?, req)
        .await?;
    Ok(Json(profile))
}

/// GET /api/users/{id}/achievements - Self or admin
pub async fn user_achievements(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "userId")?;
    if id != claims.user_id()? && !claims.is_admin() {
        return Err(ApiError::forbidden("You can only view your own achievements"));
    }

    let achievements = UserService::new(&state.mongo).achievements(&id).await?;
    Ok(Json(achievements))
}
