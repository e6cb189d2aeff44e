use axum::{
    extract::{Path, State},
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
    models::child::ChildRequest,
    services::{child_service::ChildService, error::parse_object_id, AppState},
};

// Every operation is scoped to the caller; a child owned by someone else reads as 404.

pub async fn list_children(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let children = ChildService::new(&state.mongo)
        .list(&claims.user_id()?)
        .await?;
    Ok(Json(children))
}

pub async fn create_child(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<ChildRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let parent_id = claims.user_id()?;
    let child = ChildService::new(&state.mongo).create(&parent_id, req).await?;

    tracing::info!(parent_id = %parent_id, child_id = %child.id, "Child created");
    Ok((StatusCode::CREATED, Json(child)))
}

pub async fn get_child(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let child_id = parse_object_id(&id, "childId")?;
    let child = ChildService::new(&state.mongo)
        .get(&claims.user_id()?, &child_id)
        .await?;
    Ok(Json(child))
}

pub async fn update_child(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(req): AppJson<ChildRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let child_id = parse_object_id(&id, "childId")?;
    let child = ChildService::new(&state.mongo)
        .update(&claims.user_id()?, &child_id, req)
        .await?;
    Ok(Json(child))
}

pub async fn delete_child(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let parent_id = claims.user_id()?;
    let child_id = parse_object_id(&id, "childId")?;
    ChildService::new(&state.mongo)
        .delete(&parent_id, &child_id)
        .await?;

    tracing::info!(parent_id = %parent_id, child_id = %child_id, "Child deleted");
    Ok(Json(json!({ "message": "Child deleted successfully" })))
}
