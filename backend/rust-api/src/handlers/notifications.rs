use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    handlers::error::ApiError,
    middlewares::auth::JwtClaims,
    models::notification::ListNotificationsQuery,
    services::{error::parse_object_id, notification_service::NotificationService, AppState},
};

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let notifications = NotificationService::new(&state.mongo)
        .list(&claims.user_id()?, query)
        .await?;
    Ok(Json(notifications))
}

/// PUT /api/notifications/{id}/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "notificationId")?;
    let notification = NotificationService::new(&state.mongo)
        .mark_read(&claims.user_id()?, &id)
        .await?;
    Ok(Json(notification))
}
