use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
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
    models::video::{
        CategoryRequest, CreateVideoRequest, ListVideosQuery, RecordProgressRequest,
        UpdateVideoRequest,
    },
    services::{
        category_service::CategoryService, error::parse_object_id,
        video_progress_service::VideoProgressService, video_service::VideoService,
        youtube_service::YoutubeService, AppState,
    },
};

fn youtube(state: &AppState) -> YoutubeService<'_> {
    YoutubeService::new(&state.http, state.config.youtube_api_key.as_deref())
}

/// GET /api/videos
pub async fn list_videos(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListVideosQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let videos = VideoService::new(&state.mongo).list(query).await?;
    Ok(Json(videos))
}

/// GET /api/videos/{id} - Video with category, test summary and progress counts
pub async fn get_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "videoId")?;
    let video = VideoService::new(&state.mongo).get(&id).await?;
    Ok(Json(video))
}

/// POST /api/videos
pub async fn create_video(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<CreateVideoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let video = VideoService::new(&state.mongo)
        .create(req, &youtube(&state))
        .await?;

    tracing::info!(admin_id = %claims.sub, video_id = %video.id, "Video created");
    Ok((StatusCode::CREATED, Json(video)))
}

/// PUT /api/videos/{id}
pub async fn update_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateVideoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "videoId")?;
    req.validate()?;
    let video = VideoService::new(&state.mongo)
        .update(&id, req, &youtube(&state))
        .await?;
    Ok(Json(video))
}

/// DELETE /api/videos/{id} - Refused while a test is attached
pub async fn delete_video(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "videoId")?;
    VideoService::new(&state.mongo).delete(&id).await?;

    tracing::info!(admin_id = %claims.sub, video_id = %id, "Video deleted");
    Ok(Json(json!({ "message": "Video deleted successfully" })))
}

/// GET /api/videos/stats
pub async fn video_stats(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let stats = VideoService::new(&state.mongo).stats().await?;
    Ok(Json(stats))
}

/// GET /api/video-categories - Active categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let categories = CategoryService::new(&state.mongo).list().await?;
    Ok(Json(categories))
}

pub async fn get_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "categoryId")?;
    let category = CategoryService::new(&state.mongo).get(&id).await?;
    Ok(Json(category))
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let category = CategoryService::new(&state.mongo).create(req).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<CategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "categoryId")?;
    req.validate()?;
    let category = CategoryService::new(&state.mongo).update(&id, req).await?;
    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "categoryId")?;
    CategoryService::new(&state.mongo).delete(&id).await?;
    Ok(Json(json!({ "message": "Category deleted successfully" })))
}

/// GET /api/video-categories/stats
pub async fn category_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = CategoryService::new(&state.mongo).stats().await?;
    Ok(Json(stats))
}

/// POST /api/video-progress - Upsert the caller's progress on one video
pub async fn record_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<RecordProgressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let progress = VideoProgressService::new(&state.mongo)
        .record(&claims.user_id()?, req)
        .await?;
    Ok(Json(progress))
}
