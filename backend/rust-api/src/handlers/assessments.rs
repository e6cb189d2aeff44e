use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::{
    extractors::AppJson,
    handlers::error::ApiError,
    models::test::{
        CreateQuestionRequest, CreateTestRequest, ListQuestionsQuery, UpdateQuestionRequest,
        UpdateTestRequest,
    },
    services::{
        error::parse_object_id, question_service::QuestionService,
        settings_service::SettingsService, test_service::TestService, AppState,
    },
};

/// GET /api/tests - Admin listing with question and attempt counts
pub async fn list_tests(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let tests = TestService::new(&state.mongo).list().await?;
    Ok(Json(tests))
}

pub async fn get_test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "testId")?;
    let test = TestService::new(&state.mongo).get(&id).await?;
    Ok(Json(test))
}

/// POST /api/tests - Unset passingScore/maxAttempts fall back to the app settings
pub async fn create_test(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateTestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let settings = SettingsService::new(&state.mongo).current().await?;
    let test = TestService::new(&state.mongo).create(req, &settings).await?;

    tracing::info!(test_id = %test.id, video_id = %test.video_id, "Test created");
    Ok((StatusCode::CREATED, Json(test)))
}

pub async fn update_test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateTestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "testId")?;
    req.validate()?;
    let test = TestService::new(&state.mongo).update(&id, req).await?;
    Ok(Json(test))
}

pub async fn delete_test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "testId")?;
    TestService::new(&state.mongo).delete(&id).await?;
    Ok(Json(json!({ "message": "Test deleted successfully" })))
}

/// GET /api/tests/by-video/{videoId} - Learner view, answer keys stripped
pub async fn test_by_video(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let video_id = parse_object_id(&video_id, "videoId")?;
    let test = TestService::new(&state.mongo).by_video(&video_id).await?;
    Ok(Json(test))
}

/// GET /api/questions
pub async fn list_questions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuestionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let questions = QuestionService::new(&state.mongo).list(query).await?;
    Ok(Json(questions))
}

pub async fn get_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "questionId")?;
    let question = QuestionService::new(&state.mongo).get(&id).await?;
    Ok(Json(question))
}

pub async fn create_question(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateQuestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let question = QuestionService::new(&state.mongo).create(req).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn update_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "questionId")?;
    req.validate()?;
    let question = QuestionService::new(&state.mongo).update(&id, req).await?;
    Ok(Json(question))
}

pub async fn delete_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "questionId")?;
    QuestionService::new(&state.mongo).delete(&id).await?;
    Ok(Json(json!({ "message": "Question deleted successfully" })))
}
