use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    handlers::error::ApiError,
    models::statistics::StatisticsQuery,
    services::{
        dashboard_service::DashboardService, statistics_service::StatisticsService, AppState,
    },
};

/// GET /api/statistics?period=&role= - Admin analytics over a period and its predecessor
pub async fn statistics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatisticsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let started = std::time::Instant::now();
    let response = StatisticsService::new(&state.mongo).overview(query).await?;

    tracing::debug!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        questions = response.question_analysis.len(),
        "Statistics computed"
    );
    Ok(Json(response))
}

/// GET /api/dashboard/stats
pub async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = DashboardService::new(&state.mongo).stats().await?;
    Ok(Json(stats))
}
