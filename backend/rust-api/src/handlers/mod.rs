use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Map, Value};
use std::{sync::Arc, time::Duration};

use crate::metrics;
use crate::services::AppState;
use error::ApiError;

pub mod assessments;
pub mod attempts;
pub mod auth;
pub mod children;
pub mod error;
pub mod notifications;
pub mod settings;
pub mod statistics;
pub mod users;
pub mod videos;

const MONGO_PING_TIMEOUT: Duration = Duration::from_secs(1);
const REDIS_PING_TIMEOUT: Duration = Duration::from_millis(500);

/// GET /health - 200 when MongoDB and Redis answer, 503 otherwise
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (mongo_health, redis_health) = tokio::join!(check_mongodb(&state), check_redis(&state));

    let all_healthy = [&mongo_health, &redis_health]
        .iter()
        .all(|dep| dep.get("status").and_then(Value::as_str) == Some("healthy"));

    let mut dependencies = Map::new();
    dependencies.insert("mongodb".to_string(), Value::Object(mongo_health));
    dependencies.insert("redis".to_string(), Value::Object(redis_health));

    let (status_code, status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "sicegah-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": dependencies
        })),
    )
}

fn dependency_status(outcome: Result<(), String>, ok_message: &str) -> Map<String, Value> {
    let mut result = Map::new();
    match outcome {
        Ok(()) => {
            result.insert("status".to_string(), json!("healthy"));
            result.insert("message".to_string(), json!(ok_message));
        }
        Err(error) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(error));
        }
    }
    result
}

async fn check_mongodb(state: &AppState) -> Map<String, Value> {
    let outcome = match tokio::time::timeout(
        MONGO_PING_TIMEOUT,
        state.mongo.run_command(mongodb::bson::doc! { "ping": 1 }),
    )
    .await
    {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("MongoDB error: {}", e)),
        Err(_) => Err("MongoDB timeout after 1s".to_string()),
    };
    dependency_status(outcome, "MongoDB connection successful")
}

async fn check_redis(state: &AppState) -> Map<String, Value> {
    let mut conn = state.redis.clone();
    let outcome = match tokio::time::timeout(
        REDIS_PING_TIMEOUT,
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("Redis error: {}", e)),
        Err(_) => Err("Redis timeout after 500ms".to_string()),
    };
    dependency_status(outcome, "Redis connection successful")
}

/// GET /metrics - Prometheus text format
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// True when `header_value` is `Basic base64(expected)`.
fn basic_auth_matches(header_value: &str, expected: &str) -> bool {
    let Some(encoded) = header_value.strip_prefix("Basic ") else {
        return false;
    };
    general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .is_some_and(|credentials| credentials == expected)
}

/// Protects /metrics with HTTP Basic auth against `METRICS_AUTH` (`user:password`).
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());

    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|value| basic_auth_matches(value, &expected));

    if !authorized {
        tracing::warn!("Rejected /metrics request with missing or invalid credentials");
        return Err(ApiError::Unauthorized("Invalid metrics credentials".into()));
    }

    Ok(next.run(request).await)
}
