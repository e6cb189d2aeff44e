#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    Database,
};
use serde_json::{json, Value};
use sicegah_api::{
    config::Config,
    create_router,
    services::{auth_service::AuthService, ensure_indexes, seed, AppState, USERS},
};
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_PASSWORD: &str = "Rahasia123";

pub struct TestApp {
    pub router: Router,
    pub db: Database,
}

pub async fn create_test_app() -> Router {
    spawn_app().await.router
}

/// Router plus a handle on the test database for fixtures that have no public endpoint.
pub async fn spawn_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    dotenvy::from_filename(".env.test").ok();
    std::env::set_var("RATE_LIMIT_DISABLED", "1");
    std::env::set_var("EMAIL_SEND_DISABLED", "1");

    let config = Config::load().expect("Failed to load test configuration");

    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .expect("Failed to connect to test MongoDB");
    let redis_client =
        redis::Client::open(config.redis_uri.clone()).expect("Failed to create test Redis client");

    let app_state = Arc::new(
        AppState::new(config, mongo_client, redis_client)
            .await
            .expect("Failed to initialize test app state"),
    );
    ensure_indexes(&app_state.mongo)
        .await
        .expect("Failed to create indexes");
    seed::seed_achievements(&app_state.mongo)
        .await
        .expect("Failed to seed achievements");

    let db = app_state.mongo.clone();
    TestApp {
        router: create_router(app_state),
        db,
    }
}

pub fn unique_email(prefix: &str) -> String {
    format!("{}-{}@example.com", prefix, uuid::Uuid::new_v4().simple())
}

/// Sends a JSON request, optionally as a bearer client, and returns status and parsed body.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn register(app: &Router, email: &str, role: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Ibu Sari",
            "email": email,
            "password": TEST_PASSWORD,
            "role": role,
            "province": "Jawa Barat",
        })),
    )
    .await
}

pub async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await
}

/// Registers a fresh user with `role` and returns (token, user id).
pub async fn user_token(app: &Router, role: &str) -> (String, String) {
    let email = unique_email(&role.to_lowercase());
    let (status, body) = register(app, &email, role).await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);

    let (status, body) = login(app, &email, TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().to_string(),
    )
}

/// Admins cannot self-register, so they are written straight to the database.
pub async fn admin_token(app: &TestApp) -> String {
    let email = unique_email("admin");
    let now = BsonDateTime::now();
    app.db
        .collection::<mongodb::bson::Document>(USERS)
        .insert_one(doc! {
            "email": &email,
            "password_hash": AuthService::hash_password(TEST_PASSWORD).unwrap(),
            "name": "Admin Test",
            "role": "ADMIN",
            "is_active": true,
            "created_at": now,
            "updated_at": now,
        })
        .await
        .expect("Failed to insert admin");

    let (status, body) = login(&app.router, &email, TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::OK, "admin login failed: {}", body);
    body["token"].as_str().unwrap().to_string()
}

/// A random, valid 11-character YouTube id.
pub fn youtube_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..11].to_string()
}

/// Creates category, video, test and two multiple choice questions (10 and 30 points).
/// Returns (video id, test id, question ids).
pub async fn create_test_fixture(app: &Router, admin: &str) -> (String, String, Vec<String>) {
    let (status, category) = send(
        app,
        "POST",
        "/api/video-categories",
        Some(admin),
        Some(json!({ "name": format!("Gizi {}", uuid::Uuid::new_v4().simple()) })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", category);

    let (status, video) = send(
        app,
        "POST",
        "/api/videos",
        Some(admin),
        Some(json!({
            "title": "MPASI pertama",
            "youtubeId": youtube_id(),
            "categoryId": category["id"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", video);
    let video_id = video["id"].as_str().unwrap().to_string();

    let (status, test) = send(
        app,
        "POST",
        "/api/tests",
        Some(admin),
        Some(json!({ "title": "Kuis MPASI", "videoId": video_id, "passingScore": 60 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", test);
    let test_id = test["id"].as_str().unwrap().to_string();

    let mut question_ids = Vec::new();
    for (order, (text, points)) in [("Usia mulai MPASI?", 10), ("Tekstur awal MPASI?", 30)]
        .into_iter()
        .enumerate()
    {
        let (status, question) = send(
            app,
            "POST",
            "/api/questions",
            Some(admin),
            Some(json!({
                "testId": test_id,
                "questionText": text,
                "type": "MULTIPLE_CHOICE",
                "options": ["A", "B", "C"],
                "correctAnswer": "A",
                "explanation": "Jawaban yang benar adalah A",
                "points": points,
                "order": order,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", question);
        question_ids.push(question["id"].as_str().unwrap().to_string());
    }

    (video_id, test_id, question_ids)
}
