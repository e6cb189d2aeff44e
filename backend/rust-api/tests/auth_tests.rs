use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
};
use serde_json::json;
use serial_test::serial;
use tower::ServiceExt;

mod common;

use common::{login, register, send, unique_email, TEST_PASSWORD};

/// Value of `name` from the response's Set-Cookie headers
fn cookie_value(response: &axum::response::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|c| c.starts_with(&format!("{}=", name)))
        .and_then(|c| c.split(';').next())
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value.to_string())
}

#[tokio::test]
#[serial]
async fn test_register_defaults_to_bidan() {
    let app = common::create_test_app().await;
    let email = unique_email("register");

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "name": "Bidan Rina", "email": email, "password": TEST_PASSWORD })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["user"]["email"], email);
    assert_eq!(json["user"]["role"], "BIDAN");
    assert!(json["user"].get("passwordHash").is_none());
}

#[tokio::test]
#[serial]
async fn test_register_rejects_admin_and_duplicates() {
    let app = common::create_test_app().await;
    let email = unique_email("dup");

    let (status, _) = register(&app, &unique_email("self-admin"), "ADMIN").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = register(&app, &email, "IBU").await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = register(&app, &email, "IBU").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], 409);
}

#[tokio::test]
#[serial]
async fn test_register_validation() {
    let app = common::create_test_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "email": unique_email("missing") })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("required"));

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "name": "X", "email": "not-an-email", "password": TEST_PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "name": "X", "email": unique_email("short"), "password": "12345" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[serial]
async fn test_login_wrong_password_is_unauthorized() {
    let app = common::create_test_app().await;
    let email = unique_email("wrongpw");
    register(&app, &email, "KADER").await;

    let (status, body) = login(&app, &email, "not-the-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);

    let (status, _) = login(&app, &unique_email("nobody"), TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial]
async fn test_cookie_session_requires_csrf_for_writes() {
    let app = common::create_test_app().await;
    let email = unique_email("cookie");
    register(&app, &email, "AYAH").await;

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "email": email, "password": TEST_PASSWORD }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let auth_cookie = cookie_value(&response, "auth-token").expect("auth-token cookie");
    let raw_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(raw_cookie.contains("HttpOnly"));

    // Reads with the cookie alone are fine
    let me = app
        .clone()
        .oneshot(
            Request::get("/api/auth/me")
                .header(header::COOKIE, format!("auth-token={}", auth_cookie))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::OK);

    // Writes without a CSRF token are refused
    let forged = app
        .clone()
        .oneshot(
            Request::post("/api/auth/logout")
                .header(header::COOKIE, format!("auth-token={}", auth_cookie))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::FORBIDDEN);

    let csrf = app
        .clone()
        .oneshot(
            Request::get("/api/auth/csrf-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let csrf_cookie = cookie_value(&csrf, "csrf_token").expect("csrf cookie");
    let body = to_bytes(csrf.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["csrfToken"], csrf_cookie);

    let logout = app
        .clone()
        .oneshot(
            Request::post("/api/auth/logout")
                .header(
                    header::COOKIE,
                    format!("auth-token={}; csrf_token={}", auth_cookie, csrf_cookie),
                )
                .header("x-csrf-token", &csrf_cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(logout.status(), StatusCode::OK);
    assert_eq!(cookie_value(&logout, "auth-token").as_deref(), Some(""));
}

#[tokio::test]
#[serial]
async fn test_me_requires_token() {
    let app = common::create_test_app().await;

    let (status, body) = send(&app, "GET", "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);

    let (status, _) = send(&app, "GET", "/api/auth/me", Some("garbage.token.value"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial]
async fn test_forgot_password_does_not_reveal_accounts() {
    let app = common::create_test_app().await;
    let known = unique_email("known");
    register(&app, &known, "IBU").await;

    let (status_known, body_known) = send(
        &app,
        "POST",
        "/api/auth/forgot-password",
        None,
        Some(json!({ "email": known })),
    )
    .await;
    let (status_unknown, body_unknown) = send(
        &app,
        "POST",
        "/api/auth/forgot-password",
        None,
        Some(json!({ "email": unique_email("unknown") })),
    )
    .await;

    assert_eq!(status_known, StatusCode::OK);
    assert_eq!(status_unknown, StatusCode::OK);
    assert_eq!(body_known, body_unknown);

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/forgot-password",
        None,
        Some(json!({ "email": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[serial]
async fn test_reset_code_and_token_validation() {
    let app = common::create_test_app().await;
    let email = unique_email("reset");
    register(&app, &email, "IBU").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/verify-reset-code",
        None,
        Some(json!({ "email": email, "code": "12ab" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Reset code must be 6 digits");

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/verify-reset-code",
        None,
        Some(json!({ "email": email, "code": "123456" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/reset-password",
        None,
        Some(json!({
            "token": "not-a-real-token",
            "password": "Baru12345",
            "confirmPassword": "Lain12345",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Passwords do not match");
}
