use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::{
    extractors::AppJson,
    handlers::error::ApiError,
    middlewares::{
        auth::{JwtClaims, JwtService, AUTH_COOKIE_NAME},
        csrf::{csrf_cookie, generate_csrf_token},
    },
    models::{
        id_hex,
        user::{
            ForgotPasswordRequest, LoginRequest, LoginResponse, RegisterRequest,
            ResetPasswordRequest, UserResponse, VerifyResetCodeRequest,
        },
    },
    services::{
        auth_service::{AuthService, FORGOT_PASSWORD_MESSAGE},
        email_service::mailer_from_settings,
        settings_service::SettingsService,
        AppState,
    },
};

fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(
        &state.mongo,
        state.redis.clone(),
        JwtService::new(&state.config.jwt_secret),
        state.config.jwt_ttl_seconds,
    )
}

fn session_cookie(state: &AppState, token: String, max_age: time::Duration) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .secure(state.config.cookie.secure)
        .same_site(state.config.cookie.parse_same_site())
        .max_age(max_age)
        .build()
}

/// POST /api/auth/register - Register a new non-admin user
pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Name, email, and password are required"));
    }
    req.validate()?;

    let settings = SettingsService::new(&state.mongo).current().await?;
    let user = auth_service(&state).register(req, &settings).await?;

    tracing::info!(user_id = %id_hex(&user.id), "User registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "user": UserResponse::from(user),
        })),
    ))
}

/// POST /api/auth/login - Exchange credentials for a JWT (body and httpOnly cookie)
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let (token, user) = auth_service(&state).login(req).await?;
    let max_age = time::Duration::seconds(state.config.jwt_ttl_seconds);
    let jar = jar.add(session_cookie(&state, token.clone(), max_age));

    Ok((
        jar,
        Json(LoginResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// POST /api/auth/logout - Clear the session cookie
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    jar: CookieJar,
) -> impl IntoResponse {
    tracing::info!(user_id = %claims.sub, "User logged out");

    let jar = jar.add(session_cookie(&state, String::new(), time::Duration::ZERO));
    (jar, Json(json!({ "message": "Logged out successfully" })))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let user = auth_service(&state).get_user(&claims.user_id()?).await?;
    Ok(Json(UserResponse::from(user)))
}

/// GET /api/auth/csrf-token - Issue a double-submit token as cookie and body
pub async fn csrf_token(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let token = generate_csrf_token();
    let cookie = csrf_cookie(
        token.clone(),
        state.config.cookie.secure,
        state.config.cookie.parse_same_site(),
    );
    (jar.add(cookie), Json(json!({ "csrfToken": token })))
}

/// POST /api/auth/forgot-password
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.email.trim().is_empty() {
        return Err(ApiError::bad_request("Email is required"));
    }
    req.validate()?;

    let mailer = mailer_from_settings(&state.config.mail);
    auth_service(&state)
        .forgot_password(&req.email, mailer.as_ref())
        .await?;

    Ok(Json(json!({ "message": FORGOT_PASSWORD_MESSAGE })))
}

/// POST /api/auth/verify-reset-code
pub async fn verify_reset_code(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<VerifyResetCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = auth_service(&state).verify_reset_code(req).await?;
    Ok(Json(response))
}

/// POST /api/auth/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth_service(&state).reset_password(req).await?;
    Ok(Json(json!({ "message": "Password has been reset successfully" })))
}
