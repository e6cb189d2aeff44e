use axum::{extract::Request, http::Method, middleware::Next, response::Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose, Engine as _};
use rand::Rng;

use super::auth::AuthSource;
use crate::handlers::error::ApiError;

pub const CSRF_COOKIE_NAME: &str = "csrf_token";
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Double-submit cookie check for state-changing requests.
///
/// Runs after `auth_middleware`. Only requests authenticated through the
/// `auth-token` cookie are checked; bearer clients cannot be forged by a
/// browser and pass through.
pub async fn csrf_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    if is_safe(request.method()) {
        return Ok(next.run(request).await);
    }
    if request.extensions().get::<AuthSource>() != Some(&AuthSource::Cookie) {
        return Ok(next.run(request).await);
    }

    let cookie_token = CookieJar::from_headers(request.headers())
        .get(CSRF_COOKIE_NAME)
        .map(|c| c.value().to_string());
    let header_token = request
        .headers()
        .get(CSRF_HEADER_NAME)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match (cookie_token, header_token) {
        (Some(cookie), Some(header)) if !cookie.is_empty() && cookie == header => {
            tracing::debug!("CSRF validation passed");
            Ok(next.run(request).await)
        }
        (None, _) => {
            tracing::warn!("CSRF validation failed: missing cookie token");
            Err(ApiError::forbidden("Missing CSRF token"))
        }
        (_, None) => {
            tracing::warn!("CSRF validation failed: missing header token");
            Err(ApiError::forbidden("Missing CSRF token"))
        }
        _ => {
            tracing::warn!("CSRF validation failed: token mismatch");
            Err(ApiError::forbidden("Invalid CSRF token"))
        }
    }
}

pub fn generate_csrf_token() -> String {
    let random_bytes: [u8; 32] = rand::rng().random();
    general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
}

pub fn csrf_cookie(token: String, secure: bool, same_site: SameSite) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(same_site)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request as HttpRequest, StatusCode},
        middleware,
        routing::post,
        Router,
    };
    use tower::ServiceExt;

    fn router(source: Option<AuthSource>) -> Router {
        Router::new()
            .route("/children", post(|| async { "created" }).get(|| async { "list" }))
            .layer(middleware::from_fn(csrf_middleware))
            .layer(middleware::from_fn(move |mut req: Request, next: Next| async move {
                if let Some(source) = source {
                    req.extensions_mut().insert(source);
                }
                next.run(req).await
            }))
    }

    async fn send(source: Option<AuthSource>, method: &str, cookie: Option<&str>, header_token: Option<&str>) -> StatusCode {
        let mut builder = HttpRequest::builder().method(method).uri("/children");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, format!("{}={}", CSRF_COOKIE_NAME, cookie));
        }
        if let Some(token) = header_token {
            builder = builder.header(CSRF_HEADER_NAME, token);
        }
        router(source)
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[test]
    fn tokens_are_unique_base64() {
        let token1 = generate_csrf_token();
        let token2 = generate_csrf_token();
        assert_ne!(token1, token2);
        assert!(general_purpose::URL_SAFE_NO_PAD.decode(&token1).is_ok());
    }

    #[tokio::test]
    async fn bearer_requests_are_exempt() {
        assert_eq!(send(Some(AuthSource::Bearer), "POST", None, None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn cookie_requests_need_matching_tokens() {
        let cookie = Some(AuthSource::Cookie);
        assert_eq!(send(cookie, "GET", None, None).await, StatusCode::OK);
        assert_eq!(send(cookie, "POST", None, Some("abc")).await, StatusCode::FORBIDDEN);
        assert_eq!(send(cookie, "POST", Some("abc"), None).await, StatusCode::FORBIDDEN);
        assert_eq!(send(cookie, "POST", Some("abc"), Some("xyz")).await, StatusCode::FORBIDDEN);
        assert_eq!(send(cookie, "POST", Some("abc"), Some("abc")).await, StatusCode::OK);
    }

    #[test]
    fn cookie_carries_configured_flags() {
        let cookie = csrf_cookie("t".into(), true, SameSite::Strict);
        assert_eq!(cookie.name(), CSRF_COOKIE_NAME);
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
    }
}
