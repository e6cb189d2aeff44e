use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Extensions, HeaderMap},
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;

use super::auth::JwtClaims;
use crate::handlers::error::ApiError;
use crate::metrics::RATE_LIMIT_REJECTIONS_TOTAL;
use crate::services::AppState;

const RATE_LIMIT_PER_USER: u32 = 100; // requests per minute
const RATE_LIMIT_PER_IP: u32 = 200; // requests per minute
const RATE_WINDOW_SECONDS: u64 = 60;

const TOO_MANY_REQUESTS: &str = "Too many requests, please try again later";

/// Fixed-window limit for one public auth endpoint, keyed by client IP.
#[derive(Debug, Clone, Copy)]
pub struct EndpointLimit {
    pub scope: &'static str,
    pub limit: u32,
    pub window_seconds: u64,
    /// Environment variable that overrides `limit`
    pub env_override: &'static str,
}

pub const LOGIN_LIMIT: EndpointLimit = EndpointLimit {
    scope: "login",
    limit: 10,
    window_seconds: 300,
    env_override: "RATE_LIMIT_LOGIN_ATTEMPTS",
};

pub const REGISTER_LIMIT: EndpointLimit = EndpointLimit {
    scope: "register",
    limit: 5,
    window_seconds: 3600,
    env_override: "RATE_LIMIT_REGISTER_ATTEMPTS",
};

pub const FORGOT_PASSWORD_LIMIT: EndpointLimit = EndpointLimit {
    scope: "forgot_password",
    limit: 3,
    window_seconds: 900,
    env_override: "RATE_LIMIT_FORGOT_PASSWORD_ATTEMPTS",
};

fn rate_limit_disabled() -> bool {
    std::env::var("RATE_LIMIT_DISABLED").unwrap_or_default() == "1"
}

fn env_limit(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(default)
}

fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    // Preferred order: X-Forwarded-For, Forwarded, X-Real-IP, ConnectInfo
    if let Some(first) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
    {
        return first.trim().to_string();
    }

    if let Some(forwarded) = headers.get("forwarded").and_then(|v| v.to_str().ok()) {
        if let Some(addr) = forwarded
            .split(';')
            .map(str::trim)
            .find_map(|part| part.strip_prefix("for="))
        {
            return addr.trim().trim_matches('"').to_string();
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return real_ip.trim().to_string();
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn rejected(scope: &str, subject: &str) -> ApiError {
    RATE_LIMIT_REJECTIONS_TOTAL.with_label_values(&[scope]).inc();
    tracing::warn!(scope = %scope, subject = %subject, "Rate limit exceeded");
    ApiError::TooManyRequests(TOO_MANY_REQUESTS.to_string())
}

/// General limit applied to authenticated routes, per user and per IP.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if rate_limit_disabled() {
        tracing::debug!("Rate limiting disabled via RATE_LIMIT_DISABLED=1");
        return Ok(next.run(request).await);
    }

    let ip = client_ip(request.headers(), request.extensions());

    if let Some(uid) = request.extensions().get::<JwtClaims>().map(|c| c.sub.clone()) {
        let limit = env_limit("RATE_LIMIT_PER_USER", RATE_LIMIT_PER_USER);
        let allowed = check_rate_limit(
            &state.redis,
            &format!("ratelimit:user:{}", uid),
            limit,
            RATE_WINDOW_SECONDS,
        )
        .await?;
        if !allowed {
            return Err(rejected("user", &uid));
        }
    }

    let limit = env_limit("RATE_LIMIT_PER_IP", RATE_LIMIT_PER_IP);
    let allowed = check_rate_limit(
        &state.redis,
        &format!("ratelimit:ip:{}", ip),
        limit,
        RATE_WINDOW_SECONDS,
    )
    .await?;
    if !allowed {
        return Err(rejected("ip", &ip));
    }

    Ok(next.run(request).await)
}

async fn limit_endpoint(
    state: &AppState,
    rule: EndpointLimit,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if rate_limit_disabled() {
        return Ok(next.run(request).await);
    }

    let ip = client_ip(request.headers(), request.extensions());
    let allowed = check_rate_limit(
        &state.redis,
        &format!("ratelimit:{}:{}", rule.scope, ip),
        env_limit(rule.env_override, rule.limit),
        rule.window_seconds,
    )
    .await?;
    if !allowed {
        return Err(rejected(rule.scope, &ip));
    }

    Ok(next.run(request).await)
}

/// 10 login attempts per 5 minutes per IP
pub async fn login_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    limit_endpoint(&state, LOGIN_LIMIT, request, next).await
}

/// 5 registrations per hour per IP
pub async fn register_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    limit_endpoint(&state, REGISTER_LIMIT, request, next).await
}

/// 3 reset code requests per 15 minutes per IP
pub async fn forgot_password_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    limit_endpoint(&state, FORGOT_PASSWORD_LIMIT, request, next).await
}

/// Atomic fixed-window counter. Returns false once `limit` is reached.
async fn check_rate_limit(
    redis: &ConnectionManager,
    key: &str,
    limit: u32,
    window_seconds: u64,
) -> anyhow::Result<bool> {
    let mut conn = redis.clone();

    let lua_script = r#"
        local key = KEYS[1]
        local limit = tonumber(ARGV[1])
        local window = tonumber(ARGV[2])

        local current = redis.call('GET', key)

        if current == false then
            redis.call('SET', key, 1, 'EX', window)
            return 1
        end

        current = tonumber(current)

        if current >= limit then
            return 0
        end

        redis.call('INCR', key)
        return 1
    "#;

    let allowed: u32 = redis::Script::new(lua_script)
        .key(key)
        .arg(limit)
        .arg(window_seconds)
        .invoke_async(&mut conn)
        .await?;

    Ok(allowed == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn proxy_headers_take_precedence() {
        let mut headers = HeaderMap::new();
        let mut exts = Extensions::new();
        exts.insert(ConnectInfo::<SocketAddr>("7.7.7.7:1234".parse().unwrap()));
        assert_eq!(client_ip(&headers, &exts), "7.7.7.7");

        headers.insert("x-real-ip", "9.9.9.9".parse().unwrap());
        assert_eq!(client_ip(&headers, &exts), "9.9.9.9");

        headers.insert("forwarded", "for=\"5.6.7.8\";proto=https".parse().unwrap());
        assert_eq!(client_ip(&headers, &exts), "5.6.7.8");

        headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, &exts), "1.2.3.4");
    }

    #[test]
    fn unknown_client_without_any_source() {
        assert_eq!(client_ip(&HeaderMap::new(), &Extensions::new()), "unknown");
    }

    #[test]
    fn rejection_is_counted_and_returns_429() {
        let before = RATE_LIMIT_REJECTIONS_TOTAL
            .with_label_values(&["rate_limit_test"])
            .get();
        let response = rejected("rate_limit_test", "1.2.3.4").into_response();
        assert_eq!(response.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            RATE_LIMIT_REJECTIONS_TOTAL
                .with_label_values(&["rate_limit_test"])
                .get(),
            before + 1
        );
    }

    #[test]
    fn auth_endpoint_limits_are_distinct() {
        let scopes = [LOGIN_LIMIT.scope, REGISTER_LIMIT.scope, FORGOT_PASSWORD_LIMIT.scope];
        assert_eq!(scopes, ["login", "register", "forgot_password"]);
        assert!(FORGOT_PASSWORD_LIMIT.limit < LOGIN_LIMIT.limit);
    }
}
