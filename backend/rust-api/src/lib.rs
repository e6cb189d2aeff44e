use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

use handlers::error::ApiError;
use middlewares::{csrf::CSRF_HEADER_NAME, trace::TRACE_ID_HEADER};

type AppRouter = Router<Arc<AppState>>;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             img-src 'self' data: https://img.youtube.com; \
             frame-src https://www.youtube.com; \
             connect-src 'self'",
        ),
    );
    response
}

async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(CSRF_HEADER_NAME),
            HeaderName::from_static(TRACE_ID_HEADER),
        ])
        .expose_headers([HeaderName::from_static(TRACE_ID_HEADER)])
        .allow_origin(tower_http::cors::Any);

    let api = public_auth_routes(app_state.clone()).merge(
        user_routes()
            .merge(admin_routes())
            .route_layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::rate_limit::rate_limit_middleware,
            ))
            .route_layer(middleware::from_fn(middlewares::csrf::csrf_middleware))
            .route_layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
    );

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api", api)
        .fallback(route_not_found)
        .with_state(app_state)
        .layer(middleware::from_fn(handlers::error::json_method_not_allowed))
        .layer(middleware::from_fn(csp_middleware))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Unauthenticated auth endpoints; the abuse-prone ones carry their own per-IP limits.
fn public_auth_routes(app_state: Arc<AppState>) -> AppRouter {
    let register_route = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::register_rate_limit_middleware,
        ));

    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::login_rate_limit_middleware,
        ));

    let forgot_password_route = Router::new()
        .route(
            "/auth/forgot-password",
            post(handlers::auth::forgot_password),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::rate_limit::forgot_password_rate_limit_middleware,
        ));

    let open_routes = Router::new()
        .route("/auth/csrf-token", get(handlers::auth::csrf_token))
        .route(
            "/auth/verify-reset-code",
            post(handlers::auth::verify_reset_code),
        )
        .route("/auth/reset-password", post(handlers::auth::reset_password));

    register_route
        .merge(login_route)
        .merge(forgot_password_route)
        .merge(open_routes)
}

/// Any authenticated user
fn user_routes() -> AppRouter {
    Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/logout", post(handlers::auth::logout))
        // Profile and achievements
        .route(
            "/users/profile",
            get(handlers::users::get_profile).put(handlers::users::update_profile),
        )
        .route(
            "/users/{id}/achievements",
            get(handlers::users::user_achievements),
        )
        // Children of the caller
        .route(
            "/children",
            get(handlers::children::list_children).post(handlers::children::create_child),
        )
        .route(
            "/children/{id}",
            get(handlers::children::get_child)
                .put(handlers::children::update_child)
                .delete(handlers::children::delete_child),
        )
        // Learning content
        .route("/videos", get(handlers::videos::list_videos))
        .route("/videos/{id}", get(handlers::videos::get_video))
        .route("/video-categories", get(handlers::videos::list_categories))
        .route("/video-progress", post(handlers::videos::record_progress))
        .route(
            "/tests/by-video/{video_id}",
            get(handlers::assessments::test_by_video),
        )
        // Test taking
        .route(
            "/test-attempts",
            get(handlers::attempts::list_attempts).post(handlers::attempts::start_attempt),
        )
        .route(
            "/test-attempts/{id}/complete",
            put(handlers::attempts::complete_attempt),
        )
        .route(
            "/test-attempts/{id}/results",
            get(handlers::attempts::attempt_results),
        )
        .route("/user-answers", post(handlers::attempts::submit_answer))
        // Notifications
        .route(
            "/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/notifications/{id}/read",
            put(handlers::notifications::mark_read),
        )
}

/// ADMIN role only. Paths shared with `user_routes` differ by method.
fn admin_routes() -> AppRouter {
    Router::new()
        // User management
        .route("/users", get(handlers::users::list_users))
        .route(
            "/users/{id}",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        // Videos and categories
        .route("/videos", post(handlers::videos::create_video))
        .route("/videos/stats", get(handlers::videos::video_stats))
        .route(
            "/videos/{id}",
            put(handlers::videos::update_video).delete(handlers::videos::delete_video),
        )
        .route(
            "/video-categories",
            post(handlers::videos::create_category),
        )
        .route(
            "/video-categories/stats",
            get(handlers::videos::category_stats),
        )
        .route(
            "/video-categories/{id}",
            get(handlers::videos::get_category)
                .put(handlers::videos::update_category)
                .delete(handlers::videos::delete_category),
        )
        // Tests and questions
        .route(
            "/tests",
            get(handlers::assessments::list_tests).post(handlers::assessments::create_test),
        )
        .route(
            "/tests/{id}",
            get(handlers::assessments::get_test)
                .put(handlers::assessments::update_test)
                .delete(handlers::assessments::delete_test),
        )
        .route(
            "/questions",
            get(handlers::assessments::list_questions)
                .post(handlers::assessments::create_question),
        )
        .route(
            "/questions/{id}",
            get(handlers::assessments::get_question)
                .put(handlers::assessments::update_question)
                .delete(handlers::assessments::delete_question),
        )
        // Analytics
        .route("/statistics", get(handlers::statistics::statistics))
        .route(
            "/dashboard/stats",
            get(handlers::statistics::dashboard_stats),
        )
        .route(
            "/settings",
            get(handlers::settings::get_settings).put(handlers::settings::update_settings),
        )
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
}
