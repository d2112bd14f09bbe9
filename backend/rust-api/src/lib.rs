#![allow(dead_code)]

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'self' 'unsafe-inline'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https:; \
             connect-src 'self'",
        ),
    );
    response
}

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    // CORS configuration for the session/credit API consumed by the web UI
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any); // TODO: restrict to specific origins in production

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .merge(sessions_routes().layer(cors.clone()))
        .nest("/api/v1/credits", credits_routes().layer(cors))
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware)) // Apply CSP to all responses
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

fn sessions_routes() -> Router<std::sync::Arc<services::AppState>> {
    // Full paths registered directly (not via `nest`): axum 0.8's
    // `nest("/api/v1/sessions", route("/"))` matches `/api/v1/sessions` but
    // not the trailing-slash collection path `/api/v1/sessions/`. Registering
    // the explicit paths makes the collection endpoint reachable at the
    // documented `/api/v1/sessions/`.
    Router::new()
        .route("/api/v1/sessions/", post(handlers::sessions::start_session))
        .route("/api/v1/sessions/{id}", get(handlers::sessions::get_session))
        .route(
            "/api/v1/sessions/{id}/answers",
            post(handlers::sessions::submit_answer),
        )
        .route(
            "/api/v1/sessions/{id}/pause",
            post(handlers::sessions::pause_session),
        )
        .route(
            "/api/v1/sessions/{id}/resume",
            post(handlers::sessions::resume_session),
        )
        .route(
            "/api/v1/sessions/{id}/finish",
            post(handlers::sessions::finish_session),
        )
        .route(
            "/api/v1/sessions/{id}/retake",
            post(handlers::sessions::retake_session),
        )
}

fn credits_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/{user_id}", get(handlers::credits::get_balance))
        .route("/{user_id}/history", get(handlers::credits::get_history))
        .route("/{user_id}/entries", post(handlers::credits::grant_credits))
}
