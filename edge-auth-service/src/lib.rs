pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{ip_rate_limit_middleware, IpRateLimiter},
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::config::EdgeAuthConfig;
use crate::middleware::{auth_guard_middleware, edge_cache_middleware, RouteClassifier};
use crate::services::{CredentialVerifier, ResponseCache, SessionManager};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::auth::sign_in,
        handlers::auth::sign_out,
        handlers::auth::current_session,
        handlers::sessions::list_sessions,
        handlers::sessions::revoke_session,
        handlers::sessions::revoke_all_sessions,
        handlers::context::get_context,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::SignInRequest,
            dtos::auth::SessionResponse,
            dtos::auth::SessionListResponse,
            dtos::auth::RevokeResponse,
            dtos::auth::RevokeAllResponse,
            dtos::context::ContextResponse,
            models::Session,
            models::SessionSummary,
            models::GeolocationRecord,
        )
    ),
    tags(
        (name = "Authentication", description = "Sign-in, sign-out and the current session"),
        (name = "Sessions", description = "Device list and remote revocation"),
        (name = "Context", description = "Edge geolocation context"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

/// Shared application state, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EdgeAuthConfig>,
    pub sessions: SessionManager,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub cache: Arc<dyn ResponseCache>,
    pub routes: RouteClassifier,
    pub metrics: Option<PrometheusHandle>,
    pub ip_rate_limiter: IpRateLimiter,
}

pub fn build_router(state: AppState) -> Router {
    let ip_limiter = state.ip_rate_limiter.clone();

    let api = Router::new()
        .route("/api/auth/sign-in", post(handlers::auth::sign_in))
        .route("/api/auth/sign-out", post(handlers::auth::sign_out))
        .route("/api/auth/session", get(handlers::auth::current_session))
        .route(
            "/api/auth/sessions",
            get(handlers::sessions::list_sessions).delete(handlers::sessions::revoke_all_sessions),
        )
        .route(
            "/api/auth/sessions/:id",
            delete(handlers::sessions::revoke_session),
        )
        .route("/api/context", get(handlers::context::get_context));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(api)
        .fallback(handlers::pages::render_page)
        .with_state(state.clone())
        // Innermost: resolves the session before any handler runs
        .layer(from_fn_with_state(state.clone(), auth_guard_middleware))
        .layer(from_fn_with_state(state.clone(), edge_cache_middleware))
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(cors_layer(&state.config.allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ]);

    // Credentialed CORS cannot be combined with a wildcard origin.
    if allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", origin, e);
                None
            }
        })
        .collect();

    layer.allow_origin(origins).allow_credentials(true)
}
