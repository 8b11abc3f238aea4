//! Shared setup for edge-auth-service integration tests.
//!
//! Builds the full router over in-memory stores, so tests need no
//! PostgreSQL or Redis.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use edge_auth_service::{
    build_router,
    config::{
        CacheConfig, DatabaseConfig, EdgeAuthConfig, Environment, GeolocationConfig,
        RateLimitConfig, RedisConfig, RouteConfig, SessionConfig,
    },
    middleware::RouteClassifier,
    services::{
        InMemoryIdentityDirectory, InMemoryResponseCache, InMemorySessionStore, ResponseCache,
        SessionManager, StaticCredentialVerifier,
    },
    AppState,
};
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_EMAIL: &str = "ada@example.com";
pub const TEST_PASSWORD: &str = "correct horse battery staple";
pub const TEST_USER_ID: &str = "user-ada";
pub const OTHER_USER_ID: &str = "user-bob";

pub fn test_config() -> EdgeAuthConfig {
    EdgeAuthConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "edge-auth-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 0,
        },
        redis: RedisConfig { url: String::new() },
        session: SessionConfig::default(),
        geolocation: GeolocationConfig::default(),
        routes: RouteConfig::default(),
        cache: CacheConfig::default(),
        rate_limit: RateLimitConfig {
            max_requests: 1000,
            window_seconds: 60,
        },
        allowed_origins: vec!["http://localhost:3000".to_string()],
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemorySessionStore>,
    pub cache: Arc<InMemoryResponseCache>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: EdgeAuthConfig) -> Self {
        let store = Arc::new(InMemorySessionStore::new());
        let cache = Arc::new(InMemoryResponseCache::new());
        Self::with_parts(config, store.clone(), cache.clone(), store, cache)
    }

    /// Wire the app over arbitrary store and cache implementations while
    /// keeping handles to in-memory doubles for inspection.
    pub fn with_parts(
        config: EdgeAuthConfig,
        store: Arc<InMemorySessionStore>,
        cache: Arc<InMemoryResponseCache>,
        session_store: Arc<dyn edge_auth_service::services::SessionStore>,
        response_cache: Arc<dyn ResponseCache>,
    ) -> Self {
        let config = Arc::new(config);
        let sessions = SessionManager::new(
            session_store,
            Arc::new(InMemoryIdentityDirectory::with_users([
                TEST_USER_ID,
                OTHER_USER_ID,
            ])),
            config.session.clone(),
            config.geolocation.tracking_enabled,
        );

        let state = AppState {
            config: config.clone(),
            sessions,
            credentials: Arc::new(StaticCredentialVerifier::new().with_account(
                TEST_EMAIL,
                TEST_PASSWORD,
                TEST_USER_ID,
            )),
            cache: response_cache,
            routes: RouteClassifier::new(&config.routes),
            metrics: None,
            ip_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.max_requests,
                config.rate_limit.window_seconds,
            ),
        };

        Self {
            router: build_router(state.clone()),
            state,
            store,
            cache,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.state.config.session.cookie_name
    }

    /// `Cookie` header value presenting `token`.
    pub fn session_cookie(&self, token: &str) -> String {
        format!("{}={}", self.cookie_name(), token)
    }

    /// Create a session directly through the manager and return its token.
    pub async fn sign_in_as(&self, user_id: &str) -> String {
        self.state
            .sessions
            .create_session(user_id, &Default::default(), None)
            .await
            .unwrap()
            .token
    }

    /// Wait for a detached cache write to land.
    pub async fn wait_for_cache_entries(&self, expected: usize) {
        for _ in 0..100 {
            if self.cache.len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "cache never reached {} entries (has {})",
            expected,
            self.cache.len()
        );
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::HOST, "edge.test")
        .body(Body::empty())
        .unwrap()
}

pub fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::HOST, "edge.test")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// The `name=value` part of a `Set-Cookie` header for `name`.
pub fn set_cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{}=", name)))
        .and_then(|v| v.split(';').next())
        .map(|pair| pair[name.len() + 1..].to_string())
}
