mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    body_json, get as get_request, get_with_cookie, set_cookie_value, test_config, TestApp,
    OTHER_USER_ID, TEST_EMAIL, TEST_PASSWORD, TEST_USER_ID,
};
use edge_auth_service::{
    models::{GeolocationRecord, Session},
    services::{InMemoryResponseCache, InMemorySessionStore, SessionStore, StoreError},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tower::util::ServiceExt;

fn sign_in_request(email: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/auth/sign-in")
        .header(header::HOST, "edge.test")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "Mozilla/5.0 (X11; Linux x86_64)")
        .header("cf-connecting-ip", "203.0.113.9")
        .header("cf-ipcountry", "US")
        .header("cf-region", "Washington")
        .header("cf-city", "Seattle")
        .header("cf-timezone", "America/Los_Angeles")
        .body(Body::from(
            serde_json::json!({ "email": email, "password": password }).to_string(),
        ))
        .unwrap()
}

fn request_with_cookie(method: Method, uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "edge.test")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn sign_in_sets_cookie_and_captures_geolocation() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(sign_in_request(TEST_EMAIL, TEST_PASSWORD))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let token = set_cookie_value(&response, app.cookie_name()).expect("session cookie set");
    assert_eq!(token.len(), 64);

    let body = body_json(response).await;
    assert_eq!(body["session"]["userId"], TEST_USER_ID);
    assert_eq!(body["session"]["country"], "US");
    assert_eq!(body["session"]["ipAddress"], "203.0.113.9");
    assert_eq!(body["location"], "Seattle, Washington, US");
    assert!(body["session"].get("token").is_none());

    let current = app
        .router
        .clone()
        .oneshot(get_with_cookie(
            "/api/auth/session",
            &app.session_cookie(&token),
        ))
        .await
        .unwrap();
    assert_eq!(current.status(), StatusCode::OK);
    let current = body_json(current).await;
    assert_eq!(current["geolocation"]["timezone"], "America/Los_Angeles");
}

#[tokio::test]
async fn sign_in_with_wrong_password_is_unauthorized() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(sign_in_request(TEST_EMAIL, "wrong"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie_value(&response, app.cookie_name()).is_none());
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn sign_in_validates_email() {
    let app = TestApp::new();

    let response = app
        .router
        .oneshot(sign_in_request("not-an-email", TEST_PASSWORD))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn session_endpoints_require_a_session() {
    let app = TestApp::new();

    for uri in ["/api/auth/session", "/api/auth/sessions"] {
        let response = app.router.clone().oneshot(get_request(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

#[tokio::test]
async fn list_marks_the_current_session() {
    let app = TestApp::new();
    let seattle = GeolocationRecord {
        country: Some("US".to_string()),
        city: Some("Seattle".to_string()),
        ..Default::default()
    };
    let session = app
        .state
        .sessions
        .create_session(TEST_USER_ID, &seattle, None)
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get_with_cookie(
            "/api/auth/sessions",
            &app.session_cookie(&session.token),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["isCurrent"], true);
    assert_eq!(sessions[0]["country"], "US");
    assert_eq!(sessions[0]["location"], "Seattle, US");
}

#[tokio::test]
async fn list_excludes_other_users_sessions() {
    let app = TestApp::new();
    let mine = app.sign_in_as(TEST_USER_ID).await;
    app.sign_in_as(TEST_USER_ID).await;
    app.sign_in_as(OTHER_USER_ID).await;

    let response = app
        .router
        .clone()
        .oneshot(get_with_cookie(
            "/api/auth/sessions",
            &app.session_cookie(&mine),
        ))
        .await
        .unwrap();

    let body = body_json(response).await;
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(
        sessions.iter().filter(|s| s["isCurrent"] == true).count(),
        1
    );
}

#[tokio::test]
async fn revoking_twice_reports_success_both_times() {
    let app = TestApp::new();
    let mine = app.sign_in_as(TEST_USER_ID).await;
    let other_device = app
        .state
        .sessions
        .create_session(TEST_USER_ID, &GeolocationRecord::default(), None)
        .await
        .unwrap();
    let uri = format!("/api/auth/sessions/{}", other_device.id);

    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(request_with_cookie(
                Method::DELETE,
                &uri,
                &app.session_cookie(&mine),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["success"], true);
    }

    assert!(app
        .state
        .sessions
        .resolve_session(&other_device.token)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn revoking_another_users_session_is_a_silent_no_op() {
    let app = TestApp::new();
    let mine = app.sign_in_as(TEST_USER_ID).await;
    let theirs = app
        .state
        .sessions
        .create_session(OTHER_USER_ID, &GeolocationRecord::default(), None)
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(request_with_cookie(
            Method::DELETE,
            &format!("/api/auth/sessions/{}", theirs.id),
            &app.session_cookie(&mine),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);
    assert!(app
        .state
        .sessions
        .resolve_session(&theirs.token)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn revoke_all_ends_the_current_session_too() {
    let app = TestApp::new();
    let mine = app.sign_in_as(TEST_USER_ID).await;
    app.sign_in_as(TEST_USER_ID).await;
    let theirs = app.sign_in_as(OTHER_USER_ID).await;

    let response = app
        .router
        .clone()
        .oneshot(request_with_cookie(
            Method::DELETE,
            "/api/auth/sessions",
            &app.session_cookie(&mine),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(set_cookie_value(&response, app.cookie_name()).as_deref(), Some(""));
    let body = body_json(response).await;
    assert_eq!(body["revoked"], 2);

    let after = app
        .router
        .clone()
        .oneshot(get_with_cookie(
            "/api/auth/session",
            &app.session_cookie(&mine),
        ))
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
    assert!(app
        .state
        .sessions
        .resolve_session(&theirs)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn sign_out_revokes_and_clears_cookie() {
    let app = TestApp::new();
    let token = app.sign_in_as(TEST_USER_ID).await;

    let response = app
        .router
        .clone()
        .oneshot(request_with_cookie(
            Method::POST,
            "/api/auth/sign-out",
            &app.session_cookie(&token),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(set_cookie_value(&response, app.cookie_name()).as_deref(), Some(""));
    assert!(app.store.is_empty());

    // Signing out again without a live session still succeeds.
    let again = app
        .router
        .clone()
        .oneshot(request_with_cookie(
            Method::POST,
            "/api/auth/sign-out",
            &app.session_cookie(&token),
        ))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::OK);
}

#[tokio::test]
async fn context_reports_edge_geolocation() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/api/context")
        .header(header::HOST, "edge.test")
        .header("cf-ipcountry", "FR")
        .header("cf-city", "Paris")
        .header("cf-timezone", "Europe/Paris")
        .body(Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["location"], "Paris, FR");
    assert_eq!(body["timezoneValid"], true);
    assert_eq!(body["authenticated"], false);
    assert_eq!(body["geolocation"]["country"], "FR");
}

#[tokio::test]
async fn health_reports_both_backends() {
    let app = TestApp::new();

    let response = app.router.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["session_store"], "up");
    assert_eq!(body["checks"]["response_cache"], "up");
}

#[tokio::test]
async fn openapi_document_lists_session_routes() {
    let app = TestApp::new();

    let response = app
        .router
        .oneshot(get_request("/.well-known/openapi.json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["paths"]["/api/auth/sessions/{id}"].is_object());
    assert!(body["paths"]["/api/auth/sign-in"].is_object());
}

/// In-memory store whose token lookups can be switched off.
struct LookupOutageStore {
    inner: Arc<InMemorySessionStore>,
    lookups_down: AtomicBool,
}

#[async_trait]
impl SessionStore for LookupOutageStore {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        self.inner.create(session).await
    }
    async fn get_by_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        if self.lookups_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(anyhow::anyhow!("connection reset")));
        }
        self.inner.get_by_token(token).await
    }
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        self.inner.list_by_user(user_id).await
    }
    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }
    async fn delete_all_by_user(&self, user_id: &str) -> Result<u64, StoreError> {
        self.inner.delete_all_by_user(user_id).await
    }
    async fn refresh(
        &self,
        id: &str,
        expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.refresh(id, expires_at, updated_at).await
    }
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.delete_expired(now).await
    }
    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.health_check().await
    }
}

#[tokio::test]
async fn lookup_outage_is_retryable_and_never_fakes_sign_out() {
    let inner = Arc::new(InMemorySessionStore::new());
    let store = Arc::new(LookupOutageStore {
        inner: inner.clone(),
        lookups_down: AtomicBool::new(false),
    });
    let cache = Arc::new(InMemoryResponseCache::new());
    let app = TestApp::with_parts(test_config(), inner, cache.clone(), store.clone(), cache);
    let token = app.sign_in_as(TEST_USER_ID).await;
    let cookie = app.session_cookie(&token);

    store.lookups_down.store(true, Ordering::SeqCst);

    let sign_out = app
        .router
        .clone()
        .oneshot(request_with_cookie(Method::POST, "/api/auth/sign-out", &cookie))
        .await
        .unwrap();
    assert_eq!(sign_out.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(sign_out.headers().get(header::RETRY_AFTER).unwrap(), "1");
    assert!(set_cookie_value(&sign_out, app.cookie_name()).is_none());
    assert_eq!(app.store.len(), 1);

    for (method, uri) in [
        (Method::GET, "/api/auth/session"),
        (Method::GET, "/api/auth/sessions"),
        (Method::DELETE, "/api/auth/sessions"),
    ] {
        let response = app
            .router
            .clone()
            .oneshot(request_with_cookie(method.clone(), uri, &cookie))
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::SERVICE_UNAVAILABLE,
            "{} {}",
            method,
            uri
        );
    }

    store.lookups_down.store(false, Ordering::SeqCst);

    assert!(app
        .state
        .sessions
        .resolve_session(&token)
        .await
        .unwrap()
        .is_some());
    let retried = app
        .router
        .clone()
        .oneshot(request_with_cookie(Method::POST, "/api/auth/sign-out", &cookie))
        .await
        .unwrap();
    assert_eq!(retried.status(), StatusCode::OK);
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn sign_out_without_a_cookie_still_succeeds_during_an_outage() {
    let inner = Arc::new(InMemorySessionStore::new());
    let store = Arc::new(LookupOutageStore {
        inner: inner.clone(),
        lookups_down: AtomicBool::new(true),
    });
    let cache = Arc::new(InMemoryResponseCache::new());
    let app = TestApp::with_parts(test_config(), inner, cache.clone(), store, cache);

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/auth/sign-out")
                .header(header::HOST, "edge.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
