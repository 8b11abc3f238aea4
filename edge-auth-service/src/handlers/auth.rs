//! Sign-in, sign-out and current-session endpoints.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use service_core::error::AppError;

use crate::{
    config::SessionConfig,
    dtos::auth::{RevokeResponse, SessionResponse, SignInRequest},
    middleware::{CurrentSession, MaybeSession},
    services::{extract_geolocation, ServiceError},
    utils::ValidatedJson,
    AppState,
};

/// Session cookie carrying `token`, living as long as the session.
pub fn session_cookie(config: &SessionConfig, token: String) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(config.expires_in_seconds))
        .build()
}

pub fn clear_session_cookie(config: &SessionConfig, jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(config.cookie_name.clone()).path("/"))
}

/// Sign in with email and password
#[utoipa::path(
    post,
    path = "/api/auth/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Session created, cookie set", body = SessionResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 503, description = "Session store unavailable", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<SignInRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    let user_id = state
        .credentials
        .verify(&req.email, &req.password)
        .await
        .map_err(ServiceError::StoreUnavailable)?
        .ok_or(ServiceError::InvalidCredentials)?;

    let geolocation = extract_geolocation(&headers);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());

    let session = state
        .sessions
        .create_session(&user_id, &geolocation, user_agent)
        .await?;

    let jar = jar.add(session_cookie(
        state.sessions.config(),
        session.token.clone(),
    ));
    Ok((jar, Json(SessionResponse::from(session))))
}

/// Sign out of the current session
#[utoipa::path(
    post,
    path = "/api/auth/sign-out",
    responses(
        (status = 200, description = "Signed out; succeeds without a session too", body = RevokeResponse),
        (status = 503, description = "Session store unavailable", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn sign_out(
    State(state): State<AppState>,
    MaybeSession(current): MaybeSession,
    jar: CookieJar,
) -> Result<(CookieJar, Json<RevokeResponse>), AppError> {
    if let Some(current) = current {
        state.sessions.revoke_session(&current.session.id).await?;
    }

    let jar = clear_session_cookie(state.sessions.config(), jar);
    Ok((jar, Json(RevokeResponse { success: true })))
}

/// Current session with its geolocation snapshot
#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Current session", body = SessionResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn current_session(current: CurrentSession) -> Json<SessionResponse> {
    Json(SessionResponse::from(current.session))
}
