//! Device list and remote revocation for the signed-in user.

use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;

use super::auth::clear_session_cookie;
use crate::{
    dtos::auth::{RevokeAllResponse, RevokeResponse, SessionListResponse},
    middleware::CurrentSession,
    AppState,
};

/// List the current user's active sessions
#[utoipa::path(
    get,
    path = "/api/auth/sessions",
    responses(
        (status = 200, description = "Active sessions, newest first", body = SessionListResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 503, description = "Session store unavailable", body = ErrorResponse)
    ),
    tag = "Sessions"
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    current: CurrentSession,
) -> Result<Json<SessionListResponse>, AppError> {
    let sessions = state
        .sessions
        .list_sessions(&current.session.user_id, Some(current.token.as_str()))
        .await?;
    Ok(Json(SessionListResponse { sessions }))
}

/// Revoke one of the current user's sessions
///
/// Always reports success, whether or not the id names a session the
/// user owns.
#[utoipa::path(
    delete,
    path = "/api/auth/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Revoked (or nothing to revoke)", body = RevokeResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 503, description = "Session store unavailable", body = ErrorResponse)
    ),
    tag = "Sessions"
)]
pub async fn revoke_session(
    State(state): State<AppState>,
    current: CurrentSession,
    Path(id): Path<String>,
) -> Result<Json<RevokeResponse>, AppError> {
    state
        .sessions
        .revoke_user_session(&current.session.user_id, &id)
        .await?;
    Ok(Json(RevokeResponse { success: true }))
}

/// Revoke every session of the current user, this one included
#[utoipa::path(
    delete,
    path = "/api/auth/sessions",
    responses(
        (status = 200, description = "All sessions revoked, cookie cleared", body = RevokeAllResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 503, description = "Session store unavailable", body = ErrorResponse)
    ),
    tag = "Sessions"
)]
pub async fn revoke_all_sessions(
    State(state): State<AppState>,
    current: CurrentSession,
    jar: CookieJar,
) -> Result<(CookieJar, Json<RevokeAllResponse>), AppError> {
    let revoked = state
        .sessions
        .revoke_all_sessions(&current.session.user_id)
        .await?;

    let jar = clear_session_cookie(state.sessions.config(), jar);
    Ok((
        jar,
        Json(RevokeAllResponse {
            success: true,
            revoked,
        }),
    ))
}
