use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use metrics::counter;
use service_core::error::AppError;

use super::routes::RouteClass;
use crate::config::RouteConfig;
use crate::models::{GeolocationRecord, Session};
use crate::services::extract_geolocation;
use crate::AppState;

pub const USER_IP_HEADER: &str = "x-user-ip";
pub const USER_COUNTRY_HEADER: &str = "x-user-country";
pub const USER_REGION_HEADER: &str = "x-user-region";
pub const USER_CITY_HEADER: &str = "x-user-city";

/// Prefix shared by the mirrored geolocation headers.
pub const USER_HEADER_PREFIX: &str = "x-user-";

/// Session resolved for the current request, with the token that presented it.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub session: Session,
    pub token: String,
}

/// Marker left in request extensions when a session cookie was presented
/// but the store could not be asked about it.
#[derive(Debug, Clone, Copy)]
pub struct SessionLookupFailed;

/// Route guard: redirects per route class and exposes the resolved session
/// to downstream handlers.
///
/// A store failure counts as "no session" for routing. Protected paths then
/// redirect to sign-in and every other path passes through with
/// [`SessionLookupFailed`] set, so session endpoints answer 503 rather than
/// acting as if signed out.
pub async fn auth_guard_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let class = state.routes.classify(&path);
    let routes = &state.config.routes;

    let token = jar
        .get(&state.config.session.cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty());

    let session = match &token {
        Some(token) => match state.sessions.resolve_session(token).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, path = %path, "Session resolution failed");
                if class == RouteClass::Protected {
                    counter!("auth_guard_redirects_total", "reason" => "store_unavailable")
                        .increment(1);
                    return redirect(&routes.sign_in_path);
                }
                req.extensions_mut().insert(SessionLookupFailed);
                None
            }
        },
        None => None,
    };

    match (class, &session) {
        (RouteClass::Protected, None) => {
            counter!("auth_guard_redirects_total", "reason" => "unauthenticated").increment(1);
            tracing::debug!(path = %path, "Redirecting unauthenticated request to sign-in");
            return redirect(&sign_in_location(routes, &path));
        }
        (RouteClass::AuthOnly, Some(_)) => {
            counter!("auth_guard_redirects_total", "reason" => "authenticated").increment(1);
            return redirect(&routes.landing_path);
        }
        _ => {}
    }

    let geolocation = extract_geolocation(req.headers());

    if let (Some(session), Some(token)) = (session, token) {
        req.extensions_mut().insert(CurrentSession { session, token });
    }

    let mut response = next.run(req).await;
    mirror_geolocation(response.headers_mut(), &geolocation);
    response
}

/// Sign-in URL carrying `path` as the callback parameter.
pub fn sign_in_location(routes: &RouteConfig, path: &str) -> String {
    let callback = urlencoding::encode(path).replace("%2F", "/");
    format!(
        "{}?{}={}",
        routes.sign_in_path, routes.callback_param, callback
    )
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Invalid redirect location");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Copy edge geolocation onto response headers for rendering layers.
pub fn mirror_geolocation(headers: &mut HeaderMap, geolocation: &GeolocationRecord) {
    let fields = [
        (USER_IP_HEADER, &geolocation.ip),
        (USER_COUNTRY_HEADER, &geolocation.country),
        (USER_REGION_HEADER, &geolocation.region),
        (USER_CITY_HEADER, &geolocation.city),
    ];

    for (name, value) in fields {
        if let Some(value) = value.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

fn session_from_parts(parts: &Parts) -> Result<Option<CurrentSession>, AppError> {
    if let Some(current) = parts.extensions.get::<CurrentSession>() {
        return Ok(Some(current.clone()));
    }
    if parts.extensions.get::<SessionLookupFailed>().is_some() {
        return Err(AppError::ServiceUnavailable(
            "session store unreachable during lookup".to_string(),
        ));
    }
    Ok(None)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        session_from_parts(parts)?
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Not signed in")))
    }
}

/// Session if one was presented and found; `None` when signed out. Rejects
/// with 503 when the lookup itself failed.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<CurrentSession>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for MaybeSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        session_from_parts(parts).map(MaybeSession)
    }
}
