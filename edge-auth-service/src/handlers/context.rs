use axum::{http::HeaderMap, Json};

use crate::{
    dtos::context::ContextResponse, middleware::CurrentSession, models::is_valid_timezone,
    services::extract_geolocation,
};

/// Edge geolocation context for the current request
#[utoipa::path(
    get,
    path = "/api/context",
    responses((status = 200, description = "Edge context", body = ContextResponse)),
    tag = "Context"
)]
pub async fn get_context(
    headers: HeaderMap,
    current: Option<CurrentSession>,
) -> Json<ContextResponse> {
    let geolocation = extract_geolocation(&headers);
    let timezone_valid = geolocation
        .timezone
        .as_deref()
        .is_some_and(is_valid_timezone);

    Json(ContextResponse {
        location: geolocation.location_string(),
        geolocation,
        timezone_valid,
        authenticated: current.is_some(),
    })
}
