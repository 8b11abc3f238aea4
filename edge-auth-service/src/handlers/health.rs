use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::AppState;

/// Service health check
///
/// The session store is required; a down response cache only degrades.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy or degraded"),
        (status = 503, description = "Session store is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.sessions.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Session store health check failed");
        AppError::from(e)
    })?;

    let cache_up = match state.cache.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Response cache health check failed");
            false
        }
    };

    Ok(Json(serde_json::json!({
        "status": if cache_up { "healthy" } else { "degraded" },
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "session_store": "up",
            "response_cache": if cache_up { "up" } else { "down" }
        }
    })))
}
