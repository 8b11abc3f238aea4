use edge_auth_service::{
    build_router,
    config::EdgeAuthConfig,
    db,
    middleware::RouteClassifier,
    services::{
        PgCredentialVerifier, PgIdentityDirectory, PgSessionStore, RedisResponseCache,
        SessionManager,
    },
    AppState,
};
use service_core::middleware::{
    metrics::install_prometheus_recorder, rate_limit::create_ip_rate_limiter,
};
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = Arc::new(EdgeAuthConfig::from_env()?);

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    let metrics = match install_prometheus_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder; /metrics disabled");
            None
        }
    };

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting edge auth service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let cache = RedisResponseCache::new(&config.redis).await?;
    tracing::info!("Response cache initialized");

    let sessions = SessionManager::new(
        Arc::new(PgSessionStore::new(pool.clone())),
        Arc::new(PgIdentityDirectory::new(pool.clone())),
        config.session.clone(),
        config.geolocation.tracking_enabled,
    );

    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.max_requests,
        config.rate_limit.window_seconds,
    );
    tracing::info!(
        max_requests = config.rate_limit.max_requests,
        window_seconds = config.rate_limit.window_seconds,
        "IP rate limiter initialized"
    );

    spawn_expired_session_purge(sessions.clone());

    let state = AppState {
        config: config.clone(),
        sessions,
        credentials: Arc::new(PgCredentialVerifier::new(pool)),
        cache: Arc::new(cache),
        routes: RouteClassifier::new(&config.routes),
        metrics,
        ip_rate_limiter,
    };
    let app = build_router(state);

    let addr: SocketAddr = config.common.bind_address().parse().map_err(|e| {
        service_core::error::AppError::ConfigError(anyhow::anyhow!("Invalid bind address: {}", e))
    })?;

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

/// Periodically drop sessions that expired without being read again.
fn spawn_expired_session_purge(sessions: SessionManager) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = sessions.purge_expired().await {
                tracing::warn!(error = %e, "Expired session purge failed");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
