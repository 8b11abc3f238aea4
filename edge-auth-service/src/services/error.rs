use service_core::error::AppError;
use thiserror::Error;

/// Failures reported by a [`SessionStore`](super::SessionStore).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session token already exists")]
    DuplicateToken,

    #[error("Session store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateToken,
            _ => StoreError::Unavailable(anyhow::Error::new(err)),
        }
    }
}

/// Failures reported by a [`ResponseCache`](super::ResponseCache).
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Response cache unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),

    #[error("Cached entry could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Unavailable(anyhow::Error::new(err))
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Unknown user: {0}")]
    Identity(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(anyhow::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(e) => ServiceError::StoreUnavailable(e),
            StoreError::DuplicateToken => {
                ServiceError::Internal(anyhow::anyhow!("Session token collision"))
            }
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Identity(_) => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::StoreUnavailable(e) => AppError::ServiceUnavailable(e.to_string()),
            ServiceError::Validation(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"))
            }
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
