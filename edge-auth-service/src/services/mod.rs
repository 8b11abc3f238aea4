//! Services layer for the edge auth service.
//!
//! Session lifecycle, persistence and the shared response cache.

pub mod error;
pub mod geolocation;
pub mod identity;
pub mod response_cache;
pub mod session;
pub mod session_store;

pub use error::{CacheError, ServiceError, StoreError};
pub use geolocation::extract_geolocation;
pub use identity::{
    CredentialVerifier, IdentityDirectory, InMemoryIdentityDirectory, PgCredentialVerifier,
    PgIdentityDirectory, StaticCredentialVerifier,
};
pub use response_cache::{
    CachedResponse, InMemoryResponseCache, RedisResponseCache, ResponseCache,
};
pub use session::{generate_session_token, SessionManager};
pub use session_store::{InMemorySessionStore, PgSessionStore, SessionStore};
