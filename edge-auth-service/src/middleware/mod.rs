pub mod auth_guard;
pub mod edge_cache;
pub mod routes;

pub use auth_guard::{auth_guard_middleware, CurrentSession, MaybeSession, SessionLookupFailed};
pub use edge_cache::edge_cache_middleware;
pub use routes::{RouteClass, RouteClassifier};
