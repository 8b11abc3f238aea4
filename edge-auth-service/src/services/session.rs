//! Session lifecycle: creation with a geolocation snapshot, resolution with
//! sliding renewal, listing and revocation.

use chrono::Utc;
use metrics::counter;
use rand::Rng;
use std::sync::Arc;

use super::error::{ServiceError, StoreError};
use super::identity::IdentityDirectory;
use super::session_store::SessionStore;
use crate::config::SessionConfig;
use crate::models::{GeolocationRecord, Session, SessionSummary};

const TOKEN_BYTES: usize = 32;
const TOKEN_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    identity: Arc<dyn IdentityDirectory>,
    config: SessionConfig,
    track_geolocation: bool,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        identity: Arc<dyn IdentityDirectory>,
        config: SessionConfig,
        track_geolocation: bool,
    ) -> Self {
        Self {
            store,
            identity,
            config,
            track_geolocation,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn health_check(&self) -> Result<(), ServiceError> {
        self.store.health_check().await.map_err(ServiceError::from)
    }

    /// Start a session for a verified user, capturing where it came from.
    pub async fn create_session(
        &self,
        user_id: &str,
        geolocation: &GeolocationRecord,
        user_agent: Option<&str>,
    ) -> Result<Session, ServiceError> {
        let known = self
            .identity
            .user_exists(user_id)
            .await
            .map_err(ServiceError::StoreUnavailable)?;
        if !known {
            return Err(ServiceError::Identity(user_id.to_string()));
        }

        let snapshot = if self.track_geolocation {
            geolocation.clone()
        } else {
            geolocation.ip_only()
        };

        for attempt in 1..=TOKEN_ATTEMPTS {
            let session = Session::new(
                user_id.to_string(),
                generate_session_token(),
                &snapshot,
                user_agent.map(str::to_string),
                self.config.expires_in(),
                Utc::now(),
            );

            match self.store.create(&session).await {
                Ok(()) => {
                    counter!("sessions_created_total").increment(1);
                    tracing::info!(
                        session_id = %session.id,
                        user_id = %session.user_id,
                        country = ?session.country,
                        "Session created"
                    );
                    return Ok(session);
                }
                Err(StoreError::DuplicateToken) => {
                    tracing::warn!(attempt, "Session token collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "Could not allocate a unique session token"
        )))
    }

    /// Look up the session behind a bearer token.
    ///
    /// Malformed, unknown and expired tokens, and sessions whose user no
    /// longer exists, all yield `Ok(None)`. Only a store or directory
    /// failure is reported as an error.
    pub async fn resolve_session(&self, token: &str) -> Result<Option<Session>, ServiceError> {
        if let Err(e) = validate_token(token) {
            tracing::debug!(error = %e, "Rejected malformed session token");
            return Ok(None);
        }

        let Some(mut session) = self.store.get_by_token(token).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if session.is_expired_at(now) {
            // Lazy garbage collection; the answer is "no session" either way.
            if let Err(e) = self.store.delete(&session.id).await {
                tracing::warn!(session_id = %session.id, error = %e, "Failed to delete expired session");
            }
            return Ok(None);
        }

        // Deleting a user ends their sessions, whatever the store cascades.
        let owner_known = self
            .identity
            .user_exists(&session.user_id)
            .await
            .map_err(ServiceError::StoreUnavailable)?;
        if !owner_known {
            match self.store.delete_all_by_user(&session.user_id).await {
                Ok(removed) => {
                    tracing::info!(user_id = %session.user_id, removed, "Dropped sessions of deleted user");
                }
                Err(e) => {
                    tracing::warn!(user_id = %session.user_id, error = %e, "Failed to drop sessions of deleted user");
                }
            }
            return Ok(None);
        }

        if session.needs_renewal(now, self.config.update_age()) {
            let expires_at = now + self.config.expires_in();
            match self.store.refresh(&session.id, expires_at, now).await {
                Ok(()) => {
                    session.expires_at = expires_at;
                    session.updated_at = now;
                    tracing::debug!(session_id = %session.id, "Session renewed");
                }
                Err(e) => {
                    tracing::warn!(session_id = %session.id, error = %e, "Failed to renew session");
                }
            }
        }

        Ok(Some(session))
    }

    /// Live sessions of `user_id`, newest first, flagged against the
    /// requesting context's token.
    pub async fn list_sessions(
        &self,
        user_id: &str,
        current_token: Option<&str>,
    ) -> Result<Vec<SessionSummary>, ServiceError> {
        let now = Utc::now();
        let (live, expired): (Vec<Session>, Vec<Session>) = self
            .store
            .list_by_user(user_id)
            .await?
            .into_iter()
            .partition(|s| !s.is_expired_at(now));

        for session in expired {
            if let Err(e) = self.store.delete(&session.id).await {
                tracing::warn!(session_id = %session.id, error = %e, "Failed to delete expired session");
            }
        }

        Ok(live
            .into_iter()
            .map(|s| SessionSummary::from_session(s, current_token))
            .collect())
    }

    /// Revoke one session. Unknown or already-revoked ids succeed silently.
    pub async fn revoke_session(&self, session_id: &str) -> Result<(), ServiceError> {
        self.store.delete(session_id).await?;
        counter!("sessions_revoked_total").increment(1);
        tracing::info!(session_id = %session_id, "Session revoked");
        Ok(())
    }

    /// Revoke `session_id` only if it belongs to `user_id`; otherwise a
    /// silent no-op, so the outcome never reveals other users' sessions.
    pub async fn revoke_user_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), ServiceError> {
        let owned = self
            .store
            .list_by_user(user_id)
            .await?
            .iter()
            .any(|s| s.id == session_id);

        if owned {
            self.revoke_session(session_id).await?;
        }
        Ok(())
    }

    /// Revoke every session of `user_id`, the caller's own included.
    pub async fn revoke_all_sessions(&self, user_id: &str) -> Result<u64, ServiceError> {
        let removed = self.store.delete_all_by_user(user_id).await?;
        counter!("sessions_revoked_total").increment(removed);
        tracing::info!(user_id = %user_id, removed, "All sessions revoked");
        Ok(removed)
    }

    pub async fn purge_expired(&self) -> Result<u64, ServiceError> {
        let removed = self.store.delete_expired(Utc::now()).await?;
        if removed > 0 {
            tracing::info!(removed, "Purged expired sessions");
        }
        Ok(removed)
    }
}

/// 32 random bytes, hex encoded.
pub fn generate_session_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::thread_rng().gen();
    hex::encode(bytes)
}

fn validate_token(token: &str) -> Result<(), ServiceError> {
    if token.len() != TOKEN_BYTES * 2 {
        return Err(ServiceError::Validation("unexpected token length".to_string()));
    }
    if !token.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
        return Err(ServiceError::Validation("token is not lowercase hex".to_string()));
    }
    Ok(())
}
