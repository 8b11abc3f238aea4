//! Session persistence: CRUD over session records keyed by id, with
//! secondary lookups by token and by owning user.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;

use super::error::StoreError;
use crate::models::Session;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session. Rejects a token that is already in use.
    async fn create(&self, session: &Session) -> Result<(), StoreError>;
    async fn get_by_token(&self, token: &str) -> Result<Option<Session>, StoreError>;
    /// Sessions owned by `user_id`, most recently created first.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Session>, StoreError>;
    /// Remove one session. Removing an unknown id is not an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
    async fn delete_all_by_user(&self, user_id: &str) -> Result<u64, StoreError>;
    /// Slide a session's expiry forward.
    async fn refresh(
        &self,
        id: &str,
        expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// PostgreSQL-backed session store.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO session (id, "userId", token, "expiresAt", "createdAt", "updatedAt",
                "ipAddress", "userAgent", country, region, city, timezone, latitude, longitude)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.token)
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(&session.country)
        .bind(&session.region)
        .bind(&session.city)
        .bind(&session.timezone)
        .bind(&session.latitude)
        .bind(&session.longitude)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM session WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"SELECT * FROM session WHERE "userId" = $1 ORDER BY "createdAt" DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM session WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all_by_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(r#"DELETE FROM session WHERE "userId" = $1"#)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn refresh(
        &self,
        id: &str,
        expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(r#"UPDATE session SET "expiresAt" = $1, "updatedAt" = $2 WHERE id = $3"#)
            .bind(expires_at)
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(r#"DELETE FROM session WHERE "expiresAt" <= $1"#)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// In-process session store for tests and local development.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Session>>, StoreError> {
        self.sessions
            .lock()
            .map_err(|e| StoreError::Unavailable(anyhow::anyhow!("Session map poisoned: {}", e)))
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.lock()?;
        if sessions.values().any(|s| s.token == session.token) {
            return Err(StoreError::DuplicateToken);
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.lock()?.values().find(|s| s.token == token).cloned())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self
            .lock()?
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.lock()?.remove(id);
        Ok(())
    }

    async fn delete_all_by_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn refresh(
        &self,
        id: &str,
        expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(session) = self.lock()?.get_mut(id) {
            session.expires_at = expires_at;
            session.updated_at = updated_at;
        }
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired_at(now));
        Ok((before - sessions.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}
