//! Collaborators owned by the identity subsystem: user lookup and
//! credential verification.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::utils::{verify_password, Password, PasswordHashString};

/// Resolves whether a user id refers to a known user.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn user_exists(&self, user_id: &str) -> Result<bool, anyhow::Error>;
}

/// Verifies sign-in credentials and yields the verified user id.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, email: &str, password: &str) -> Result<Option<String>, anyhow::Error>;
}

#[derive(Clone)]
pub struct PgIdentityDirectory {
    pool: PgPool,
}

impl PgIdentityDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityDirectory for PgIdentityDirectory {
    async fn user_exists(&self, user_id: &str) -> Result<bool, anyhow::Error> {
        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM "user" WHERE id = $1)"#)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

/// Checks email/password against the `credential` account row.
#[derive(Clone)]
pub struct PgCredentialVerifier {
    pool: PgPool,
}

impl PgCredentialVerifier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialVerifier for PgCredentialVerifier {
    async fn verify(&self, email: &str, password: &str) -> Result<Option<String>, anyhow::Error> {
        let row: Option<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT u.id, a.password FROM "user" u
            JOIN account a ON a."userId" = u.id
            WHERE LOWER(u.email) = LOWER($1) AND a."providerId" = 'credential'
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let Some((user_id, Some(hash))) = row else {
            return Ok(None);
        };

        let verified = verify_password(
            &Password::new(password.to_string()),
            &PasswordHashString::new(hash),
        )?;

        Ok(verified.then_some(user_id))
    }
}

/// Fixed set of known users, for tests and local development.
#[derive(Default)]
pub struct InMemoryIdentityDirectory {
    users: RwLock<HashSet<String>>,
}

impl InMemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: RwLock::new(users.into_iter().map(Into::into).collect()),
        }
    }

    pub fn add_user(&self, user_id: &str) {
        if let Ok(mut users) = self.users.write() {
            users.insert(user_id.to_string());
        }
    }

    pub fn remove_user(&self, user_id: &str) {
        if let Ok(mut users) = self.users.write() {
            users.remove(user_id);
        }
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryIdentityDirectory {
    async fn user_exists(&self, user_id: &str) -> Result<bool, anyhow::Error> {
        let users = self
            .users
            .read()
            .map_err(|e| anyhow::anyhow!("Identity directory poisoned: {}", e))?;
        Ok(users.contains(user_id))
    }
}

/// Plain email → (password, user id) table, for tests and local development.
#[derive(Default)]
pub struct StaticCredentialVerifier {
    accounts: HashMap<String, (String, String)>,
}

impl StaticCredentialVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, email: &str, password: &str, user_id: &str) -> Self {
        self.accounts.insert(
            email.to_lowercase(),
            (password.to_string(), user_id.to_string()),
        );
        self
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentialVerifier {
    async fn verify(&self, email: &str, password: &str) -> Result<Option<String>, anyhow::Error> {
        Ok(self
            .accounts
            .get(&email.to_lowercase())
            .filter(|(expected, _)| expected == password)
            .map(|(_, user_id)| user_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_directory_tracks_users() {
        let directory = InMemoryIdentityDirectory::with_users(["u1"]);
        assert!(directory.user_exists("u1").await.unwrap());
        assert!(!directory.user_exists("u2").await.unwrap());

        directory.add_user("u2");
        directory.remove_user("u1");
        assert!(directory.user_exists("u2").await.unwrap());
        assert!(!directory.user_exists("u1").await.unwrap());
    }

    #[tokio::test]
    async fn static_verifier_matches_case_insensitive_email() {
        let verifier =
            StaticCredentialVerifier::new().with_account("Ada@Example.com", "hunter22", "u1");

        assert_eq!(
            verifier.verify("ada@example.com", "hunter22").await.unwrap(),
            Some("u1".to_string())
        );
        assert_eq!(verifier.verify("ada@example.com", "wrong").await.unwrap(), None);
        assert_eq!(verifier.verify("bob@example.com", "hunter22").await.unwrap(), None);
    }
}
