//! Refresh credential storage.
//!
//! A refresh credential is usable only while its row exists. Revocation and
//! expiry cleanup are plain deletes.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use tessera_auth::RefreshCredential;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    PgPool, StorageError, StorageResult, is_foreign_key_violation, is_unique_violation,
};

type RefreshTuple = (Uuid, Uuid, String, OffsetDateTime, OffsetDateTime);

fn credential_from_tuple(row: RefreshTuple) -> RefreshCredential {
    RefreshCredential {
        id: row.0,
        user_id: row.1,
        token: row.2,
        created_at: row.3,
        expires_at: row.4,
    }
}

/// Refresh credential storage operations.
pub struct RefreshTokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> RefreshTokenStorage<'a> {
    /// Create a new refresh credential storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a credential.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the token value exists and
    /// `StorageError::NotFound` if the user doesn't.
    pub async fn create(&self, credential: &RefreshCredential) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(credential.id)
        .bind(credential.user_id)
        .bind(&credential.token)
        .bind(credential.created_at)
        .bind(credential.expires_at)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return StorageError::conflict("Refresh token already exists");
            }
            if is_foreign_key_violation(&e) {
                return StorageError::not_found("User", credential.user_id);
            }
            StorageError::from(e)
        })?;
        Ok(())
    }

    /// Find a credential by its exact token value, expired or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_token(&self, token: &str) -> StorageResult<Option<RefreshCredential>> {
        let row: Option<RefreshTuple> = query_as(
            r#"
            SELECT id, user_id, token, created_at, expires_at
            FROM refresh_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(credential_from_tuple))
    }

    /// Delete every credential of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete_by_user(&self, user_id: Uuid) -> StorageResult<u64> {
        let result = query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete credentials whose expiry is at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete_expired(&self, now: OffsetDateTime) -> StorageResult<u64> {
        let result = query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
