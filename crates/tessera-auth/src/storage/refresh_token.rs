//! Refresh credential storage trait.
//!
//! Refresh credentials are persisted so they can be revoked server-side.
//! A credential is usable only while its row exists; revocation is a delete.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;

/// A persisted refresh credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshCredential {
    /// Unique row identifier.
    pub id: Uuid,

    /// Owning user.
    pub user_id: Uuid,

    /// The signed token string, unique across all rows.
    pub token: String,

    /// When the credential was issued.
    pub created_at: OffsetDateTime,

    /// When the credential expires.
    pub expires_at: OffsetDateTime,
}

impl RefreshCredential {
    /// Creates a row for a freshly signed token.
    #[must_use]
    pub fn new(user_id: Uuid, token: impl Into<String>, expires_at: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            token: token.into(),
            created_at: OffsetDateTime::now_utc(),
            expires_at,
        }
    }

    /// Returns `true` if the credential has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// Storage trait for refresh credentials.
///
/// # Implementations
///
/// - [`MemoryAuthStorage`](crate::storage::memory::MemoryAuthStorage) - in-process
/// - `tessera-auth-postgres` - PostgreSQL storage backend
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Stores a new refresh credential.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if the token value already exists.
    async fn create(&self, credential: &RefreshCredential) -> AuthResult<()>;

    /// Finds a refresh credential by its exact token value.
    ///
    /// Expired rows are returned as well; callers decide what to do with them.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_token(&self, token: &str) -> AuthResult<Option<RefreshCredential>>;

    /// Deletes every refresh credential of a user.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_by_user(&self, user_id: Uuid) -> AuthResult<u64>;

    /// Deletes credentials whose expiry is at or before `now`.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
