//! Idempotency record storage trait.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;

/// A stored result of an idempotent operation.
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    /// Unique row identifier.
    pub id: Uuid,

    /// Client-supplied idempotency key, unique across all rows.
    pub key: Uuid,

    /// When the result was stored.
    pub issued_at: OffsetDateTime,

    /// Serialized result of the operation.
    pub payload: serde_json::Value,
}

impl IdempotencyRecord {
    /// Creates a record issued now.
    #[must_use]
    pub fn new(key: Uuid, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            issued_at: OffsetDateTime::now_utc(),
            payload,
        }
    }

    /// Returns `true` if the record was issued before `cutoff`.
    #[must_use]
    pub fn is_issued_before(&self, cutoff: OffsetDateTime) -> bool {
        self.issued_at < cutoff
    }
}

/// Storage trait for idempotency records.
#[async_trait]
pub trait IdempotencyStorage: Send + Sync {
    /// Finds the record stored for a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_key(&self, key: Uuid) -> AuthResult<Option<IdempotencyRecord>>;

    /// Returns `true` if any record occupies the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn exists_by_key(&self, key: Uuid) -> AuthResult<bool>;

    /// Inserts a record.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if the key is already taken.
    async fn insert(&self, record: &IdempotencyRecord) -> AuthResult<()>;

    /// Deletes the record for a key if it was issued before `cutoff`.
    ///
    /// Returns `true` if a row was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_stale_key(&self, key: Uuid, cutoff: OffsetDateTime) -> AuthResult<bool>;

    /// Deletes every record issued before `cutoff`.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_issued_before(&self, cutoff: OffsetDateTime) -> AuthResult<u64>;
}
