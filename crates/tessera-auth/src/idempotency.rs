//! At-most-once execution keyed by a client-supplied idempotency key.
//!
//! [`IdempotencyExecutor::wrap`] looks for a fresh stored result under the
//! key and replays it; otherwise it runs the operation once and stores the
//! result. Storing is best effort: a failed write is logged and the result is
//! still returned to the caller.
//!
//! The lookup and the write are two separate storage round trips. Two
//! first-time requests racing on the same key can both run the operation;
//! the key's unique constraint lets only one of them persist.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult, ValidationError};
use crate::storage::idempotency::{IdempotencyRecord, IdempotencyStorage};

/// Validation code reported when a key is already occupied.
pub const DUPLICATE_KEY_CODE: &str = "idempotency.key.duplicate";

/// Executes operations at most once per idempotency key.
#[derive(Clone)]
pub struct IdempotencyExecutor {
    storage: Arc<dyn IdempotencyStorage>,
    ttl: Duration,
}

impl IdempotencyExecutor {
    /// Creates an executor replaying results for `ttl` after they are stored.
    #[must_use]
    pub fn new(storage: Arc<dyn IdempotencyStorage>, ttl: std::time::Duration) -> Self {
        Self {
            storage,
            ttl: Duration::try_from(ttl).unwrap_or(Duration::MAX),
        }
    }

    /// Returns the replay window.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the stored result for `key` if one exists and is fresh.
    ///
    /// `Ok(None)` means there is nothing to replay: the key is unknown or its
    /// record is older than the TTL (it may still physically exist until the
    /// next sweep).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails or the stored payload does
    /// not deserialize into `T`.
    pub async fn process<T: DeserializeOwned>(&self, key: Uuid) -> AuthResult<Option<T>> {
        let Some(record) = self.storage.find_by_key(key).await? else {
            return Ok(None);
        };

        if record.is_issued_before(self.cutoff()) {
            tracing::debug!(key = %key, "Idempotency record expired; not replaying");
            return Ok(None);
        }

        serde_json::from_value(record.payload)
            .map(Some)
            .map_err(|e| AuthError::internal(format!("Stored idempotent result is unreadable: {}", e)))
    }

    /// Stores `result` under `key`.
    ///
    /// A record that is past its TTL but not yet swept is replaced.
    ///
    /// # Errors
    ///
    /// Returns a value-level validation error ([`DUPLICATE_KEY_CODE`]) if a
    /// fresh record already occupies the key, or a storage error.
    pub async fn write<T: Serialize>(&self, key: Uuid, result: &T) -> AuthResult<()> {
        if self.storage.exists_by_key(key).await?
            && !self.storage.delete_stale_key(key, self.cutoff()).await?
        {
            return Err(duplicate_key(key));
        }

        let payload = serde_json::to_value(result)
            .map_err(|e| AuthError::internal(format!("Failed to serialize result: {}", e)))?;

        match self
            .storage
            .insert(&IdempotencyRecord::new(key, payload))
            .await
        {
            Err(AuthError::Conflict { .. }) => Err(duplicate_key(key)),
            other => other,
        }
    }

    /// Runs `operation` at most once for `key` within the TTL.
    ///
    /// Failed operations are not stored, so a retry with the same key runs
    /// the operation again.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or an error from the initial lookup.
    pub async fn wrap<T, F, Fut>(&self, key: Uuid, operation: F) -> AuthResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AuthResult<T>>,
    {
        if let Some(cached) = self.process::<T>(key).await? {
            tracing::debug!(key = %key, "Replaying idempotent result");
            return Ok(cached);
        }

        let result = operation().await?;

        if let Err(e) = self.write(key, &result).await {
            tracing::warn!(key = %key, error = %e, "Failed to persist idempotent result");
        }

        Ok(result)
    }

    fn cutoff(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc() - self.ttl
    }
}

fn duplicate_key(key: Uuid) -> AuthError {
    AuthError::validation(vec![ValidationError::value(
        DUPLICATE_KEY_CODE,
        format!("Idempotency key {} has already been used", key),
    )])
}
