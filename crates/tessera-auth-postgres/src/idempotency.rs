//! Idempotency record storage.
//!
//! The unique constraint on `key` backs the executor's check-then-write: a
//! concurrent second insert for the same key fails with a conflict.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use tessera_auth::IdempotencyRecord;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{PgPool, StorageError, StorageResult, is_unique_violation};

type RecordTuple = (Uuid, Uuid, OffsetDateTime, serde_json::Value);

fn record_from_tuple(row: RecordTuple) -> IdempotencyRecord {
    IdempotencyRecord {
        id: row.0,
        key: row.1,
        issued_at: row.2,
        payload: row.3,
    }
}

/// Idempotency record storage operations.
pub struct IdempotencyStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> IdempotencyStorage<'a> {
    /// Create a new idempotency storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find the record stored for a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_key(&self, key: Uuid) -> StorageResult<Option<IdempotencyRecord>> {
        let row: Option<RecordTuple> = query_as(
            "SELECT id, key, issued_at, payload FROM idempotency_records WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(record_from_tuple))
    }

    /// Returns `true` if a record occupies the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn exists_by_key(&self, key: Uuid) -> StorageResult<bool> {
        let (exists,): (bool,) =
            query_as("SELECT EXISTS (SELECT 1 FROM idempotency_records WHERE key = $1)")
                .bind(key)
                .fetch_one(self.pool)
                .await?;
        Ok(exists)
    }

    /// Insert a record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the key is taken.
    pub async fn insert(&self, record: &IdempotencyRecord) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO idempotency_records (id, key, issued_at, payload)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.id)
        .bind(record.key)
        .bind(record.issued_at)
        .bind(&record.payload)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return StorageError::conflict(format!(
                    "Idempotency key {} is already recorded",
                    record.key
                ));
            }
            StorageError::from(e)
        })?;
        Ok(())
    }

    /// Delete the record for a key if it was issued before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete_stale_key(&self, key: Uuid, cutoff: OffsetDateTime) -> StorageResult<bool> {
        let result = query("DELETE FROM idempotency_records WHERE key = $1 AND issued_at < $2")
            .bind(key)
            .bind(cutoff)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every record issued before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete_issued_before(&self, cutoff: OffsetDateTime) -> StorageResult<u64> {
        let result = query("DELETE FROM idempotency_records WHERE issued_at < $1")
            .bind(cutoff)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
