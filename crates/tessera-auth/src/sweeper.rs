//! Periodic deletion of expired idempotency records and refresh credentials.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::storage::idempotency::IdempotencyStorage;
use crate::storage::refresh_token::RefreshTokenStorage;

/// Rows deleted by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Idempotency records older than the TTL.
    pub idempotency_records: u64,
    /// Refresh credentials past their expiry.
    pub refresh_tokens: u64,
}

/// Background sweeper.
pub struct Sweeper {
    idempotency_storage: Arc<dyn IdempotencyStorage>,
    refresh_token_storage: Arc<dyn RefreshTokenStorage>,
    idempotency_ttl: time::Duration,
    period: Duration,
}

impl Sweeper {
    /// Creates a sweeper that runs every `period`.
    #[must_use]
    pub fn new(
        idempotency_storage: Arc<dyn IdempotencyStorage>,
        refresh_token_storage: Arc<dyn RefreshTokenStorage>,
        idempotency_ttl: Duration,
        period: Duration,
    ) -> Self {
        Self {
            idempotency_storage,
            refresh_token_storage,
            idempotency_ttl: time::Duration::try_from(idempotency_ttl)
                .unwrap_or(time::Duration::MAX),
            period,
        }
    }

    /// Runs one sweep: one bulk delete per table.
    ///
    /// # Errors
    ///
    /// Returns the first storage error; the refresh sweep is skipped if the
    /// idempotency sweep fails.
    pub async fn sweep_once(&self) -> AuthResult<SweepStats> {
        let now = OffsetDateTime::now_utc();
        let idempotency_records = self
            .idempotency_storage
            .delete_issued_before(now - self.idempotency_ttl)
            .await?;
        let refresh_tokens = self.refresh_token_storage.delete_expired(now).await?;

        Ok(SweepStats {
            idempotency_records,
            refresh_tokens,
        })
    }

    /// Starts the sweep loop on the runtime.
    ///
    /// The first sweep runs immediately.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period);

            loop {
                interval.tick().await;

                match self.sweep_once().await {
                    Ok(stats) if stats != SweepStats::default() => {
                        tracing::info!(
                            idempotency_records = stats.idempotency_records,
                            refresh_tokens = stats.refresh_tokens,
                            "Expired auth records swept"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Auth record sweep failed");
                    }
                    _ => {}
                }
            }
        })
    }
}
