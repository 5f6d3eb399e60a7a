//! PostgreSQL storage backend for tessera-auth
//!
//! Provides persistent storage for:
//!
//! - Users and their role links
//! - Roles, permissions and role-permission links
//! - Refresh credentials
//! - Idempotency records
//!
//! The schema is embedded and applied with [`PostgresAuthStorage::migrate`].
//! Referential rules live in the schema: a role held by a user or a
//! permission held by a role cannot be deleted, and the resulting foreign
//! key violation surfaces as a conflict.
//!
//! # Example
//!
//! ```ignore
//! use tessera_auth_postgres::{PostgresAuthStorage, PostgresConfig};
//!
//! let storage = PostgresAuthStorage::connect(&config).await?;
//! storage.migrate().await?;
//!
//! let module = AuthModule::new(&auth_config, storage.stores())?;
//! ```

pub mod idempotency;
pub mod migrations;
pub mod refresh_token;
pub mod role;
pub mod storage_adapters;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use sqlx_core::pool::{Pool, PoolOptions};
use sqlx_postgres::Postgres;
use tessera_auth::{AuthError, AuthStores};
use tracing::{info, instrument};

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use idempotency::IdempotencyStorage;
pub use refresh_token::RefreshTokenStorage;
pub use role::{PermissionStorage, RoleStorage};
pub use storage_adapters::{
    ArcIdempotencyStorage, ArcPermissionStorage, ArcRefreshTokenStorage, ArcRoleStorage,
    ArcUserStorage,
};
pub use user::UserStorage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during auth storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Requested row was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Row already exists, or is still referenced.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),
}

impl StorageError {
    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => AuthError::not_found(entity, id),
            StorageError::Conflict(message) => AuthError::conflict(message),
            StorageError::Database(e) => AuthError::storage(e.to_string()),
            StorageError::Migration(message) => AuthError::storage(message),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Returns `true` if the error is a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx_core::Error) -> bool {
    matches!(err, sqlx_core::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Returns `true` if the error is a foreign key violation.
pub(crate) fn is_foreign_key_violation(err: &sqlx_core::Error) -> bool {
    matches!(err, sqlx_core::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Connection URL.
    pub url: String,
    /// Maximum number of pooled connections.
    pub pool_size: u32,
    /// Connection acquire timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/tessera".to_string(),
            pool_size: 10,
            connect_timeout_ms: 5000,
        }
    }
}

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// PostgreSQL storage backend for authentication data.
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    #[instrument(skip(config), fields(pool_size = config.pool_size))]
    pub async fn connect(config: &PostgresConfig) -> StorageResult<Self> {
        let pool = PoolOptions::<Postgres>::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
            .connect(&config.url)
            .await?;
        info!("Connected to PostgreSQL");
        Ok(Self::new(Arc::new(pool)))
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Migration` if a migration fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    /// Get user storage operations.
    #[must_use]
    pub fn users(&self) -> UserStorage<'_> {
        UserStorage::new(&self.pool)
    }

    /// Get role storage operations.
    #[must_use]
    pub fn roles(&self) -> RoleStorage<'_> {
        RoleStorage::new(&self.pool)
    }

    /// Get permission storage operations.
    #[must_use]
    pub fn permissions(&self) -> PermissionStorage<'_> {
        PermissionStorage::new(&self.pool)
    }

    /// Get refresh credential storage operations.
    #[must_use]
    pub fn refresh_tokens(&self) -> RefreshTokenStorage<'_> {
        RefreshTokenStorage::new(&self.pool)
    }

    /// Get idempotency record storage operations.
    #[must_use]
    pub fn idempotency(&self) -> IdempotencyStorage<'_> {
        IdempotencyStorage::new(&self.pool)
    }

    /// Returns Arc-owning adapters for every storage trait.
    #[must_use]
    pub fn stores(&self) -> AuthStores {
        AuthStores {
            users: Arc::new(ArcUserStorage::new(self.pool.clone())),
            roles: Arc::new(ArcRoleStorage::new(self.pool.clone())),
            permissions: Arc::new(ArcPermissionStorage::new(self.pool.clone())),
            refresh_tokens: Arc::new(ArcRefreshTokenStorage::new(self.pool.clone())),
            idempotency: Arc::new(ArcIdempotencyStorage::new(self.pool.clone())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
