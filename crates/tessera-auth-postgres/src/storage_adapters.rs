//! Arc-owning storage adapters.
//!
//! These adapters wrap the lifetime-based storage types and own an
//! `Arc<PgPool>`, so they can be handed to the services as
//! `Arc<dyn Storage>`.

use std::sync::Arc;

use async_trait::async_trait;
use tessera_auth::storage::{
    IdempotencyStorage as IdempotencyStorageTrait, PermissionStorage as PermissionStorageTrait,
    RefreshTokenStorage as RefreshTokenStorageTrait, RoleStorage as RoleStorageTrait,
    UserStorage as UserStorageTrait,
};
use tessera_auth::{AuthResult, IdempotencyRecord, Permission, RefreshCredential, Role, User};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::PgPool;
use crate::idempotency::IdempotencyStorage;
use crate::refresh_token::RefreshTokenStorage;
use crate::role::{PermissionStorage, RoleStorage};
use crate::user::UserStorage;

// =============================================================================
// Arc-Owning User Storage
// =============================================================================

/// Arc-owning PostgreSQL user storage adapter.
#[derive(Clone)]
pub struct ArcUserStorage {
    pool: Arc<PgPool>,
}

impl ArcUserStorage {
    /// Create a new Arc-owning user storage.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStorageTrait for ArcUserStorage {
    async fn find_by_id_with_roles(&self, user_id: Uuid) -> AuthResult<Option<User>> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage.find_by_id(user_id).await?)
    }

    async fn find_by_email_with_roles(&self, email: &str) -> AuthResult<Option<User>> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage.find_by_email(email).await?)
    }

    async fn list_with_roles(&self, include_deactivated: bool) -> AuthResult<Vec<User>> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage.list(include_deactivated).await?)
    }

    async fn create(&self, user: &User) -> AuthResult<()> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage.create(user).await?)
    }

    async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> AuthResult<()> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage.assign_role(user_id, role_id).await?)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> AuthResult<()> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage.update_password(user_id, password_hash).await?)
    }

    async fn update_login_state(
        &self,
        user_id: Uuid,
        failed_login_attempts: u32,
        locked_until: Option<OffsetDateTime>,
    ) -> AuthResult<()> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage
            .update_login_state(user_id, failed_login_attempts, locked_until)
            .await?)
    }

    async fn deactivate(&self, user_id: Uuid, at: OffsetDateTime) -> AuthResult<()> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage.deactivate(user_id, at).await?)
    }

    async fn count(&self) -> AuthResult<i64> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage.count().await?)
    }
}

// =============================================================================
// Arc-Owning Role Storage
// =============================================================================

/// Arc-owning PostgreSQL role storage adapter.
#[derive(Clone)]
pub struct ArcRoleStorage {
    pool: Arc<PgPool>,
}

impl ArcRoleStorage {
    /// Create a new Arc-owning role storage.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleStorageTrait for ArcRoleStorage {
    async fn find_by_id_with_permissions(&self, role_id: Uuid) -> AuthResult<Option<Role>> {
        let storage = RoleStorage::new(&self.pool);
        Ok(storage.find_by_id(role_id).await?)
    }

    async fn find_by_name_with_permissions(&self, name: &str) -> AuthResult<Option<Role>> {
        let storage = RoleStorage::new(&self.pool);
        Ok(storage.find_by_name(name).await?)
    }

    async fn list_with_permissions(&self) -> AuthResult<Vec<Role>> {
        let storage = RoleStorage::new(&self.pool);
        Ok(storage.list().await?)
    }

    async fn create(&self, role: &Role) -> AuthResult<()> {
        let storage = RoleStorage::new(&self.pool);
        Ok(storage.create(role).await?)
    }

    async fn assign_permission(&self, role_id: Uuid, permission_id: Uuid) -> AuthResult<()> {
        let storage = RoleStorage::new(&self.pool);
        Ok(storage.assign_permission(role_id, permission_id).await?)
    }

    async fn delete(&self, role_id: Uuid) -> AuthResult<()> {
        let storage = RoleStorage::new(&self.pool);
        Ok(storage.delete(role_id).await?)
    }

    async fn count(&self) -> AuthResult<i64> {
        let storage = RoleStorage::new(&self.pool);
        Ok(storage.count().await?)
    }
}

// =============================================================================
// Arc-Owning Permission Storage
// =============================================================================

/// Arc-owning PostgreSQL permission storage adapter.
#[derive(Clone)]
pub struct ArcPermissionStorage {
    pool: Arc<PgPool>,
}

impl ArcPermissionStorage {
    /// Create a new Arc-owning permission storage.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionStorageTrait for ArcPermissionStorage {
    async fn list(&self) -> AuthResult<Vec<Permission>> {
        let storage = PermissionStorage::new(&self.pool);
        Ok(storage.list().await?)
    }

    async fn find_by_id(&self, permission_id: Uuid) -> AuthResult<Option<Permission>> {
        let storage = PermissionStorage::new(&self.pool);
        Ok(storage.find_by_id(permission_id).await?)
    }

    async fn find_by_code(&self, code: &str) -> AuthResult<Option<Permission>> {
        let storage = PermissionStorage::new(&self.pool);
        Ok(storage.find_by_code(code).await?)
    }

    async fn insert_many(&self, permissions: &[Permission]) -> AuthResult<u64> {
        let storage = PermissionStorage::new(&self.pool);
        Ok(storage.insert_many(permissions).await?)
    }

    async fn delete(&self, permission_id: Uuid) -> AuthResult<()> {
        let storage = PermissionStorage::new(&self.pool);
        Ok(storage.delete(permission_id).await?)
    }

    async fn count(&self) -> AuthResult<i64> {
        let storage = PermissionStorage::new(&self.pool);
        Ok(storage.count().await?)
    }
}

// =============================================================================
// Arc-Owning Refresh Token Storage
// =============================================================================

/// Arc-owning PostgreSQL refresh credential storage adapter.
#[derive(Clone)]
pub struct ArcRefreshTokenStorage {
    pool: Arc<PgPool>,
}

impl ArcRefreshTokenStorage {
    /// Create a new Arc-owning refresh credential storage.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStorageTrait for ArcRefreshTokenStorage {
    async fn create(&self, credential: &RefreshCredential) -> AuthResult<()> {
        let storage = RefreshTokenStorage::new(&self.pool);
        Ok(storage.create(credential).await?)
    }

    async fn find_by_token(&self, token: &str) -> AuthResult<Option<RefreshCredential>> {
        let storage = RefreshTokenStorage::new(&self.pool);
        Ok(storage.find_by_token(token).await?)
    }

    async fn delete_by_user(&self, user_id: Uuid) -> AuthResult<u64> {
        let storage = RefreshTokenStorage::new(&self.pool);
        Ok(storage.delete_by_user(user_id).await?)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let storage = RefreshTokenStorage::new(&self.pool);
        Ok(storage.delete_expired(now).await?)
    }
}

// =============================================================================
// Arc-Owning Idempotency Storage
// =============================================================================

/// Arc-owning PostgreSQL idempotency record storage adapter.
#[derive(Clone)]
pub struct ArcIdempotencyStorage {
    pool: Arc<PgPool>,
}

impl ArcIdempotencyStorage {
    /// Create a new Arc-owning idempotency record storage.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyStorageTrait for ArcIdempotencyStorage {
    async fn find_by_key(&self, key: Uuid) -> AuthResult<Option<IdempotencyRecord>> {
        let storage = IdempotencyStorage::new(&self.pool);
        Ok(storage.find_by_key(key).await?)
    }

    async fn exists_by_key(&self, key: Uuid) -> AuthResult<bool> {
        let storage = IdempotencyStorage::new(&self.pool);
        Ok(storage.exists_by_key(key).await?)
    }

    async fn insert(&self, record: &IdempotencyRecord) -> AuthResult<()> {
        let storage = IdempotencyStorage::new(&self.pool);
        Ok(storage.insert(record).await?)
    }

    async fn delete_stale_key(&self, key: Uuid, cutoff: OffsetDateTime) -> AuthResult<bool> {
        let storage = IdempotencyStorage::new(&self.pool);
        Ok(storage.delete_stale_key(key, cutoff).await?)
    }

    async fn delete_issued_before(&self, cutoff: OffsetDateTime) -> AuthResult<u64> {
        let storage = IdempotencyStorage::new(&self.pool);
        Ok(storage.delete_issued_before(cutoff).await?)
    }
}
