//! In-process storage backend.
//!
//! Implements every storage trait over a single `RwLock`-protected state.
//! Enforces the same uniqueness and referential-integrity rules as the
//! relational schema, so services behave identically against both backends.
//! Used by tests and by the server when no database is configured.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::idempotency::{IdempotencyRecord, IdempotencyStorage};
use crate::storage::refresh_token::{RefreshCredential, RefreshTokenStorage};
use crate::storage::role::{Permission, PermissionStorage, Role, RoleStorage};
use crate::storage::user::{User, UserStorage, normalize_email};

#[derive(Debug, Default)]
struct MemoryState {
    /// Users, stored without roles.
    users: HashMap<Uuid, User>,
    /// Roles, stored without permissions.
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, Permission>,
    /// (user_id, role_id)
    user_roles: BTreeSet<(Uuid, Uuid)>,
    /// (role_id, permission_id)
    role_permissions: BTreeSet<(Uuid, Uuid)>,
    refresh_tokens: HashMap<String, RefreshCredential>,
    idempotency_records: HashMap<Uuid, IdempotencyRecord>,
}

impl MemoryState {
    fn materialize_role(&self, role: &Role) -> Role {
        let mut permissions: Vec<Permission> = self
            .role_permissions
            .iter()
            .filter(|(role_id, _)| *role_id == role.id)
            .filter_map(|(_, permission_id)| self.permissions.get(permission_id).cloned())
            .collect();
        permissions.sort_by(|a, b| a.code.cmp(&b.code));

        Role {
            id: role.id,
            name: role.name.clone(),
            permissions,
        }
    }

    fn materialize_user(&self, user: &User) -> User {
        let mut roles: Vec<Role> = self
            .user_roles
            .iter()
            .filter(|(user_id, _)| *user_id == user.id)
            .filter_map(|(_, role_id)| self.roles.get(role_id))
            .map(|role| self.materialize_role(role))
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));

        User {
            roles,
            ..user.clone()
        }
    }

    fn user_mut(&mut self, user_id: Uuid) -> AuthResult<&mut User> {
        self.users
            .get_mut(&user_id)
            .ok_or_else(|| AuthError::not_found("User", user_id))
    }
}

/// In-memory implementation of every auth storage trait.
#[derive(Debug, Default)]
pub struct MemoryAuthStorage {
    state: RwLock<MemoryState>,
}

impl MemoryAuthStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored idempotency records.
    pub async fn idempotency_record_count(&self) -> usize {
        self.state.read().await.idempotency_records.len()
    }

    /// Returns the number of stored refresh credentials.
    pub async fn refresh_token_count(&self) -> usize {
        self.state.read().await.refresh_tokens.len()
    }
}

// =============================================================================
// Users
// =============================================================================

#[async_trait]
impl UserStorage for MemoryAuthStorage {
    async fn find_by_id_with_roles(&self, user_id: Uuid) -> AuthResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .get(&user_id)
            .map(|user| state.materialize_user(user)))
    }

    async fn find_by_email_with_roles(&self, email: &str) -> AuthResult<Option<User>> {
        let email = normalize_email(email);
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|user| user.email == email)
            .map(|user| state.materialize_user(user)))
    }

    async fn list_with_roles(&self, include_deactivated: bool) -> AuthResult<Vec<User>> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|user| include_deactivated || user.is_enabled())
            .map(|user| state.materialize_user(user))
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn create(&self, user: &User) -> AuthResult<()> {
        let mut state = self.state.write().await;
        let email = normalize_email(&user.email);

        if state.users.values().any(|u| u.email == email) {
            return Err(AuthError::conflict(format!(
                "User with email '{}' already exists",
                email
            )));
        }
        if let Some(missing) = user.roles.iter().find(|r| !state.roles.contains_key(&r.id)) {
            return Err(AuthError::not_found("Role", missing.id));
        }

        for role in &user.roles {
            state.user_roles.insert((user.id, role.id));
        }
        state.users.insert(
            user.id,
            User {
                email,
                roles: Vec::new(),
                ..user.clone()
            },
        );
        Ok(())
    }

    async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> AuthResult<()> {
        let mut state = self.state.write().await;
        state.user_mut(user_id)?;
        if !state.roles.contains_key(&role_id) {
            return Err(AuthError::not_found("Role", role_id));
        }
        state.user_roles.insert((user_id, role_id));
        Ok(())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> AuthResult<()> {
        let mut state = self.state.write().await;
        state.user_mut(user_id)?.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn update_login_state(
        &self,
        user_id: Uuid,
        failed_login_attempts: u32,
        locked_until: Option<OffsetDateTime>,
    ) -> AuthResult<()> {
        let mut state = self.state.write().await;
        let user = state.user_mut(user_id)?;
        user.failed_login_attempts = failed_login_attempts;
        user.locked_until = locked_until;
        Ok(())
    }

    async fn deactivate(&self, user_id: Uuid, at: OffsetDateTime) -> AuthResult<()> {
        let mut state = self.state.write().await;
        let user = state.user_mut(user_id)?;
        user.deactivated_at.get_or_insert(at);
        Ok(())
    }

    async fn count(&self) -> AuthResult<i64> {
        Ok(self.state.read().await.users.len() as i64)
    }
}

// =============================================================================
// Roles
// =============================================================================

#[async_trait]
impl RoleStorage for MemoryAuthStorage {
    async fn find_by_id_with_permissions(&self, role_id: Uuid) -> AuthResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state
            .roles
            .get(&role_id)
            .map(|role| state.materialize_role(role)))
    }

    async fn find_by_name_with_permissions(&self, name: &str) -> AuthResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state
            .roles
            .values()
            .find(|role| role.name == name)
            .map(|role| state.materialize_role(role)))
    }

    async fn list_with_permissions(&self) -> AuthResult<Vec<Role>> {
        let state = self.state.read().await;
        let mut roles: Vec<Role> = state
            .roles
            .values()
            .map(|role| state.materialize_role(role))
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn create(&self, role: &Role) -> AuthResult<()> {
        let mut state = self.state.write().await;

        if state.roles.values().any(|r| r.name == role.name) {
            return Err(AuthError::conflict(format!(
                "Role '{}' already exists",
                role.name
            )));
        }
        if let Some(missing) = role
            .permissions
            .iter()
            .find(|p| !state.permissions.contains_key(&p.id))
        {
            return Err(AuthError::not_found("Permission", missing.id));
        }

        for permission in &role.permissions {
            state.role_permissions.insert((role.id, permission.id));
        }
        state.roles.insert(
            role.id,
            Role {
                id: role.id,
                name: role.name.clone(),
                permissions: Vec::new(),
            },
        );
        Ok(())
    }

    async fn assign_permission(&self, role_id: Uuid, permission_id: Uuid) -> AuthResult<()> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(&role_id) {
            return Err(AuthError::not_found("Role", role_id));
        }
        if !state.permissions.contains_key(&permission_id) {
            return Err(AuthError::not_found("Permission", permission_id));
        }
        state.role_permissions.insert((role_id, permission_id));
        Ok(())
    }

    async fn delete(&self, role_id: Uuid) -> AuthResult<()> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(&role_id) {
            return Err(AuthError::not_found("Role", role_id));
        }

        let holders = state
            .user_roles
            .iter()
            .filter(|(_, r)| *r == role_id)
            .count();
        if holders > 0 {
            return Err(AuthError::conflict(format!(
                "Role is assigned to {} user(s)",
                holders
            )));
        }

        state.role_permissions.retain(|(r, _)| *r != role_id);
        state.roles.remove(&role_id);
        Ok(())
    }

    async fn count(&self) -> AuthResult<i64> {
        Ok(self.state.read().await.roles.len() as i64)
    }
}

// =============================================================================
// Permissions
// =============================================================================

#[async_trait]
impl PermissionStorage for MemoryAuthStorage {
    async fn list(&self) -> AuthResult<Vec<Permission>> {
        let state = self.state.read().await;
        let mut permissions: Vec<Permission> = state.permissions.values().cloned().collect();
        permissions.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(permissions)
    }

    async fn find_by_id(&self, permission_id: Uuid) -> AuthResult<Option<Permission>> {
        Ok(self
            .state
            .read()
            .await
            .permissions
            .get(&permission_id)
            .cloned())
    }

    async fn find_by_code(&self, code: &str) -> AuthResult<Option<Permission>> {
        Ok(self
            .state
            .read()
            .await
            .permissions
            .values()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn insert_many(&self, permissions: &[Permission]) -> AuthResult<u64> {
        let mut state = self.state.write().await;

        let mut seen: BTreeSet<&str> = state
            .permissions
            .values()
            .map(|p| p.code.as_str())
            .collect();
        for permission in permissions {
            if !seen.insert(permission.code.as_str()) {
                return Err(AuthError::conflict(format!(
                    "Permission '{}' already exists",
                    permission.code
                )));
            }
        }

        for permission in permissions {
            state.permissions.insert(permission.id, permission.clone());
        }
        Ok(permissions.len() as u64)
    }

    async fn delete(&self, permission_id: Uuid) -> AuthResult<()> {
        let mut state = self.state.write().await;
        if !state.permissions.contains_key(&permission_id) {
            return Err(AuthError::not_found("Permission", permission_id));
        }

        let holders = state
            .role_permissions
            .iter()
            .filter(|(_, p)| *p == permission_id)
            .count();
        if holders > 0 {
            return Err(AuthError::conflict(format!(
                "Permission is assigned to {} role(s)",
                holders
            )));
        }

        state.permissions.remove(&permission_id);
        Ok(())
    }

    async fn count(&self) -> AuthResult<i64> {
        Ok(self.state.read().await.permissions.len() as i64)
    }
}

// =============================================================================
// Refresh credentials
// =============================================================================

#[async_trait]
impl RefreshTokenStorage for MemoryAuthStorage {
    async fn create(&self, credential: &RefreshCredential) -> AuthResult<()> {
        let mut state = self.state.write().await;
        if state.refresh_tokens.contains_key(&credential.token) {
            return Err(AuthError::conflict("Refresh token already exists"));
        }
        state
            .refresh_tokens
            .insert(credential.token.clone(), credential.clone());
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> AuthResult<Option<RefreshCredential>> {
        Ok(self.state.read().await.refresh_tokens.get(token).cloned())
    }

    async fn delete_by_user(&self, user_id: Uuid) -> AuthResult<u64> {
        let mut state = self.state.write().await;
        let before = state.refresh_tokens.len();
        state.refresh_tokens.retain(|_, c| c.user_id != user_id);
        Ok((before - state.refresh_tokens.len()) as u64)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut state = self.state.write().await;
        let before = state.refresh_tokens.len();
        state.refresh_tokens.retain(|_, c| !c.is_expired_at(now));
        Ok((before - state.refresh_tokens.len()) as u64)
    }
}

// =============================================================================
// Idempotency records
// =============================================================================

#[async_trait]
impl IdempotencyStorage for MemoryAuthStorage {
    async fn find_by_key(&self, key: Uuid) -> AuthResult<Option<IdempotencyRecord>> {
        Ok(self
            .state
            .read()
            .await
            .idempotency_records
            .get(&key)
            .cloned())
    }

    async fn exists_by_key(&self, key: Uuid) -> AuthResult<bool> {
        Ok(self
            .state
            .read()
            .await
            .idempotency_records
            .contains_key(&key))
    }

    async fn insert(&self, record: &IdempotencyRecord) -> AuthResult<()> {
        let mut state = self.state.write().await;
        if state.idempotency_records.contains_key(&record.key) {
            return Err(AuthError::conflict(format!(
                "Idempotency key {} already used",
                record.key
            )));
        }
        state
            .idempotency_records
            .insert(record.key, record.clone());
        Ok(())
    }

    async fn delete_stale_key(&self, key: Uuid, cutoff: OffsetDateTime) -> AuthResult<bool> {
        let mut state = self.state.write().await;
        let stale = state
            .idempotency_records
            .get(&key)
            .is_some_and(|r| r.is_issued_before(cutoff));
        if stale {
            state.idempotency_records.remove(&key);
        }
        Ok(stale)
    }

    async fn delete_issued_before(&self, cutoff: OffsetDateTime) -> AuthResult<u64> {
        let mut state = self.state.write().await;
        let before = state.idempotency_records.len();
        state
            .idempotency_records
            .retain(|_, r| !r.is_issued_before(cutoff));
        Ok((before - state.idempotency_records.len()) as u64)
    }
}

// =============================================================================
// Tests
// =============================================================================
