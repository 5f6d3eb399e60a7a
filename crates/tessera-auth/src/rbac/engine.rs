//! Authorization engine.
//!
//! Predicates are evaluated against a [`Principal`] loaded from storage for
//! the current request. Credential claims never feed into a decision.

use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::user::{User, UserStorage};

/// The authenticated identity of one request.
#[derive(Debug, Clone)]
pub struct Principal {
    user: User,
    authorities: BTreeSet<String>,
}

impl Principal {
    /// Builds a principal from a user with materialized roles.
    #[must_use]
    pub fn new(user: User) -> Self {
        let authorities = user.authorities();
        Self { user, authorities }
    }

    /// The user's ID.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    /// The user as loaded for this request.
    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Role names and permission codes held by the user.
    #[must_use]
    pub fn authorities(&self) -> &BTreeSet<String> {
        &self.authorities
    }
}

/// Evaluates role and permission predicates.
#[derive(Clone)]
pub struct AuthorizationEngine {
    user_storage: Arc<dyn UserStorage>,
    admin_role_name: String,
}

impl AuthorizationEngine {
    /// Creates an engine treating `admin_role_name` as the administrator role.
    #[must_use]
    pub fn new(user_storage: Arc<dyn UserStorage>, admin_role_name: impl Into<String>) -> Self {
        Self {
            user_storage,
            admin_role_name: admin_role_name.into(),
        }
    }

    /// Returns the administrator role name.
    #[must_use]
    pub fn admin_role_name(&self) -> &str {
        &self.admin_role_name
    }

    /// Loads the live role and permission set of a user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AccountNotFound` if the user no longer exists and
    /// `AuthError::AccountDisabled` if it has been deactivated.
    pub async fn load_principal(&self, user_id: Uuid) -> AuthResult<Principal> {
        let user = self
            .user_storage
            .find_by_id_with_roles(user_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !user.is_enabled() {
            return Err(AuthError::AccountDisabled);
        }

        Ok(Principal::new(user))
    }

    /// Returns `true` if the principal holds the role or permission `name`.
    #[must_use]
    pub fn has_authority(&self, principal: &Principal, name: &str) -> bool {
        principal.authorities.contains(name)
    }

    /// Returns `true` if the principal holds the administrator role.
    #[must_use]
    pub fn is_admin(&self, principal: &Principal) -> bool {
        principal.user.has_role(&self.admin_role_name)
    }

    /// Returns `true` if the principal is an administrator or holds `permission`.
    #[must_use]
    pub fn is_admin_or_has_permission(&self, principal: &Principal, permission: &str) -> bool {
        self.is_admin(principal) || self.has_authority(principal, permission)
    }

    /// Returns `true` if the principal holds every one of `names`.
    #[must_use]
    pub fn has_all_authorities(&self, principal: &Principal, names: &[&str]) -> bool {
        names.iter().all(|name| self.has_authority(principal, name))
    }

    /// Returns `true` if the principal holds at least one of `names`.
    #[must_use]
    pub fn has_any_authorities(&self, principal: &Principal, names: &[&str]) -> bool {
        names.iter().any(|name| self.has_authority(principal, name))
    }

    /// Guard form of [`Self::is_admin_or_has_permission`].
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Forbidden` if the predicate is false.
    pub fn require_admin_or_permission(
        &self,
        principal: &Principal,
        permission: &str,
    ) -> AuthResult<()> {
        if self.is_admin_or_has_permission(principal, permission) {
            Ok(())
        } else {
            tracing::debug!(user_id = %principal.id(), permission, "Permission denied");
            Err(AuthError::forbidden(format!(
                "Missing permission '{}'",
                permission
            )))
        }
    }

    /// Guard requiring admin, or every one of `permissions`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Forbidden` if the principal is not an administrator
    /// and lacks any of the permissions.
    pub fn require_admin_or_all(&self, principal: &Principal, permissions: &[&str]) -> AuthResult<()> {
        if self.is_admin(principal) || self.has_all_authorities(principal, permissions) {
            Ok(())
        } else {
            tracing::debug!(user_id = %principal.id(), ?permissions, "Permission denied");
            Err(AuthError::forbidden(format!(
                "Missing one of permissions [{}]",
                permissions.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryAuthStorage;
    use crate::storage::role::{Permission, PermissionStorage, Role, RoleStorage};
    use time::OffsetDateTime;

    struct Fixture {
        storage: Arc<MemoryAuthStorage>,
        engine: AuthorizationEngine,
        admin: User,
        auditor: User,
        nobody: User,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryAuthStorage::new());
        let read_roles = Permission::new("role.read.find-all");
        let read_users = Permission::new("user.read.find-all");
        storage
            .insert_many(&[read_roles.clone(), read_users.clone()])
            .await
            .unwrap();

        let admin_role = Role::new("ADMIN");
        let auditor_role = Role::new("AUDITOR")
            .with_permission(read_roles)
            .with_permission(read_users);
        RoleStorage::create(storage.as_ref(), &admin_role)
            .await
            .unwrap();
        RoleStorage::create(storage.as_ref(), &auditor_role)
            .await
            .unwrap();

        let admin = User::new("admin@example.com", "h").with_role(admin_role);
        let auditor = User::new("auditor@example.com", "h").with_role(auditor_role);
        let nobody = User::new("nobody@example.com", "h");
        for user in [&admin, &auditor, &nobody] {
            UserStorage::create(storage.as_ref(), user).await.unwrap();
        }

        Fixture {
            engine: AuthorizationEngine::new(storage.clone(), "ADMIN"),
            storage,
            admin,
            auditor,
            nobody,
        }
    }

    #[tokio::test]
    async fn test_admin_passes_every_permission_gate() {
        let f = fixture().await;
        let admin = f.engine.load_principal(f.admin.id).await.unwrap();

        assert!(f.engine.is_admin(&admin));
        for permission in ["role.read.find-all", "anything.at.all", ""] {
            assert!(f.engine.is_admin_or_has_permission(&admin, permission));
        }
        assert!(!f.engine.has_authority(&admin, "role.read.find-all"));
    }

    #[tokio::test]
    async fn test_permission_holder_and_outsider() {
        let f = fixture().await;
        let auditor = f.engine.load_principal(f.auditor.id).await.unwrap();
        let nobody = f.engine.load_principal(f.nobody.id).await.unwrap();

        assert!(!f.engine.is_admin(&auditor));
        assert!(f.engine.is_admin_or_has_permission(&auditor, "role.read.find-all"));
        assert!(!f.engine.is_admin_or_has_permission(&auditor, "role.delete"));
        assert!(!f.engine.is_admin_or_has_permission(&nobody, "role.read.find-all"));

        let err = f
            .engine
            .require_admin_or_permission(&nobody, "role.read.find-all")
            .unwrap_err();
        assert!(matches!(err, AuthError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_all_and_any_composition() {
        let f = fixture().await;
        let auditor = f.engine.load_principal(f.auditor.id).await.unwrap();

        assert!(
            f.engine
                .has_all_authorities(&auditor, &["role.read.find-all", "user.read.find-all"])
        );
        assert!(
            !f.engine
                .has_all_authorities(&auditor, &["user.read.find-all", "user.read.deactivated"])
        );
        assert!(
            f.engine
                .has_any_authorities(&auditor, &["user.read.find-all", "user.read.deactivated"])
        );
        assert!(!f.engine.has_any_authorities(&auditor, &["role.delete"]));
        assert!(
            f.engine
                .require_admin_or_all(&auditor, &["user.read.find-all", "user.read.deactivated"])
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_principal_reflects_live_roles() {
        let f = fixture().await;
        let before = f.engine.load_principal(f.nobody.id).await.unwrap();
        assert!(!f.engine.is_admin(&before));

        let admin_role = f
            .storage
            .find_by_name_with_permissions("ADMIN")
            .await
            .unwrap()
            .unwrap();
        f.storage
            .assign_role(f.nobody.id, admin_role.id)
            .await
            .unwrap();

        let after = f.engine.load_principal(f.nobody.id).await.unwrap();
        assert!(f.engine.is_admin(&after));
    }

    #[tokio::test]
    async fn test_missing_and_disabled_users_rejected() {
        let f = fixture().await;
        let err = f.engine.load_principal(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountNotFound));

        f.storage
            .deactivate(f.auditor.id, OffsetDateTime::now_utc())
            .await
            .unwrap();
        let err = f.engine.load_principal(f.auditor.id).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountDisabled));
    }
}
