//! User storage trait.
//!
//! Defines the interface for user persistence operations.
//! Implementations are provided by storage backends (e.g., PostgreSQL).

use std::cmp::Ordering;
use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::sort::Sortable;
use crate::storage::role::Role;

// =============================================================================
// User Type
// =============================================================================

/// A user account.
///
/// Users are never deleted; deactivation sets `deactivated_at`. The email is
/// stored lower-cased and compared case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier for the user.
    pub id: Uuid,

    /// Unique, lower-cased email address. Doubles as the username.
    pub email: String,

    /// Argon2 PHC string. Never serialized.
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// When the account was registered.
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,

    /// Whether the email address has been verified.
    pub email_verified: bool,

    /// When the account was deactivated, if it was.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deactivated_at: Option<OffsetDateTime>,

    /// Consecutive failed login attempts.
    #[serde(skip_serializing, default)]
    pub failed_login_attempts: u32,

    /// Logins are refused until this instant.
    #[serde(skip_serializing, default)]
    pub locked_until: Option<OffsetDateTime>,

    /// Roles held by the user, with permissions materialized.
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl User {
    /// Creates a new enabled user with no roles.
    #[must_use]
    pub fn new(email: impl AsRef<str>, password_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email.as_ref()),
            password_hash: password_hash.into(),
            registered_at: OffsetDateTime::now_utc(),
            email_verified: false,
            deactivated_at: None,
            failed_login_attempts: 0,
            locked_until: None,
            roles: Vec::new(),
        }
    }

    /// Adds a role to the user.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    /// Marks the email as verified.
    #[must_use]
    pub fn verified(mut self) -> Self {
        self.email_verified = true;
        self
    }

    /// Returns `true` unless the account has been deactivated.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.deactivated_at.is_none()
    }

    /// Returns `true` if logins are refused at `now`.
    #[must_use]
    pub fn is_locked(&self, now: OffsetDateTime) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// Returns `true` if the user holds a role with this name.
    #[must_use]
    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.name == name)
    }

    /// Returns every role name and permission code the user holds.
    #[must_use]
    pub fn authorities(&self) -> BTreeSet<String> {
        let mut authorities = BTreeSet::new();
        for role in &self.roles {
            authorities.insert(role.name.clone());
            for permission in &role.permissions {
                authorities.insert(permission.code.clone());
            }
        }
        authorities
    }
}

impl Sortable for User {
    const FIELDS: &'static [&'static str] = &["id", "email", "registeredAt", "deactivatedAt"];

    fn compare_by(&self, other: &Self, field: &str) -> Ordering {
        match field {
            "id" => self.id.cmp(&other.id),
            "registeredAt" => self.registered_at.cmp(&other.registered_at),
            "deactivatedAt" => self.deactivated_at.cmp(&other.deactivated_at),
            _ => self.email.cmp(&other.email),
        }
    }
}

/// Lower-cases and trims an email address for storage and lookup.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// =============================================================================
// User Storage Trait
// =============================================================================

/// Storage operations for users.
///
/// Every read returns the user with roles and permissions materialized.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Find a user with roles by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id_with_roles(&self, user_id: Uuid) -> AuthResult<Option<User>>;

    /// Find a user with roles by email, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_email_with_roles(&self, email: &str) -> AuthResult<Option<User>>;

    /// List users with roles.
    ///
    /// Deactivated users are only included when `include_deactivated` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_with_roles(&self, include_deactivated: bool) -> AuthResult<Vec<User>>;

    /// Create a new user, linking the roles it carries.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if the email is taken.
    /// Returns `AuthError::NotFound` if a carried role doesn't exist.
    async fn create(&self, user: &User) -> AuthResult<()>;

    /// Attach an existing role to an existing user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the user or role doesn't exist.
    async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> AuthResult<()>;

    /// Replace the password hash.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the user doesn't exist.
    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> AuthResult<()>;

    /// Store the failed-login counter and lock expiry.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the user doesn't exist.
    async fn update_login_state(
        &self,
        user_id: Uuid,
        failed_login_attempts: u32,
        locked_until: Option<OffsetDateTime>,
    ) -> AuthResult<()>;

    /// Set `deactivated_at` on the user.
    ///
    /// Deactivating an already deactivated user keeps the original timestamp.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the user doesn't exist.
    async fn deactivate(&self, user_id: Uuid, at: OffsetDateTime) -> AuthResult<()>;

    /// Count all users, including deactivated ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn count(&self) -> AuthResult<i64>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::role::Permission;

    #[test]
    fn test_new_user_normalizes_email() {
        let user = User::new("  Alice@Example.COM ", "hash");
        assert_eq!(user.email, "alice@example.com");
        assert!(user.is_enabled());
        assert!(!user.email_verified);
    }

    #[test]
    fn test_deactivated_user_is_disabled() {
        let mut user = User::new("bob@example.com", "hash");
        user.deactivated_at = Some(OffsetDateTime::now_utc());
        assert!(!user.is_enabled());
    }

    #[test]
    fn test_lock_expiry() {
        let now = OffsetDateTime::now_utc();
        let mut user = User::new("bob@example.com", "hash");
        assert!(!user.is_locked(now));

        user.locked_until = Some(now + time::Duration::minutes(5));
        assert!(user.is_locked(now));
        assert!(!user.is_locked(now + time::Duration::minutes(6)));
    }

    #[test]
    fn test_authorities_include_roles_and_permissions() {
        let user = User::new("carol@example.com", "hash").with_role(
            Role::new("AUDITOR")
                .with_permission(Permission::new("role.read.find-all"))
                .with_permission(Permission::new("user.read.find-all")),
        );

        let authorities = user.authorities();
        assert!(authorities.contains("AUDITOR"));
        assert!(authorities.contains("role.read.find-all"));
        assert!(authorities.contains("user.read.find-all"));
        assert_eq!(authorities.len(), 3);
        assert!(user.has_role("AUDITOR"));
    }

    #[test]
    fn test_serialization_hides_secrets() {
        let user = User::new("dave@example.com", "$argon2id$secret");
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("failed_login_attempts").is_none());
        assert_eq!(json["email"], "dave@example.com");
    }
}
