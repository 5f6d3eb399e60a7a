//! Role and permission storage traits.
//!
//! Defines the interface for role and permission persistence operations.
//! Implementations are provided by storage backends (e.g., PostgreSQL).

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthResult;
use crate::sort::Sortable;

// =============================================================================
// Permission
// =============================================================================

/// A permission that can be assigned to roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// Unique identifier for the permission.
    pub id: Uuid,

    /// Unique permission code, e.g. `role.read.find-all`.
    pub code: String,

    /// Description of what the permission allows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Permission {
    /// Create a new permission with the given code.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            description: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Sortable for Permission {
    const FIELDS: &'static [&'static str] = &["id", "code", "description"];

    fn compare_by(&self, other: &Self, field: &str) -> Ordering {
        match field {
            "id" => self.id.cmp(&other.id),
            "description" => self.description.cmp(&other.description),
            _ => self.code.cmp(&other.code),
        }
    }
}

// =============================================================================
// Role Type
// =============================================================================

/// A role in the authorization system.
///
/// Roles group permissions together and can be assigned to users.
/// Users inherit all permissions from their assigned roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique identifier for the role.
    pub id: Uuid,

    /// Unique role name, e.g. `ADMIN`.
    pub name: String,

    /// Permissions assigned to this role.
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl Role {
    /// Creates a new role with the given name and no permissions.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            permissions: Vec::new(),
        }
    }

    /// Adds a permission to the role.
    #[must_use]
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    /// Returns `true` if the role has a specific permission.
    #[must_use]
    pub fn has_permission(&self, code: &str) -> bool {
        self.permissions.iter().any(|p| p.code == code)
    }
}

impl Sortable for Role {
    const FIELDS: &'static [&'static str] = &["id", "name"];

    fn compare_by(&self, other: &Self, field: &str) -> Ordering {
        match field {
            "id" => self.id.cmp(&other.id),
            _ => self.name.cmp(&other.name),
        }
    }
}

// =============================================================================
// Role Storage Trait
// =============================================================================

/// Storage operations for roles.
///
/// Every read returns the role with its permissions materialized.
#[async_trait]
pub trait RoleStorage: Send + Sync {
    /// Find a role and its permissions by ID.
    ///
    /// Returns `None` if the role doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id_with_permissions(&self, role_id: Uuid) -> AuthResult<Option<Role>>;

    /// Find a role and its permissions by name.
    ///
    /// Returns `None` if the role doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_name_with_permissions(&self, name: &str) -> AuthResult<Option<Role>>;

    /// List all roles with their permissions.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_with_permissions(&self) -> AuthResult<Vec<Role>>;

    /// Create a new role, linking the permissions it carries.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if a role with the same name exists.
    /// Returns an error if the storage operation fails.
    async fn create(&self, role: &Role) -> AuthResult<()>;

    /// Attach an existing permission to an existing role.
    ///
    /// Attaching a permission the role already holds is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the role or permission doesn't exist.
    async fn assign_permission(&self, role_id: Uuid, permission_id: Uuid) -> AuthResult<()>;

    /// Delete a role.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The role doesn't exist (`AuthError::NotFound`)
    /// - Users are still assigned to the role (`AuthError::Conflict`)
    /// - The storage operation fails
    async fn delete(&self, role_id: Uuid) -> AuthResult<()>;

    /// Count all roles.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn count(&self) -> AuthResult<i64>;
}

// =============================================================================
// Permission Storage Trait
// =============================================================================

/// Storage operations for permissions.
#[async_trait]
pub trait PermissionStorage: Send + Sync {
    /// List all persisted permissions.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list(&self) -> AuthResult<Vec<Permission>>;

    /// Find a permission by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, permission_id: Uuid) -> AuthResult<Option<Permission>>;

    /// Find a permission by code.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_code(&self, code: &str) -> AuthResult<Option<Permission>>;

    /// Insert permissions in one batch.
    ///
    /// Returns the number of rows inserted.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if any code already exists; in that case
    /// nothing is inserted.
    async fn insert_many(&self, permissions: &[Permission]) -> AuthResult<u64>;

    /// Delete a permission.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The permission doesn't exist (`AuthError::NotFound`)
    /// - A role still references the permission (`AuthError::Conflict`)
    /// - The storage operation fails
    async fn delete(&self, permission_id: Uuid) -> AuthResult<()>;

    /// Count all permissions.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn count(&self) -> AuthResult<i64>;
}

// =============================================================================
// Tests
// =============================================================================
