//! Role and permission storage.
//!
//! Roles are always read with their permissions materialized through
//! `role_permissions`.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use tessera_auth::{Permission, Role};
use uuid::Uuid;

use crate::{
    PgPool, StorageError, StorageResult, is_foreign_key_violation, is_unique_violation,
};

// =============================================================================
// Types
// =============================================================================

type PermissionTuple = (Uuid, String, Option<String>);

pub(crate) type RoleLinkTuple = (Uuid, String, Option<Uuid>, Option<String>, Option<String>);

/// One role joined with one of its permissions (or none).
#[derive(Debug, Clone)]
pub(crate) struct RoleLinkRow {
    pub role_id: Uuid,
    pub role_name: String,
    pub permission_id: Option<Uuid>,
    pub permission_code: Option<String>,
    pub permission_description: Option<String>,
}

impl RoleLinkRow {
    pub(crate) fn from_tuple(row: RoleLinkTuple) -> Self {
        Self {
            role_id: row.0,
            role_name: row.1,
            permission_id: row.2,
            permission_code: row.3,
            permission_description: row.4,
        }
    }
}

fn permission_from_tuple(row: PermissionTuple) -> Permission {
    Permission {
        id: row.0,
        code: row.1,
        description: row.2,
    }
}

/// Folds joined rows into roles. Rows of one role must be adjacent.
pub(crate) fn group_roles(rows: impl IntoIterator<Item = RoleLinkRow>) -> Vec<Role> {
    let mut roles: Vec<Role> = Vec::new();
    for row in rows {
        if roles.last().is_none_or(|role| role.id != row.role_id) {
            roles.push(Role {
                id: row.role_id,
                name: row.role_name,
                permissions: Vec::new(),
            });
        }
        if let (Some(id), Some(code), Some(role)) =
            (row.permission_id, row.permission_code, roles.last_mut())
        {
            role.permissions.push(Permission {
                id,
                code,
                description: row.permission_description,
            });
        }
    }
    roles
}

const ROLE_LINK_SELECT: &str = r#"
    SELECT r.id, r.name, p.id, p.code, p.description
    FROM roles r
    LEFT JOIN role_permissions rp ON rp.role_id = r.id
    LEFT JOIN permissions p ON p.id = rp.permission_id
"#;

// =============================================================================
// Role Storage
// =============================================================================

/// Role storage operations.
pub struct RoleStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> RoleStorage<'a> {
    /// Create a new role storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find a role with its permissions by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, role_id: Uuid) -> StorageResult<Option<Role>> {
        let sql = format!("{ROLE_LINK_SELECT} WHERE r.id = $1 ORDER BY p.code");
        let rows: Vec<RoleLinkTuple> = query_as(&sql).bind(role_id).fetch_all(self.pool).await?;
        Ok(group_roles(rows.into_iter().map(RoleLinkRow::from_tuple)).pop())
    }

    /// Find a role with its permissions by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_name(&self, name: &str) -> StorageResult<Option<Role>> {
        let sql = format!("{ROLE_LINK_SELECT} WHERE r.name = $1 ORDER BY p.code");
        let rows: Vec<RoleLinkTuple> = query_as(&sql).bind(name).fetch_all(self.pool).await?;
        Ok(group_roles(rows.into_iter().map(RoleLinkRow::from_tuple)).pop())
    }

    /// List every role with its permissions, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> StorageResult<Vec<Role>> {
        let sql = format!("{ROLE_LINK_SELECT} ORDER BY r.name, p.code");
        let rows: Vec<RoleLinkTuple> = query_as(&sql).fetch_all(self.pool).await?;
        Ok(group_roles(rows.into_iter().map(RoleLinkRow::from_tuple)))
    }

    /// Insert a role and link the permissions it carries, in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the name is taken and
    /// `StorageError::NotFound` if a carried permission doesn't exist.
    pub async fn create(&self, role: &Role) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        query("INSERT INTO roles (id, name) VALUES ($1, $2)")
            .bind(role.id)
            .bind(&role.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    return StorageError::conflict(format!(
                        "Role with name '{}' already exists",
                        role.name
                    ));
                }
                StorageError::from(e)
            })?;

        for permission in &role.permissions {
            query("INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)")
                .bind(role.id)
                .bind(permission.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if is_foreign_key_violation(&e) {
                        return StorageError::not_found("Permission", permission.id);
                    }
                    StorageError::from(e)
                })?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Link a permission to a role. Linking twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the role or permission doesn't exist.
    pub async fn assign_permission(&self, role_id: Uuid, permission_id: Uuid) -> StorageResult<()> {
        let (role_exists, permission_exists): (bool, bool) = query_as(
            r#"
            SELECT EXISTS (SELECT 1 FROM roles WHERE id = $1),
                   EXISTS (SELECT 1 FROM permissions WHERE id = $2)
            "#,
        )
        .bind(role_id)
        .bind(permission_id)
        .fetch_one(self.pool)
        .await?;

        if !role_exists {
            return Err(StorageError::not_found("Role", role_id));
        }
        if !permission_exists {
            return Err(StorageError::not_found("Permission", permission_id));
        }

        query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Delete a role. Its permission links go with it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a user holds the role and
    /// `StorageError::NotFound` if it doesn't exist.
    pub async fn delete(&self, role_id: Uuid) -> StorageResult<()> {
        let result = query("DELETE FROM roles WHERE id = $1")
            .bind(role_id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    return StorageError::conflict(format!(
                        "Role {} is still assigned to users",
                        role_id
                    ));
                }
                StorageError::from(e)
            })?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("Role", role_id));
        }
        Ok(())
    }

    /// Count all roles.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> StorageResult<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM roles")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Permission Storage
// =============================================================================

/// Permission storage operations.
pub struct PermissionStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> PermissionStorage<'a> {
    /// Create a new permission storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List every permission, ordered by code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> StorageResult<Vec<Permission>> {
        let rows: Vec<PermissionTuple> =
            query_as("SELECT id, code, description FROM permissions ORDER BY code")
                .fetch_all(self.pool)
                .await?;
        Ok(rows.into_iter().map(permission_from_tuple).collect())
    }

    /// Find a permission by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, permission_id: Uuid) -> StorageResult<Option<Permission>> {
        let row: Option<PermissionTuple> =
            query_as("SELECT id, code, description FROM permissions WHERE id = $1")
                .bind(permission_id)
                .fetch_optional(self.pool)
                .await?;
        Ok(row.map(permission_from_tuple))
    }

    /// Find a permission by code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_code(&self, code: &str) -> StorageResult<Option<Permission>> {
        let row: Option<PermissionTuple> =
            query_as("SELECT id, code, description FROM permissions WHERE code = $1")
                .bind(code)
                .fetch_optional(self.pool)
                .await?;
        Ok(row.map(permission_from_tuple))
    }

    /// Insert permissions in one transaction. Nothing is inserted if any
    /// code is taken.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` on a duplicate code.
    pub async fn insert_many(&self, permissions: &[Permission]) -> StorageResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for permission in permissions {
            let result =
                query("INSERT INTO permissions (id, code, description) VALUES ($1, $2, $3)")
                    .bind(permission.id)
                    .bind(&permission.code)
                    .bind(&permission.description)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        if is_unique_violation(&e) {
                            return StorageError::conflict(format!(
                                "Permission '{}' already exists",
                                permission.code
                            ));
                        }
                        StorageError::from(e)
                    })?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Delete a permission.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a role holds the permission and
    /// `StorageError::NotFound` if it doesn't exist.
    pub async fn delete(&self, permission_id: Uuid) -> StorageResult<()> {
        let result = query("DELETE FROM permissions WHERE id = $1")
            .bind(permission_id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    return StorageError::conflict(format!(
                        "Permission {} is still granted to roles",
                        permission_id
                    ));
                }
                StorageError::from(e)
            })?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("Permission", permission_id));
        }
        Ok(())
    }

    /// Count all permissions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> StorageResult<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM permissions")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role: Uuid, name: &str, permission: Option<(Uuid, &str)>) -> RoleLinkRow {
        RoleLinkRow {
            role_id: role,
            role_name: name.to_string(),
            permission_id: permission.map(|p| p.0),
            permission_code: permission.map(|p| p.1.to_string()),
            permission_description: None,
        }
    }

    #[test]
    fn test_group_roles_folds_adjacent_rows() {
        let admin = Uuid::new_v4();
        let auditor = Uuid::new_v4();
        let read = Uuid::new_v4();
        let create = Uuid::new_v4();

        let roles = group_roles(vec![
            row(admin, "ADMIN", None),
            row(auditor, "AUDITOR", Some((create, "role.create"))),
            row(auditor, "AUDITOR", Some((read, "role.read.find-all"))),
        ]);

        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].name, "ADMIN");
        assert!(roles[0].permissions.is_empty());
        assert_eq!(roles[1].permissions.len(), 2);
        assert!(roles[1].has_permission("role.read.find-all"));
    }

    #[test]
    fn test_group_roles_empty() {
        assert!(group_roles(Vec::new()).is_empty());
    }
}
