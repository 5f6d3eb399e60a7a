//! User storage.
//!
//! Users are read with their roles (and the roles' permissions) attached.
//! Emails are compared case-insensitively through a unique index on
//! `lower(email)`.

use std::collections::HashMap;

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use tessera_auth::storage::user::normalize_email;
use tessera_auth::{Role, User};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::role::{RoleLinkRow, group_roles};
use crate::{
    PgPool, StorageError, StorageResult, is_foreign_key_violation, is_unique_violation,
};

// =============================================================================
// Types
// =============================================================================

type UserTuple = (
    Uuid,
    String,
    String,
    OffsetDateTime,
    bool,
    Option<OffsetDateTime>,
    i32,
    Option<OffsetDateTime>,
);

type UserRoleTuple = (
    Uuid,
    Uuid,
    String,
    Option<Uuid>,
    Option<String>,
    Option<String>,
);

/// User record from database, without roles.
#[derive(Debug, Clone)]
pub struct UserRow {
    /// User UUID
    pub id: Uuid,
    /// Normalized email
    pub email: String,
    /// Argon2 PHC string
    pub password_hash: String,
    /// Registration time
    pub registered_at: OffsetDateTime,
    /// Whether the email was verified
    pub email_verified: bool,
    /// Deactivation time
    pub deactivated_at: Option<OffsetDateTime>,
    /// Consecutive failed logins
    pub failed_login_attempts: i32,
    /// Lock expiry
    pub locked_until: Option<OffsetDateTime>,
}

impl UserRow {
    /// Create from database tuple.
    fn from_tuple(row: UserTuple) -> Self {
        Self {
            id: row.0,
            email: row.1,
            password_hash: row.2,
            registered_at: row.3,
            email_verified: row.4,
            deactivated_at: row.5,
            failed_login_attempts: row.6,
            locked_until: row.7,
        }
    }

    /// Attaches roles, producing the domain user.
    #[must_use]
    pub fn into_user(self, roles: Vec<Role>) -> User {
        User {
            id: self.id,
            email: self.email,
            password_hash: self.password_hash,
            registered_at: self.registered_at,
            email_verified: self.email_verified,
            deactivated_at: self.deactivated_at,
            failed_login_attempts: u32::try_from(self.failed_login_attempts).unwrap_or(0),
            locked_until: self.locked_until,
            roles,
        }
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, registered_at, email_verified, \
                            deactivated_at, failed_login_attempts, locked_until";

// =============================================================================
// User Storage
// =============================================================================

/// User storage operations.
pub struct UserStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> UserStorage<'a> {
    /// Create a new user storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Loads the roles of each given user.
    async fn load_roles(&self, user_ids: &[Uuid]) -> StorageResult<HashMap<Uuid, Vec<Role>>> {
        let rows: Vec<UserRoleTuple> = query_as(
            r#"
            SELECT ur.user_id, r.id, r.name, p.id, p.code, p.description
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            LEFT JOIN permissions p ON p.id = rp.permission_id
            WHERE ur.user_id = ANY($1)
            ORDER BY ur.user_id, r.name, p.code
            "#,
        )
        .bind(user_ids)
        .fetch_all(self.pool)
        .await?;

        let mut links: HashMap<Uuid, Vec<RoleLinkRow>> = HashMap::new();
        for row in rows {
            links
                .entry(row.0)
                .or_default()
                .push(RoleLinkRow::from_tuple((row.1, row.2, row.3, row.4, row.5)));
        }

        Ok(links
            .into_iter()
            .map(|(user_id, rows)| (user_id, group_roles(rows)))
            .collect())
    }

    async fn with_roles(&self, row: Option<UserRow>) -> StorageResult<Option<User>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let mut roles = self.load_roles(&[row.id]).await?;
        let user_roles = roles.remove(&row.id).unwrap_or_default();
        Ok(Some(row.into_user(user_roles)))
    }

    /// Find a user with roles by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, user_id: Uuid) -> StorageResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row: Option<UserTuple> = query_as(&sql)
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?;
        self.with_roles(row.map(UserRow::from_tuple)).await
    }

    /// Find a user with roles by email, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = $1");
        let row: Option<UserTuple> = query_as(&sql)
            .bind(normalize_email(email))
            .fetch_optional(self.pool)
            .await?;
        self.with_roles(row.map(UserRow::from_tuple)).await
    }

    /// List users with roles, ordered by registration time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self, include_deactivated: bool) -> StorageResult<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE $1 OR deactivated_at IS NULL \
             ORDER BY registered_at, id"
        );
        let rows: Vec<UserTuple> = query_as(&sql)
            .bind(include_deactivated)
            .fetch_all(self.pool)
            .await?;

        let rows: Vec<UserRow> = rows.into_iter().map(UserRow::from_tuple).collect();
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut roles = self.load_roles(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let user_roles = roles.remove(&row.id).unwrap_or_default();
                row.into_user(user_roles)
            })
            .collect())
    }

    /// Insert a user and link the roles it carries, in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the email is taken and
    /// `StorageError::NotFound` if a carried role doesn't exist.
    pub async fn create(&self, user: &User) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        query(
            r#"
            INSERT INTO users (id, email, password_hash, registered_at, email_verified,
                               deactivated_at, failed_login_attempts, locked_until)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id)
        .bind(normalize_email(&user.email))
        .bind(&user.password_hash)
        .bind(user.registered_at)
        .bind(user.email_verified)
        .bind(user.deactivated_at)
        .bind(i32::try_from(user.failed_login_attempts).unwrap_or(i32::MAX))
        .bind(user.locked_until)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return StorageError::conflict(format!(
                    "User with email '{}' already exists",
                    user.email
                ));
            }
            StorageError::from(e)
        })?;

        for role in &user.roles {
            query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
                .bind(user.id)
                .bind(role.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if is_foreign_key_violation(&e) {
                        return StorageError::not_found("Role", role.id);
                    }
                    StorageError::from(e)
                })?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Link a role to a user. Linking twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user or role doesn't exist.
    pub async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> StorageResult<()> {
        let (user_exists, role_exists): (bool, bool) = query_as(
            r#"
            SELECT EXISTS (SELECT 1 FROM users WHERE id = $1),
                   EXISTS (SELECT 1 FROM roles WHERE id = $2)
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .fetch_one(self.pool)
        .await?;

        if !user_exists {
            return Err(StorageError::not_found("User", user_id));
        }
        if !role_exists {
            return Err(StorageError::not_found("Role", role_id));
        }

        query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(role_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Replace the password hash.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user doesn't exist.
    pub async fn update_password(&self, user_id: Uuid, password_hash: &str) -> StorageResult<()> {
        let result = query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(self.pool)
            .await?;
        expect_one_row(result.rows_affected(), user_id)
    }

    /// Store the failed-login counter and lock expiry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user doesn't exist.
    pub async fn update_login_state(
        &self,
        user_id: Uuid,
        failed_login_attempts: u32,
        locked_until: Option<OffsetDateTime>,
    ) -> StorageResult<()> {
        let result = query(
            "UPDATE users SET failed_login_attempts = $2, locked_until = $3 WHERE id = $1",
        )
        .bind(user_id)
        .bind(i32::try_from(failed_login_attempts).unwrap_or(i32::MAX))
        .bind(locked_until)
        .execute(self.pool)
        .await?;
        expect_one_row(result.rows_affected(), user_id)
    }

    /// Set `deactivated_at`, keeping an earlier timestamp if present.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user doesn't exist.
    pub async fn deactivate(&self, user_id: Uuid, at: OffsetDateTime) -> StorageResult<()> {
        let result =
            query("UPDATE users SET deactivated_at = COALESCE(deactivated_at, $2) WHERE id = $1")
                .bind(user_id)
                .bind(at)
                .execute(self.pool)
                .await?;
        expect_one_row(result.rows_affected(), user_id)
    }

    /// Count all users, including deactivated ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> StorageResult<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

fn expect_one_row(rows_affected: u64, user_id: Uuid) -> StorageResult<()> {
    if rows_affected == 0 {
        return Err(StorageError::not_found("User", user_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_into_user() {
        let now = OffsetDateTime::now_utc();
        let row = UserRow {
            id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$...".to_string(),
            registered_at: now,
            email_verified: true,
            deactivated_at: None,
            failed_login_attempts: 2,
            locked_until: None,
        };

        let user = row.clone().into_user(vec![Role::new("AUDITOR")]);
        assert_eq!(user.id, row.id);
        assert_eq!(user.failed_login_attempts, 2);
        assert!(user.is_enabled());
        assert!(user.has_role("AUDITOR"));
    }

    #[test]
    fn test_negative_counter_reads_as_zero() {
        let row = UserRow {
            id: Uuid::new_v4(),
            email: "bob@example.com".to_string(),
            password_hash: String::new(),
            registered_at: OffsetDateTime::now_utc(),
            email_verified: false,
            deactivated_at: None,
            failed_login_attempts: -1,
            locked_until: None,
        };
        assert_eq!(row.into_user(Vec::new()).failed_login_attempts, 0);
    }

    #[test]
    fn test_missing_row_is_not_found() {
        let id = Uuid::new_v4();
        assert!(expect_one_row(0, id).unwrap_err().is_not_found());
        assert!(expect_one_row(1, id).is_ok());
    }
}
