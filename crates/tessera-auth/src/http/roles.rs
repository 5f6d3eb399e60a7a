//! Role administration handlers.
//!
//! Every handler checks its permission before touching storage, so a caller
//! without the permission gets 403 whether or not the target exists.

use std::sync::LazyLock;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use crate::AuthResult;
use crate::config::ROLE_NAME_PATTERN;
use crate::error::{AuthError, ValidationError};
use crate::middleware::BearerAuth;
use crate::rbac::catalog::{CatalogRegion, PermissionDeclaration};
use crate::sort::SortSpec;
use crate::storage::role::Role;

use super::{ApiState, ListQuery};

/// List roles.
pub const ROLE_READ_FIND_ALL: &str = "role.read.find-all";
/// Create roles.
pub const ROLE_CREATE: &str = "role.create";
/// Delete roles.
pub const ROLE_DELETE: &str = "role.delete";

/// Permissions checked by this module.
pub const CATALOG: CatalogRegion = CatalogRegion {
    name: "roles",
    permissions: &[
        PermissionDeclaration::new(ROLE_READ_FIND_ALL, "List roles with their permissions"),
        PermissionDeclaration::new(ROLE_CREATE, "Create roles"),
        PermissionDeclaration::new(ROLE_DELETE, "Delete roles not held by any user"),
    ],
};

static ROLE_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ROLE_NAME_PATTERN).expect("Invalid role name regex"));

/// Body of a role creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoleRequest {
    /// Role name matching [`ROLE_NAME_PATTERN`].
    pub name: String,
    /// Codes of the permissions to grant.
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl CreateRoleRequest {
    /// Validates the request shape.
    ///
    /// # Errors
    ///
    /// Returns a field-level validation error on `name` if it does not match
    /// the role name pattern.
    pub fn validate(&self) -> AuthResult<()> {
        if !ROLE_NAME_REGEX.is_match(&self.name) {
            return Err(AuthError::invalid_field(
                "name",
                "role.name.pattern",
                format!("Role name must match {}", ROLE_NAME_PATTERN),
            ));
        }
        Ok(())
    }
}

/// Handler for `GET /api/roles`.
pub async fn list_roles_handler(
    State(state): State<ApiState>,
    BearerAuth(principal): BearerAuth,
    Query(query): Query<ListQuery>,
) -> AuthResult<Json<Vec<Role>>> {
    state
        .engine()
        .require_admin_or_permission(&principal, ROLE_READ_FIND_ALL)?;
    let sort = SortSpec::parse_optional::<Role>(query.sort.as_deref())?;

    let mut roles = state.roles.list_with_permissions().await?;
    if let Some(sort) = sort {
        sort.apply(&mut roles);
    }
    Ok(Json(roles))
}

/// Handler for `POST /api/roles`.
///
/// Unknown permission codes are reported as field-level errors on
/// `permissions`; a taken name is a conflict.
pub async fn create_role_handler(
    State(state): State<ApiState>,
    BearerAuth(principal): BearerAuth,
    Json(request): Json<CreateRoleRequest>,
) -> AuthResult<(StatusCode, Json<Role>)> {
    state
        .engine()
        .require_admin_or_permission(&principal, ROLE_CREATE)?;
    request.validate()?;

    let mut role = Role::new(request.name.clone());
    let mut unknown = Vec::new();
    for code in &request.permissions {
        match state.permissions.find_by_code(code).await? {
            Some(permission) => {
                if !role.has_permission(&permission.code) {
                    role = role.with_permission(permission);
                }
            }
            None => unknown.push(ValidationError::field(
                "permissions",
                "role.permission.unknown",
                format!("Unknown permission '{}'", code),
            )),
        }
    }
    if !unknown.is_empty() {
        return Err(AuthError::validation(unknown));
    }

    state.roles.create(&role).await?;
    tracing::info!(role = %role.name, created_by = %principal.id(), "Role created");
    Ok((StatusCode::CREATED, Json(role)))
}

/// Handler for `DELETE /api/roles/{id}`.
///
/// Fails with 409 while any user holds the role.
pub async fn delete_role_handler(
    State(state): State<ApiState>,
    BearerAuth(principal): BearerAuth,
    Path(role_id): Path<Uuid>,
) -> AuthResult<StatusCode> {
    state
        .engine()
        .require_admin_or_permission(&principal, ROLE_DELETE)?;

    state.roles.delete(role_id).await?;
    tracing::info!(role_id = %role_id, deleted_by = %principal.id(), "Role deleted");
    Ok(StatusCode::NO_CONTENT)
}
