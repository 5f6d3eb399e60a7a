//! Permission administration handlers.
//!
//! Permissions are created only by catalog reconciliation at startup; the
//! API can list them and delete ones no role references.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::AuthResult;
use crate::middleware::BearerAuth;
use crate::rbac::catalog::{CatalogRegion, PermissionDeclaration};
use crate::sort::SortSpec;
use crate::storage::role::Permission;

use super::{ApiState, ListQuery};

/// List permissions.
pub const PERMISSION_READ_FIND_ALL: &str = "permission.read.find-all";
/// Delete permissions.
pub const PERMISSION_DELETE: &str = "permission.delete";

/// Permissions checked by this module.
pub const CATALOG: CatalogRegion = CatalogRegion {
    name: "permissions",
    permissions: &[
        PermissionDeclaration::new(PERMISSION_READ_FIND_ALL, "List permissions"),
        PermissionDeclaration::new(
            PERMISSION_DELETE,
            "Delete permissions not granted to any role",
        ),
    ],
};

/// Handler for `GET /api/permissions`.
pub async fn list_permissions_handler(
    State(state): State<ApiState>,
    BearerAuth(principal): BearerAuth,
    Query(query): Query<ListQuery>,
) -> AuthResult<Json<Vec<Permission>>> {
    state
        .engine()
        .require_admin_or_permission(&principal, PERMISSION_READ_FIND_ALL)?;
    let sort = SortSpec::parse_optional::<Permission>(query.sort.as_deref())?;

    let mut permissions = state.permissions.list().await?;
    if let Some(sort) = sort {
        sort.apply(&mut permissions);
    }
    Ok(Json(permissions))
}

/// Handler for `DELETE /api/permissions/{id}`.
///
/// Fails with 409 while any role grants the permission.
pub async fn delete_permission_handler(
    State(state): State<ApiState>,
    BearerAuth(principal): BearerAuth,
    Path(permission_id): Path<Uuid>,
) -> AuthResult<StatusCode> {
    state
        .engine()
        .require_admin_or_permission(&principal, PERMISSION_DELETE)?;

    state.permissions.delete(permission_id).await?;
    tracing::info!(
        permission_id = %permission_id,
        deleted_by = %principal.id(),
        "Permission deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}
