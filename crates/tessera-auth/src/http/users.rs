//! User administration handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::AuthResult;
use crate::middleware::BearerAuth;
use crate::rbac::catalog::{CatalogRegion, PermissionDeclaration};
use crate::sort::SortSpec;
use crate::storage::user::User;

use super::ApiState;

/// List active users.
pub const USER_READ_FIND_ALL: &str = "user.read.find-all";
/// Include deactivated users in listings; needs [`USER_READ_FIND_ALL`] too.
pub const USER_READ_DEACTIVATED: &str = "user.read.deactivated";
/// Deactivate users.
pub const USER_DEACTIVATE: &str = "user.deactivate";

/// Permissions checked by this module.
pub const CATALOG: CatalogRegion = CatalogRegion {
    name: "users",
    permissions: &[
        PermissionDeclaration::new(USER_READ_FIND_ALL, "List active users"),
        PermissionDeclaration::new(USER_READ_DEACTIVATED, "Include deactivated users in listings"),
        PermissionDeclaration::new(USER_DEACTIVATE, "Deactivate users"),
    ],
};

/// Query parameters of the user listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserListQuery {
    /// `field[,asc|desc]`.
    pub sort: Option<String>,
    /// Include deactivated users.
    #[serde(default)]
    pub include_deactivated: bool,
}

/// Handler for `GET /api/users`.
pub async fn list_users_handler(
    State(state): State<ApiState>,
    BearerAuth(principal): BearerAuth,
    Query(query): Query<UserListQuery>,
) -> AuthResult<Json<Vec<User>>> {
    if query.include_deactivated {
        state
            .engine()
            .require_admin_or_all(&principal, &[USER_READ_FIND_ALL, USER_READ_DEACTIVATED])?;
    } else {
        state
            .engine()
            .require_admin_or_permission(&principal, USER_READ_FIND_ALL)?;
    }
    let sort = SortSpec::parse_optional::<User>(query.sort.as_deref())?;

    let mut users = state.users.list_with_roles(query.include_deactivated).await?;
    if let Some(sort) = sort {
        sort.apply(&mut users);
    }
    Ok(Json(users))
}

/// Handler for `POST /api/users/{id}/deactivate`.
///
/// Returns the deactivated user. Its refresh credentials are revoked.
pub async fn deactivate_user_handler(
    State(state): State<ApiState>,
    BearerAuth(principal): BearerAuth,
    Path(user_id): Path<Uuid>,
) -> AuthResult<Json<User>> {
    state
        .engine()
        .require_admin_or_permission(&principal, USER_DEACTIVATE)?;

    let user = state.auth_service.deactivate(user_id).await?;
    tracing::info!(user_id = %user_id, deactivated_by = %principal.id(), "User deactivated via API");
    Ok(Json(user))
}
