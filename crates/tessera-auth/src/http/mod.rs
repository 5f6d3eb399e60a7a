//! Axum HTTP handlers and router.
//!
//! # Routes
//!
//! | Method | Path | Permission |
//! |---|---|---|
//! | GET | `/.well-known/jwks.json` | none |
//! | POST | `/api/auth/login` | none, `Idempotency-Key` required |
//! | POST | `/api/auth/refresh` | none |
//! | POST | `/api/auth/logout` | authenticated |
//! | GET | `/api/account` | authenticated |
//! | PUT | `/api/account/password` | authenticated |
//! | GET, POST | `/api/roles` | `role.read.find-all`, `role.create` |
//! | DELETE | `/api/roles/{id}` | `role.delete` |
//! | GET | `/api/permissions` | `permission.read.find-all` |
//! | DELETE | `/api/permissions/{id}` | `permission.delete` |
//! | GET | `/api/users` | `user.read.find-all` (+ `user.read.deactivated`) |
//! | POST | `/api/users/{id}/deactivate` | `user.deactivate` |
//!
//! Administrators pass every permission check.

pub mod account;
pub mod jwks;
pub mod logout;
pub mod permissions;
pub mod roles;
pub mod token;
pub mod users;

use std::sync::Arc;

use axum::Router;
use axum::extract::FromRef;
use axum::routing::{delete, get, post, put};
use serde::Deserialize;

use crate::idempotency::IdempotencyExecutor;
use crate::middleware::AuthState;
use crate::rbac::catalog::PermissionRegistry;
use crate::rbac::engine::AuthorizationEngine;
use crate::service::AuthService;
use crate::storage::role::{PermissionStorage, RoleStorage};
use crate::storage::user::UserStorage;

pub use jwks::{JwksState, jwks_handler};
pub use token::RefreshRequest;

/// Shared state of every handler.
#[derive(Clone)]
pub struct ApiState {
    /// Credential verification and principal loading.
    pub auth: AuthState,
    /// Login, logout, password change and deactivation.
    pub auth_service: Arc<AuthService>,
    /// At-most-once execution of login.
    pub idempotency: IdempotencyExecutor,
    /// User storage.
    pub users: Arc<dyn UserStorage>,
    /// Role storage.
    pub roles: Arc<dyn RoleStorage>,
    /// Permission storage.
    pub permissions: Arc<dyn PermissionStorage>,
}

impl ApiState {
    /// Returns the authorization engine.
    #[must_use]
    pub fn engine(&self) -> &AuthorizationEngine {
        &self.auth.engine
    }
}

impl FromRef<ApiState> for AuthState {
    fn from_ref(state: &ApiState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<ApiState> for JwksState {
    fn from_ref(state: &ApiState) -> Self {
        JwksState::new(state.auth.token_service.jwt_service().clone())
    }
}

/// Query parameters of list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// `field[,asc|desc]`.
    pub sort: Option<String>,
}

/// Returns the registry of every permission checked by the handlers.
#[must_use]
pub fn permission_registry() -> PermissionRegistry {
    PermissionRegistry::new()
        .with_region(roles::CATALOG)
        .with_region(permissions::CATALOG)
        .with_region(users::CATALOG)
}

/// Builds the router over the given state.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/.well-known/jwks.json", get(jwks_handler))
        .route("/api/auth/login", post(token::login_handler))
        .route("/api/auth/refresh", post(token::refresh_handler))
        .route("/api/auth/logout", post(logout::logout_handler))
        .route("/api/account", get(account::account_handler))
        .route(
            "/api/account/password",
            put(account::change_password_handler),
        )
        .route(
            "/api/roles",
            get(roles::list_roles_handler).post(roles::create_role_handler),
        )
        .route("/api/roles/{id}", delete(roles::delete_role_handler))
        .route(
            "/api/permissions",
            get(permissions::list_permissions_handler),
        )
        .route(
            "/api/permissions/{id}",
            delete(permissions::delete_permission_handler),
        )
        .route("/api/users", get(users::list_users_handler))
        .route(
            "/api/users/{id}/deactivate",
            post(users::deactivate_user_handler),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_handler_permission() {
        let codes: Vec<_> = permission_registry()
            .resolve_declared_permissions()
            .into_iter()
            .map(|d| d.code)
            .collect();
        assert_eq!(
            codes,
            vec![
                "permission.delete",
                "permission.read.find-all",
                "role.create",
                "role.delete",
                "role.read.find-all",
                "user.deactivate",
                "user.read.deactivated",
                "user.read.find-all",
            ]
        );
    }
}
