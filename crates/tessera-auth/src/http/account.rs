//! Handlers for the authenticated account.
//!
//! Any authenticated user may read its own account and change its own
//! password; no permission is required.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::AuthResult;
use crate::middleware::BearerAuth;
use crate::service::ChangePasswordRequest;
use crate::storage::user::User;

use super::ApiState;

/// Handler for `GET /api/account`.
pub async fn account_handler(BearerAuth(principal): BearerAuth) -> Json<User> {
    Json(principal.user().clone())
}

/// Handler for `PUT /api/account/password`.
///
/// Revokes every refresh credential of the account on success.
pub async fn change_password_handler(
    State(state): State<ApiState>,
    BearerAuth(principal): BearerAuth,
    Json(request): Json<ChangePasswordRequest>,
) -> AuthResult<StatusCode> {
    state
        .auth_service
        .change_password(principal.id(), &request)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
