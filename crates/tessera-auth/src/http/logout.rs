//! Logout handler.

use axum::extract::State;
use axum::http::StatusCode;

use crate::AuthResult;
use crate::middleware::BearerAuth;

use super::ApiState;

/// Handler for `POST /api/auth/logout`.
///
/// Revokes every refresh credential of the authenticated user and returns
/// 204 No Content. Access credentials already issued stay valid until they
/// expire.
pub async fn logout_handler(
    State(state): State<ApiState>,
    BearerAuth(principal): BearerAuth,
) -> AuthResult<StatusCode> {
    state.auth_service.logout(principal.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}
