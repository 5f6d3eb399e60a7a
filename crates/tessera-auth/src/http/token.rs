//! Credential issuance and refresh handlers.
//!
//! - `POST /api/auth/login` exchanges email and password for a credential
//!   pair. Requires an `Idempotency-Key` header; a retry with the same key
//!   within the TTL replays the first result without logging in again.
//! - `POST /api/auth/refresh` exchanges a refresh credential for a new access
//!   credential. The refresh credential is echoed unchanged.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::{AuthError, ValidationError};
use crate::middleware::IdempotencyKey;
use crate::service::LoginRequest;
use crate::token::service::TokenPair;

use super::ApiState;

/// Body of a refresh request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshRequest {
    /// The refresh credential issued at login.
    pub refresh_token: String,
}

impl RefreshRequest {
    /// Validates the request shape.
    ///
    /// # Errors
    ///
    /// Returns a field-level validation error if the token is blank.
    pub fn validate(&self) -> AuthResult<()> {
        if self.refresh_token.trim().is_empty() {
            return Err(AuthError::validation(vec![ValidationError::field(
                "refresh_token",
                "refresh.token.blank",
                "Refresh token is required",
            )]));
        }
        Ok(())
    }
}

/// Handler for `POST /api/auth/login`.
pub async fn login_handler(
    State(state): State<ApiState>,
    IdempotencyKey(key): IdempotencyKey,
    Json(request): Json<LoginRequest>,
) -> AuthResult<Json<TokenPair>> {
    let pair = state
        .idempotency
        .wrap(key, || state.auth_service.login(&request))
        .await?;
    Ok(Json(pair))
}

/// Handler for `POST /api/auth/refresh`.
pub async fn refresh_handler(
    State(state): State<ApiState>,
    Json(request): Json<RefreshRequest>,
) -> AuthResult<Json<TokenPair>> {
    request.validate()?;
    let pair = state
        .auth_service
        .token_service()
        .refresh(request.refresh_token.trim())
        .await?;
    Ok(Json(pair))
}
