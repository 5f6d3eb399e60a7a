//! Bearer credential authentication extractor.
//!
//! # Example
//!
//! ```ignore
//! use tessera_auth::middleware::BearerAuth;
//!
//! async fn protected_handler(BearerAuth(principal): BearerAuth) -> String {
//!     format!("Hello, {}!", principal.user().email)
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use uuid::Uuid;

use crate::error::AuthError;
use crate::rbac::engine::{AuthorizationEngine, Principal};
use crate::token::jwt::TokenType;
use crate::token::service::TokenService;

// =============================================================================
// Auth State
// =============================================================================

/// State required for bearer authentication.
///
/// Made available to the [`BearerAuth`] extractor via `FromRef`.
#[derive(Clone)]
pub struct AuthState {
    /// Token service for credential verification.
    pub token_service: Arc<TokenService>,

    /// Engine used to reload the principal.
    pub engine: AuthorizationEngine,
}

impl AuthState {
    /// Creates a new auth state.
    #[must_use]
    pub fn new(token_service: Arc<TokenService>, engine: AuthorizationEngine) -> Self {
        Self {
            token_service,
            engine,
        }
    }
}

// =============================================================================
// Bearer Auth Extractor
// =============================================================================

/// Axum extractor that validates an access credential and loads the principal.
///
/// This extractor:
/// 1. Extracts the `Authorization: Bearer <token>` header
/// 2. Verifies signature, issuer, expiry and the `ACCESS` type
/// 3. Reloads the user with live roles and permissions from storage
///
/// Claims carried by the credential are not used for authorization.
///
/// # Errors
///
/// Rejects with `AuthError` (which implements `IntoResponse`) if the header
/// is missing or malformed, the credential does not verify, or the account
/// is gone or deactivated.
pub struct BearerAuth(pub Principal);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);

        let token = bearer_token(parts)?;

        let claims = auth_state
            .token_service
            .verify(token, TokenType::Access)
            .inspect_err(|e| tracing::debug!(error = %e, "Access credential rejected"))?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::malformed_token("Subject is not a user id"))?;

        let principal = auth_state.engine.load_principal(user_id).await?;

        tracing::debug!(user_id = %principal.id(), "Request authenticated");

        Ok(BearerAuth(principal))
    }
}

/// Returns the credential from the `Authorization` header.
fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AuthError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AuthError::unauthorized("Authorization header is not valid ASCII"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::unauthorized("Authorization scheme must be Bearer"))?
        .trim();

    if token.is_empty() {
        return Err(AuthError::unauthorized("Empty Bearer token"));
    }

    Ok(token)
}
