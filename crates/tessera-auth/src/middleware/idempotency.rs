//! `Idempotency-Key` header extractor.

use axum::{
    extract::FromRequestParts,
    http::{HeaderName, request::Parts},
};
use uuid::Uuid;

use crate::error::{AuthError, ValidationError};

/// Header carrying the client-generated idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: HeaderName = HeaderName::from_static("idempotency-key");

/// A client-supplied idempotency key (UUID).
///
/// Required on retry-sensitive operations; a missing or malformed header is
/// a value-level validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdempotencyKey(pub Uuid);

impl<S> FromRequestParts<S> for IdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts.headers.get(IDEMPOTENCY_KEY_HEADER).ok_or_else(|| {
            AuthError::validation(vec![ValidationError::value(
                "idempotency.key.missing",
                "Idempotency-Key header is required",
            )])
        })?;

        value
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .map(IdempotencyKey)
            .ok_or_else(|| {
                AuthError::validation(vec![ValidationError::value(
                    "idempotency.key.invalid",
                    "Idempotency-Key header must be a UUID",
                )])
            })
    }
}
