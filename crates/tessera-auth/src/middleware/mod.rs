//! HTTP extractors and error responses.
//!
//! - [`BearerAuth`] verifies the access credential and reloads the principal
//! - [`IdempotencyKey`] reads the `Idempotency-Key` header
//! - `AuthError` implements `IntoResponse` in [`error`]

pub mod auth;
pub mod error;
pub mod idempotency;

pub use auth::{AuthState, BearerAuth};
pub use error::{ERROR_FAMILY_HEADER, ErrorBody, status_code};
pub use idempotency::{IDEMPOTENCY_KEY_HEADER, IdempotencyKey};
