//! JWKS endpoint HTTP handler.
//!
//! Provides `/.well-known/jwks.json` so third parties can verify access
//! credentials with the server's public key.
//!
//! # References
//!
//! - [RFC 7517 - JSON Web Key](https://tools.ietf.org/html/rfc7517)

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::token::jwt::JwtService;

/// State for the JWKS endpoint.
#[derive(Clone)]
pub struct JwksState {
    /// The JWT service holding the signing key.
    pub jwt_service: Arc<JwtService>,
}

impl JwksState {
    /// Creates a new JWKS state.
    #[must_use]
    pub fn new(jwt_service: Arc<JwtService>) -> Self {
        Self { jwt_service }
    }
}

/// Handler for `GET /.well-known/jwks.json`.
///
/// Returns 200 OK with the key set and a `Cache-Control` header allowing
/// caching for 1 hour.
///
/// ```json
/// {
///   "keys": [
///     { "kty": "RSA", "kid": "tessera-rs256", "use": "sig", "alg": "RS256", "n": "...", "e": "AQAB" }
///   ]
/// }
/// ```
pub async fn jwks_handler(State(state): State<JwksState>) -> impl IntoResponse {
    let jwks = state.jwt_service.jwks();
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Json(jwks),
    )
}
