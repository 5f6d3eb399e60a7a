//! Credential signing, verification and lifecycle.

pub mod jwt;
pub mod service;

pub use jwt::{Jwk, Jwks, JwtError, JwtService, SigningKeyPair, TokenClaims, TokenType};
pub use service::{TokenConfig, TokenPair, TokenService};
