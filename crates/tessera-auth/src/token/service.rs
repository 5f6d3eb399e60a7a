//! Token lifecycle service.
//!
//! Issues access/refresh pairs, exchanges refresh credentials for new access
//! credentials, verifies credentials and revokes everything an identity
//! holds.
//!
//! # Usage
//!
//! ```ignore
//! use tessera_auth::token::{TokenService, TokenConfig};
//!
//! let service = TokenService::new(jwt_service, refresh_storage, user_storage, TokenConfig::default());
//!
//! let pair = service.issue_pair(&user).await?;
//! let refreshed = service.refresh(&pair.refresh_token).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::AuthResult;
use crate::config::TokenSettings;
use crate::error::AuthError;
use crate::storage::refresh_token::{RefreshCredential, RefreshTokenStorage};
use crate::storage::user::{User, UserStorage};
use crate::token::jwt::{JwtService, TokenClaims, TokenType};

/// An access/refresh credential pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Signed access credential.
    pub access_token: String,
    /// Signed refresh credential.
    pub refresh_token: String,
}

/// Configuration for the token service.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Access credential lifetime.
    pub access_token_lifetime: Duration,

    /// Refresh credential lifetime.
    pub refresh_token_lifetime: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::minutes(15),
            refresh_token_lifetime: Duration::days(30),
        }
    }
}

impl TokenConfig {
    /// Sets the access credential lifetime.
    #[must_use]
    pub fn with_access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    /// Sets the refresh credential lifetime.
    #[must_use]
    pub fn with_refresh_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.refresh_token_lifetime = lifetime;
        self
    }
}

impl From<&TokenSettings> for TokenConfig {
    fn from(settings: &TokenSettings) -> Self {
        Self {
            access_token_lifetime: to_time_duration(settings.access_token_lifetime),
            refresh_token_lifetime: to_time_duration(settings.refresh_token_lifetime),
        }
    }
}

fn to_time_duration(duration: std::time::Duration) -> Duration {
    Duration::try_from(duration).unwrap_or(Duration::MAX)
}

/// Token service for issuing, refreshing, verifying and revoking credentials.
pub struct TokenService {
    /// JWT service for encoding/decoding tokens.
    jwt_service: Arc<JwtService>,

    /// Refresh credential storage.
    refresh_token_storage: Arc<dyn RefreshTokenStorage>,

    /// User storage, for the claims snapshot on refresh.
    user_storage: Arc<dyn UserStorage>,

    /// Service configuration.
    config: TokenConfig,
}

impl TokenService {
    /// Creates a new token service.
    #[must_use]
    pub fn new(
        jwt_service: Arc<JwtService>,
        refresh_token_storage: Arc<dyn RefreshTokenStorage>,
        user_storage: Arc<dyn UserStorage>,
        config: TokenConfig,
    ) -> Self {
        Self {
            jwt_service,
            refresh_token_storage,
            user_storage,
            config,
        }
    }

    /// Issues an access/refresh pair for a user.
    ///
    /// The access credential carries a snapshot of the user's authorities.
    /// The refresh credential is persisted before the pair is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or the refresh row write fails.
    pub async fn issue_pair(&self, user: &User) -> AuthResult<TokenPair> {
        let access_token = self.mint_access(user)?;

        let claims = TokenClaims::refresh(
            self.jwt_service.issuer(),
            user.id.to_string(),
            self.config.refresh_token_lifetime.whole_seconds(),
        );
        let expires_at = claims.expires_at()?;
        let refresh_token = self.jwt_service.encode(&claims)?;

        self.refresh_token_storage
            .create(&RefreshCredential::new(
                user.id,
                refresh_token.clone(),
                expires_at,
            ))
            .await?;

        tracing::debug!(user_id = %user.id, "Issued credential pair");

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Exchanges a refresh credential for a new access credential.
    ///
    /// The refresh credential is not rotated; the same value is echoed back.
    ///
    /// # Errors
    ///
    /// Returns a credential error if:
    /// - The token is expired, malformed, unsupported or badly signed
    /// - The token is not a refresh credential
    /// - No row exists for the token (never issued, or revoked)
    ///
    /// Returns `AuthError::AccountNotFound` / `AuthError::AccountDisabled`
    /// if the owner is gone or deactivated.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        self.verify(refresh_token, TokenType::Refresh)?;

        let stored = self
            .refresh_token_storage
            .find_by_token(refresh_token)
            .await?
            .ok_or(AuthError::RefreshTokenNotFound)?;

        if stored.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(AuthError::TokenExpired);
        }

        let user = self
            .user_storage
            .find_by_id_with_roles(stored.user_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;
        if !user.is_enabled() {
            return Err(AuthError::AccountDisabled);
        }

        let access_token = self.mint_access(&user)?;

        tracing::debug!(user_id = %user.id, "Refreshed access credential");

        Ok(TokenPair {
            access_token,
            refresh_token: stored.token,
        })
    }

    /// Verifies a credential's signature, issuer and expiry, and that its
    /// `type` claim matches `expected`.
    ///
    /// # Errors
    ///
    /// Returns a classified credential error; a type mismatch is reported as
    /// `AuthError::UnsupportedToken`.
    pub fn verify(&self, token: &str, expected: TokenType) -> AuthResult<TokenClaims> {
        let data = self.jwt_service.decode::<TokenClaims>(token)?;
        if data.claims.token_type != expected {
            return Err(AuthError::unsupported_token(format!(
                "Expected {} credential, got {}",
                expected, data.claims.token_type
            )));
        }
        Ok(data.claims)
    }

    /// Deletes every refresh credential of a user.
    ///
    /// Outstanding access credentials stay valid until they expire.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn revoke_all(&self, user_id: Uuid) -> AuthResult<u64> {
        let revoked = self.refresh_token_storage.delete_by_user(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "Revoked refresh credentials");
        Ok(revoked)
    }

    /// Gets the JWT service reference.
    #[must_use]
    pub fn jwt_service(&self) -> &Arc<JwtService> {
        &self.jwt_service
    }

    /// Gets the service configuration.
    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    fn mint_access(&self, user: &User) -> AuthResult<String> {
        let claims = TokenClaims::access(
            self.jwt_service.issuer(),
            user.id.to_string(),
            self.config.access_token_lifetime.whole_seconds(),
            user.email.clone(),
            user.authorities().into_iter().collect(),
        );
        Ok(self.jwt_service.encode(&claims)?)
    }
}
