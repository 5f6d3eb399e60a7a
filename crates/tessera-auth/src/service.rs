//! Account operations: login, logout, password change and deactivation.
//!
//! Login looks the account up by email, enforces the lockout policy, checks
//! the password and records failed attempts before issuing a credential
//! pair. Every operation that invalidates existing sessions revokes all of
//! the account's refresh credentials.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::AuthResult;
use crate::config::LockoutConfig;
use crate::error::{AuthError, ValidationError};
use crate::password::{MIN_PASSWORD_LENGTH, hash_password, verify_password};
use crate::storage::user::{User, UserStorage};
use crate::token::service::{TokenPair, TokenService};

// =============================================================================
// Requests
// =============================================================================

/// Credentials submitted at login.
#[derive(Clone, Deserialize, Serialize)]
pub struct LoginRequest {
    /// Account email, matched case-insensitively.
    pub email: String,
    /// Plain-text password.
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl LoginRequest {
    /// Validates the request shape.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` listing every invalid field.
    pub fn validate(&self) -> AuthResult<()> {
        let mut errors = Vec::new();

        if self.email.trim().is_empty() {
            errors.push(ValidationError::field(
                "email",
                "login.email.blank",
                "Email is required",
            ));
        } else if !self.email.contains('@') {
            errors.push(ValidationError::field(
                "email",
                "login.email.invalid",
                "Email must contain '@'",
            ));
        }

        if self.password.is_empty() {
            errors.push(ValidationError::field(
                "password",
                "login.password.blank",
                "Password is required",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AuthError::validation(errors))
        }
    }
}

/// A password change of the authenticated account.
#[derive(Clone, Deserialize)]
pub struct ChangePasswordRequest {
    /// The password currently set.
    pub current_password: String,
    /// The replacement password.
    pub new_password: String,
}

impl ChangePasswordRequest {
    /// Validates the request shape.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` listing every invalid field.
    pub fn validate(&self) -> AuthResult<()> {
        let mut errors = Vec::new();

        if self.current_password.is_empty() {
            errors.push(ValidationError::field(
                "current_password",
                "password.current.blank",
                "Current password is required",
            ));
        }

        if self.new_password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.push(ValidationError::field(
                "new_password",
                "password.too-short",
                format!(
                    "New password must be at least {} characters",
                    MIN_PASSWORD_LENGTH
                ),
            ));
        } else if self.new_password == self.current_password {
            errors.push(ValidationError::field(
                "new_password",
                "password.unchanged",
                "New password must differ from the current one",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AuthError::validation(errors))
        }
    }
}

// =============================================================================
// Service
// =============================================================================

/// Account operations on top of the token lifecycle.
pub struct AuthService {
    user_storage: Arc<dyn UserStorage>,
    token_service: Arc<TokenService>,
    max_failed_attempts: u32,
    lockout_duration: Duration,
}

impl AuthService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        user_storage: Arc<dyn UserStorage>,
        token_service: Arc<TokenService>,
        lockout: &LockoutConfig,
    ) -> Self {
        Self {
            user_storage,
            token_service,
            max_failed_attempts: lockout.max_failed_attempts.max(1),
            lockout_duration: Duration::try_from(lockout.lockout_duration)
                .unwrap_or(Duration::MAX),
        }
    }

    /// Returns the token service.
    #[must_use]
    pub fn token_service(&self) -> &Arc<TokenService> {
        &self.token_service
    }

    /// Authenticates by email and password and issues a credential pair.
    ///
    /// # Errors
    ///
    /// - `AuthError::Validation` for a malformed request
    /// - `AuthError::BadCredentials` for an unknown email or wrong password
    /// - `AuthError::AccountLocked` while the account is locked, including
    ///   the attempt that triggers the lock
    /// - `AuthError::AccountDisabled` if the password is right but the
    ///   account has been deactivated
    pub async fn login(&self, request: &LoginRequest) -> AuthResult<TokenPair> {
        request.validate()?;
        let now = OffsetDateTime::now_utc();

        let Some(user) = self
            .user_storage
            .find_by_email_with_roles(&request.email)
            .await?
        else {
            tracing::debug!("Login for unknown email");
            return Err(AuthError::BadCredentials);
        };

        if user.is_locked(now) {
            tracing::debug!(user_id = %user.id, "Login for locked account");
            return Err(AuthError::AccountLocked {
                until: user.locked_until,
            });
        }

        if !verify_password(&request.password, &user.password_hash)? {
            return Err(self.record_failed_attempt(&user, now).await?);
        }

        if !user.is_enabled() {
            tracing::debug!(user_id = %user.id, "Login for deactivated account");
            return Err(AuthError::AccountDisabled);
        }

        if user.failed_login_attempts > 0 || user.locked_until.is_some() {
            self.user_storage
                .update_login_state(user.id, 0, None)
                .await?;
        }

        let pair = self.token_service.issue_pair(&user).await?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(pair)
    }

    /// Revokes every refresh credential of the user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn logout(&self, user_id: Uuid) -> AuthResult<()> {
        self.token_service.revoke_all(user_id).await?;
        Ok(())
    }

    /// Replaces the user's password and revokes all refresh credentials.
    ///
    /// # Errors
    ///
    /// - `AuthError::Validation` for a malformed request, or a field-level
    ///   error on `current_password` when it does not match
    /// - `AuthError::AccountNotFound` if the user no longer exists
    pub async fn change_password(
        &self,
        user_id: Uuid,
        request: &ChangePasswordRequest,
    ) -> AuthResult<()> {
        request.validate()?;

        let user = self
            .user_storage
            .find_by_id_with_roles(user_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !verify_password(&request.current_password, &user.password_hash)? {
            return Err(AuthError::invalid_field(
                "current_password",
                "password.current.mismatch",
                "Current password is incorrect",
            ));
        }

        let hash = hash_password(&request.new_password)?;
        self.user_storage.update_password(user.id, &hash).await?;
        self.token_service.revoke_all(user.id).await?;

        tracing::info!(user_id = %user.id, "Password changed");
        Ok(())
    }

    /// Deactivates the user and revokes all refresh credentials.
    ///
    /// Existing access credentials stop working on their next use, when the
    /// account is reloaded and found disabled.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the user does not exist.
    pub async fn deactivate(&self, user_id: Uuid) -> AuthResult<User> {
        self.user_storage
            .deactivate(user_id, OffsetDateTime::now_utc())
            .await?;
        self.token_service.revoke_all(user_id).await?;

        let user = self
            .user_storage
            .find_by_id_with_roles(user_id)
            .await?
            .ok_or_else(|| AuthError::not_found("User", user_id))?;

        tracing::info!(user_id = %user_id, "User deactivated");
        Ok(user)
    }

    /// Stores the incremented failure counter and returns the error to report.
    async fn record_failed_attempt(&self, user: &User, now: OffsetDateTime) -> AuthResult<AuthError> {
        let attempts = user.failed_login_attempts.saturating_add(1);

        if attempts >= self.max_failed_attempts {
            let until = now.checked_add(self.lockout_duration).ok_or_else(|| {
                AuthError::internal("lockout_duration overflows the date range")
            })?;
            self.user_storage
                .update_login_state(user.id, 0, Some(until))
                .await?;
            tracing::warn!(
                user_id = %user.id,
                attempts,
                "Account locked after repeated failed logins"
            );
            return Ok(AuthError::AccountLocked { until: Some(until) });
        }

        self.user_storage
            .update_login_state(user.id, attempts, None)
            .await?;
        tracing::debug!(user_id = %user.id, attempts, "Failed login");
        Ok(AuthError::BadCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryAuthStorage;
    use crate::storage::refresh_token::RefreshTokenStorage;
    use crate::token::jwt::{JwtService, SigningKeyPair, TokenType};
    use crate::token::service::TokenConfig;

    const PASSWORD: &str = "s3cret-password";

    struct Fixture {
        storage: Arc<MemoryAuthStorage>,
        service: AuthService,
        user: User,
    }

    async fn fixture(max_failed_attempts: u32) -> Fixture {
        let storage = Arc::new(MemoryAuthStorage::new());
        let key = SigningKeyPair::generate_rsa("test-key").unwrap();
        let jwt = Arc::new(JwtService::new(key, "https://auth.test"));
        let tokens = Arc::new(TokenService::new(
            jwt,
            storage.clone(),
            storage.clone(),
            TokenConfig::default(),
        ));

        let user = User::new("Alice@Example.com", hash_password(PASSWORD).unwrap());
        UserStorage::create(storage.as_ref(), &user).await.unwrap();

        let lockout = LockoutConfig {
            max_failed_attempts,
            lockout_duration: std::time::Duration::from_secs(60),
        };
        Fixture {
            service: AuthService::new(storage.clone(), tokens, &lockout),
            storage,
            user,
        }
    }

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_is_case_insensitive_and_issues_pair() {
        let f = fixture(5).await;
        let pair = f
            .service
            .login(&login("ALICE@example.COM", PASSWORD))
            .await
            .unwrap();

        let claims = f
            .service
            .token_service()
            .verify(&pair.access_token, TokenType::Access)
            .unwrap();
        assert_eq!(claims.sub, f.user.id.to_string());
        assert_eq!(claims.username.as_deref(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn test_unknown_email_is_bad_credentials() {
        let f = fixture(5).await;
        let err = f
            .service
            .login(&login("bob@example.com", PASSWORD))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::BadCredentials));
    }

    #[tokio::test]
    async fn test_unrepresentable_lockout_is_not_stored() {
        let f = fixture(1).await;
        let lockout = LockoutConfig {
            max_failed_attempts: 1,
            lockout_duration: std::time::Duration::MAX,
        };
        let service = AuthService::new(
            f.storage.clone(),
            f.service.token_service().clone(),
            &lockout,
        );

        let err = service
            .login(&login("alice@example.com", "wrong-password"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal { .. }));

        let stored = f
            .storage
            .find_by_id_with_roles(f.user.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_lockout_after_repeated_failures() {
        let f = fixture(3).await;

        for _ in 0..2 {
            let err = f
                .service
                .login(&login("alice@example.com", "wrong-password"))
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::BadCredentials));
        }

        let err = f
            .service
            .login(&login("alice@example.com", "wrong-password"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked { until: Some(_) }));

        let err = f
            .service
            .login(&login("alice@example.com", PASSWORD))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked { .. }));
    }

    #[tokio::test]
    async fn test_successful_login_resets_failures() {
        let f = fixture(3).await;
        f.service
            .login(&login("alice@example.com", "wrong-password"))
            .await
            .unwrap_err();
        f.service
            .login(&login("alice@example.com", PASSWORD))
            .await
            .unwrap();

        let stored = f
            .storage
            .find_by_id_with_roles(f.user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.failed_login_attempts, 0);
        assert!(stored.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_deactivated_account_cannot_login() {
        let f = fixture(5).await;
        f.service.deactivate(f.user.id).await.unwrap();

        let err = f
            .service
            .login(&login("alice@example.com", PASSWORD))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountDisabled));
    }

    #[tokio::test]
    async fn test_invalid_request_reports_every_field() {
        let f = fixture(5).await;
        let err = f.service.login(&login(" ", "")).await.unwrap_err();
        match err {
            AuthError::Validation { errors } => {
                let fields: Vec<_> = errors.iter().filter_map(|e| e.field.as_deref()).collect();
                assert_eq!(fields, vec!["email", "password"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_change_password_revokes_refresh_credentials() {
        let f = fixture(5).await;
        let pair = f
            .service
            .login(&login("alice@example.com", PASSWORD))
            .await
            .unwrap();

        let request = ChangePasswordRequest {
            current_password: PASSWORD.to_string(),
            new_password: "another-password".to_string(),
        };
        f.service.change_password(f.user.id, &request).await.unwrap();

        assert!(
            f.storage
                .find_by_token(&pair.refresh_token)
                .await
                .unwrap()
                .is_none()
        );
        f.service
            .login(&login("alice@example.com", "another-password"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_change_password_rejects_wrong_current() {
        let f = fixture(5).await;
        let request = ChangePasswordRequest {
            current_password: "not-the-password".to_string(),
            new_password: "another-password".to_string(),
        };
        let err = f
            .service
            .change_password(f.user.id, &request)
            .await
            .unwrap_err();
        match err {
            AuthError::Validation { errors } => {
                assert_eq!(errors[0].field.as_deref(), Some("current_password"));
                assert_eq!(errors[0].code, "password.current.mismatch");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
