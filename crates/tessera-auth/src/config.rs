//! Authentication and authorization configuration.
//!
//! Everything the core consumes is collected in [`AuthConfig`]: credential
//! lifetimes, signing key material, idempotency settings, the administrator
//! role name, lockout policy and the bootstrap strategy of each initializer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Pattern every role name must match.
pub const ROLE_NAME_PATTERN: &str = r"^[A-Z][A-Z0-9_]{1,49}$";

/// Upper bound for every configured lifetime and duration (100 years).
/// Keeps `now + duration` representable as an `OffsetDateTime`.
pub const MAX_DURATION: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Root authentication and authorization configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth.tokens]
/// issuer = "https://auth.example.com"
/// access_token_lifetime = "15m"
/// refresh_token_lifetime = "30d"
///
/// [auth.idempotency]
/// ttl = "24h"
/// sweep_period = "1h"
///
/// [auth.bootstrap]
/// permission_catalog = "on_reload"
/// admin_password = "change-me"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Credential lifetimes and issuer.
    pub tokens: TokenSettings,

    /// Signing key material.
    pub signing: SigningConfig,

    /// Idempotency executor settings.
    pub idempotency: IdempotencyConfig,

    /// Role-based access control settings.
    pub rbac: RbacConfig,

    /// Failed-login lockout policy.
    pub lockout: LockoutConfig,

    /// Startup initializers.
    pub bootstrap: BootstrapConfig,
}

/// Credential issuance settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenSettings {
    /// Value of the `iss` claim; also required on verification.
    pub issuer: String,

    /// Access credential lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh credential lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            access_token_lifetime: Duration::from_secs(15 * 60),
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600),
        }
    }
}

/// Token signing configuration.
///
/// When no PEM paths are given an ephemeral RSA key pair is generated at
/// startup. Credentials signed with it do not survive a restart.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Key identifier published in the JWKS and the token header.
    pub key_id: String,

    /// PKCS#8 PEM file holding the RSA private key.
    pub private_key_path: Option<PathBuf>,

    /// SPKI PEM file holding the RSA public key.
    pub public_key_path: Option<PathBuf>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            key_id: "tessera-rs256".to_string(),
            private_key_path: None,
            public_key_path: None,
        }
    }
}

/// Idempotency executor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// How long a stored result is replayed for its key.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Interval between background sweeps of expired records.
    #[serde(with = "humantime_serde")]
    pub sweep_period: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 3600),
            sweep_period: Duration::from_secs(3600),
        }
    }
}

/// Role-based access control configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RbacConfig {
    /// Name of the role that passes every permission gate.
    pub admin_role_name: String,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            admin_role_name: "ADMIN".to_string(),
        }
    }
}

/// Failed-login lockout policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Consecutive failures before the account is locked.
    pub max_failed_attempts: u32,

    /// How long a locked account stays locked.
    #[serde(with = "humantime_serde")]
    pub lockout_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::from_secs(300),
        }
    }
}

/// When a bootstrap initializer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitializationStrategy {
    /// Run only when the target table has no rows.
    OnTableEmpty,
    /// Run on every start.
    OnReload,
}

/// Bootstrap initializer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Strategy for seeding the administrator role.
    pub admin_role: InitializationStrategy,

    /// Strategy for seeding the administrator account.
    pub admin_account: InitializationStrategy,

    /// Strategy for reconciling the permission catalog.
    pub permission_catalog: InitializationStrategy,

    /// Email of the seeded administrator account.
    pub admin_email: String,

    /// Password of the seeded administrator account.
    /// The account is not seeded when unset.
    pub admin_password: Option<String>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            admin_role: InitializationStrategy::OnTableEmpty,
            admin_account: InitializationStrategy::OnTableEmpty,
            permission_catalog: InitializationStrategy::OnReload,
            admin_email: "admin@localhost".to_string(),
            admin_password: None,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The issuer is empty
    /// - A lifetime, the idempotency TTL or the sweep period is zero
    /// - The refresh lifetime is not longer than the access lifetime
    /// - A lifetime, the idempotency TTL or the lockout duration exceeds
    ///   [`MAX_DURATION`]
    /// - The administrator role name does not match [`ROLE_NAME_PATTERN`]
    /// - `max_failed_attempts` is zero
    ///
    /// Returns `ConfigError::Missing` if only one of the two key paths is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.issuer.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }

        if self.tokens.access_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "access_token_lifetime must be > 0".to_string(),
            ));
        }

        if self.tokens.refresh_token_lifetime <= self.tokens.access_token_lifetime {
            return Err(ConfigError::InvalidValue(
                "refresh_token_lifetime must be longer than access_token_lifetime".to_string(),
            ));
        }

        for (name, value) in [
            ("access_token_lifetime", self.tokens.access_token_lifetime),
            ("refresh_token_lifetime", self.tokens.refresh_token_lifetime),
            ("idempotency ttl", self.idempotency.ttl),
            ("idempotency sweep_period", self.idempotency.sweep_period),
            ("lockout_duration", self.lockout.lockout_duration),
        ] {
            if value > MAX_DURATION {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must not exceed 100 years"
                )));
            }
        }

        match (
            &self.signing.private_key_path,
            &self.signing.public_key_path,
        ) {
            (Some(_), None) => {
                return Err(ConfigError::Missing("signing.public_key_path".to_string()));
            }
            (None, Some(_)) => {
                return Err(ConfigError::Missing(
                    "signing.private_key_path".to_string(),
                ));
            }
            _ => {}
        }

        if self.idempotency.ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "idempotency ttl must be > 0".to_string(),
            ));
        }

        if self.idempotency.sweep_period.is_zero() {
            return Err(ConfigError::InvalidValue(
                "idempotency sweep_period must be > 0".to_string(),
            ));
        }

        let pattern = regex::Regex::new(ROLE_NAME_PATTERN)
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        if !pattern.is_match(&self.rbac.admin_role_name) {
            return Err(ConfigError::InvalidValue(format!(
                "admin_role_name '{}' must match {}",
                self.rbac.admin_role_name, ROLE_NAME_PATTERN
            )));
        }

        if self.lockout.max_failed_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "max_failed_attempts must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rbac.admin_role_name, "ADMIN");
        assert_eq!(config.idempotency.sweep_period, Duration::from_secs(3600));
    }

    #[test]
    fn test_default_strategies() {
        let bootstrap = BootstrapConfig::default();
        assert_eq!(bootstrap.admin_role, InitializationStrategy::OnTableEmpty);
        assert_eq!(bootstrap.admin_account, InitializationStrategy::OnTableEmpty);
        assert_eq!(
            bootstrap.permission_catalog,
            InitializationStrategy::OnReload
        );
    }

    #[test]
    fn test_empty_issuer_fails_validation() {
        let mut config = AuthConfig::default();
        config.tokens.issuer = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("issuer"));
    }

    #[test]
    fn test_refresh_must_outlive_access() {
        let mut config = AuthConfig::default();
        config.tokens.refresh_token_lifetime = config.tokens.access_token_lifetime;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("refresh_token_lifetime"));
    }

    #[test]
    fn test_unrepresentable_lifetimes_fail_validation() {
        let nine_thousand_years = Duration::from_secs(9000 * 365 * 24 * 3600);

        let mut config = AuthConfig::default();
        config.tokens.refresh_token_lifetime = nine_thousand_years;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("refresh_token_lifetime"));

        let mut config = AuthConfig::default();
        config.tokens.access_token_lifetime = nine_thousand_years;
        config.tokens.refresh_token_lifetime = nine_thousand_years * 2;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("access_token_lifetime"));

        let mut config = AuthConfig::default();
        config.lockout.lockout_duration = Duration::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lockout_duration"));

        let mut config = AuthConfig::default();
        config.tokens.refresh_token_lifetime = MAX_DURATION;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_sweep_period_fails_validation() {
        let mut config = AuthConfig::default();
        config.idempotency.sweep_period = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sweep_period"));
    }

    #[test]
    fn test_admin_role_name_pattern() {
        let mut config = AuthConfig::default();
        config.rbac.admin_role_name = "admin".to_string();
        assert!(config.validate().is_err());

        config.rbac.admin_role_name = "SUPER_ADMIN".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_half_configured_key_pair_fails_validation() {
        let mut config = AuthConfig::default();
        config.signing.private_key_path = Some(PathBuf::from("/keys/private.pem"));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_deserialize_humantime_and_strategies() {
        let json = r#"{
            "tokens": { "access_token_lifetime": "5m", "refresh_token_lifetime": "7d" },
            "idempotency": { "ttl": "2h", "sweep_period": "30m" },
            "bootstrap": { "permission_catalog": "on_table_empty" }
        }"#;
        let config: AuthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.tokens.access_token_lifetime,
            Duration::from_secs(300)
        );
        assert_eq!(config.idempotency.ttl, Duration::from_secs(7200));
        assert_eq!(
            config.bootstrap.permission_catalog,
            InitializationStrategy::OnTableEmpty
        );
        assert_eq!(config.tokens.issuer, "http://localhost:8080");
    }
}
