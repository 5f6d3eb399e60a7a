//! One-step assembly of every service from configuration.
//!
//! # Example
//!
//! ```ignore
//! let storage = Arc::new(MemoryAuthStorage::new());
//! let module = AuthModule::new(&config, AuthStores::shared(storage))?;
//!
//! module.bootstrapper().run().await?;
//! let sweeper = Arc::new(module.sweeper()).start();
//! axum::serve(listener, module.router()).await?;
//! ```

use std::sync::Arc;

use axum::Router;

use crate::AuthResult;
use crate::bootstrap::Bootstrapper;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::http::{self, ApiState};
use crate::idempotency::IdempotencyExecutor;
use crate::middleware::AuthState;
use crate::rbac::engine::AuthorizationEngine;
use crate::service::AuthService;
use crate::storage::idempotency::IdempotencyStorage;
use crate::storage::refresh_token::RefreshTokenStorage;
use crate::storage::role::{PermissionStorage, RoleStorage};
use crate::storage::user::UserStorage;
use crate::sweeper::Sweeper;
use crate::token::jwt::{JwtService, SigningKeyPair};
use crate::token::service::{TokenConfig, TokenService};

/// The storage backends the services run on.
#[derive(Clone)]
pub struct AuthStores {
    /// Users.
    pub users: Arc<dyn UserStorage>,
    /// Roles.
    pub roles: Arc<dyn RoleStorage>,
    /// Permissions.
    pub permissions: Arc<dyn PermissionStorage>,
    /// Refresh credentials.
    pub refresh_tokens: Arc<dyn RefreshTokenStorage>,
    /// Idempotency records.
    pub idempotency: Arc<dyn IdempotencyStorage>,
}

impl AuthStores {
    /// Uses one backend implementing every storage trait.
    #[must_use]
    pub fn shared<S>(storage: Arc<S>) -> Self
    where
        S: UserStorage
            + RoleStorage
            + PermissionStorage
            + RefreshTokenStorage
            + IdempotencyStorage
            + 'static,
    {
        Self {
            users: storage.clone(),
            roles: storage.clone(),
            permissions: storage.clone(),
            refresh_tokens: storage.clone(),
            idempotency: storage,
        }
    }
}

/// Fully constructed services.
pub struct AuthModule {
    config: AuthConfig,
    stores: AuthStores,
    token_service: Arc<TokenService>,
    engine: AuthorizationEngine,
    auth_service: Arc<AuthService>,
    idempotency: IdempotencyExecutor,
}

impl AuthModule {
    /// Validates the configuration, loads the signing key and builds every
    /// service.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the configuration is invalid or
    /// the signing key cannot be loaded.
    pub fn new(config: &AuthConfig, stores: AuthStores) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|e| AuthError::configuration(e.to_string()))?;
        let key = SigningKeyPair::from_config(&config.signing)
            .map_err(|e| AuthError::configuration(e.to_string()))?;
        Ok(Self::with_signing_key(config, stores, key))
    }

    /// Builds every service around an already loaded signing key.
    ///
    /// The configuration is not validated.
    #[must_use]
    pub fn with_signing_key(config: &AuthConfig, stores: AuthStores, key: SigningKeyPair) -> Self {
        let jwt_service = Arc::new(JwtService::new(key, config.tokens.issuer.clone()));
        let token_service = Arc::new(TokenService::new(
            jwt_service,
            stores.refresh_tokens.clone(),
            stores.users.clone(),
            TokenConfig::from(&config.tokens),
        ));
        let engine =
            AuthorizationEngine::new(stores.users.clone(), config.rbac.admin_role_name.clone());
        let auth_service = Arc::new(AuthService::new(
            stores.users.clone(),
            token_service.clone(),
            &config.lockout,
        ));
        let idempotency =
            IdempotencyExecutor::new(stores.idempotency.clone(), config.idempotency.ttl);

        Self {
            config: config.clone(),
            stores,
            token_service,
            engine,
            auth_service,
            idempotency,
        }
    }

    /// Returns the token service.
    #[must_use]
    pub fn token_service(&self) -> &Arc<TokenService> {
        &self.token_service
    }

    /// Returns the authorization engine.
    #[must_use]
    pub fn engine(&self) -> &AuthorizationEngine {
        &self.engine
    }

    /// Returns the account service.
    #[must_use]
    pub fn auth_service(&self) -> &Arc<AuthService> {
        &self.auth_service
    }

    /// Returns the idempotency executor.
    #[must_use]
    pub fn idempotency(&self) -> &IdempotencyExecutor {
        &self.idempotency
    }

    /// Returns the storage backends.
    #[must_use]
    pub fn stores(&self) -> &AuthStores {
        &self.stores
    }

    /// Builds the startup initializers over the handlers' permission registry.
    #[must_use]
    pub fn bootstrapper(&self) -> Bootstrapper {
        Bootstrapper::new(
            self.config.bootstrap.clone(),
            self.config.rbac.admin_role_name.clone(),
            self.stores.users.clone(),
            self.stores.roles.clone(),
            self.stores.permissions.clone(),
            http::permission_registry(),
        )
    }

    /// Builds the background sweeper.
    #[must_use]
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            self.stores.idempotency.clone(),
            self.stores.refresh_tokens.clone(),
            self.config.idempotency.ttl,
            self.config.idempotency.sweep_period,
        )
    }

    /// Returns the handler state.
    #[must_use]
    pub fn api_state(&self) -> ApiState {
        ApiState {
            auth: AuthState::new(self.token_service.clone(), self.engine.clone()),
            auth_service: self.auth_service.clone(),
            idempotency: self.idempotency.clone(),
            users: self.stores.users.clone(),
            roles: self.stores.roles.clone(),
            permissions: self.stores.permissions.clone(),
        }
    }

    /// Builds the router.
    #[must_use]
    pub fn router(&self) -> Router {
        http::router(self.api_state())
    }
}
