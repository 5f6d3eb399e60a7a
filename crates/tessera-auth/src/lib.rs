//! # tessera-auth
//!
//! Session credentials, idempotent execution and role-based access control.
//!
//! This crate provides:
//! - RS256 access and refresh credentials with persisted refresh bookkeeping
//!   and bulk revocation
//! - An idempotency executor guaranteeing at-most-once execution per key
//! - A permission catalog reconciled against storage at startup
//! - An authorization engine evaluated against live roles and permissions
//! - Axum extractors, handlers and error responses
//!
//! ## Modules
//!
//! - [`config`] - Configuration types and validation
//! - [`token`] - Credential signing, verification and lifecycle
//! - [`idempotency`] - At-most-once execution
//! - [`rbac`] - Permission catalog and authorization engine
//! - [`bootstrap`] - Startup initializers
//! - [`service`] - Login, logout, password change, deactivation
//! - [`storage`] - Storage traits and the in-memory backend
//! - [`middleware`] - Extractors and error responses
//! - [`http`] - Handlers and router
//! - [`module`] - One-step assembly from configuration

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod http;
pub mod idempotency;
pub mod middleware;
pub mod module;
pub mod password;
pub mod rbac;
pub mod service;
pub mod sort;
pub mod storage;
pub mod sweeper;
pub mod token;

pub use bootstrap::{BootstrapReport, Bootstrapper, StepOutcome};
pub use config::{AuthConfig, ConfigError, InitializationStrategy};
pub use error::{AuthError, AuthResult, ErrorFamily, ValidationError};
pub use http::{ApiState, permission_registry, router};
pub use idempotency::IdempotencyExecutor;
pub use middleware::{AuthState, BearerAuth, IdempotencyKey};
pub use module::{AuthModule, AuthStores};
pub use rbac::{AuthorizationEngine, PermissionCatalog, PermissionRegistry, Principal};
pub use service::{AuthService, ChangePasswordRequest, LoginRequest};
pub use sort::{SortDirection, SortSpec, Sortable};
pub use storage::{
    IdempotencyRecord, IdempotencyStorage, MemoryAuthStorage, Permission, PermissionStorage,
    RefreshCredential, RefreshTokenStorage, Role, RoleStorage, User, UserStorage,
};
pub use sweeper::{SweepStats, Sweeper};
pub use token::{JwtService, SigningKeyPair, TokenClaims, TokenPair, TokenService, TokenType};
