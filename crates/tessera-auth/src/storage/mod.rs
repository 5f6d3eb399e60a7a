//! Storage traits for auth persistence.
//!
//! Backends implement these traits; the in-process [`memory`] backend lives
//! here, the PostgreSQL one in `tessera-auth-postgres`.

pub mod idempotency;
pub mod memory;
pub mod refresh_token;
pub mod role;
pub mod user;

pub use idempotency::{IdempotencyRecord, IdempotencyStorage};
pub use memory::MemoryAuthStorage;
pub use refresh_token::{RefreshCredential, RefreshTokenStorage};
pub use role::{Permission, PermissionStorage, Role, RoleStorage};
pub use user::{User, UserStorage, normalize_email};
