//! # tessera-server
//!
//! Loads configuration, selects the storage backend, runs the bootstrap
//! initializers, starts the idempotency sweeper and serves the auth API.

pub mod config;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use server::{TesseraServer, build_app};
