//! Role-based access control: permission catalog and authorization engine.

pub mod catalog;
pub mod engine;

pub use catalog::{
    CatalogRegion, PermissionCatalog, PermissionDeclaration, PermissionRegistry, reconcile,
};
pub use engine::{AuthorizationEngine, Principal};
