//! Permission catalog.
//!
//! Every protected operation declares the permission it checks in a
//! [`CatalogRegion`]. The [`PermissionRegistry`] collects the regions, and
//! [`PermissionCatalog::synchronize`] inserts the declared codes that are not
//! persisted yet. Synchronization is additive: persisted permissions that are
//! no longer declared are kept.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::AuthResult;
use crate::storage::role::{Permission, PermissionStorage};

/// A permission declared by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionDeclaration {
    /// Unique permission code.
    pub code: &'static str,
    /// Human-readable description.
    pub description: &'static str,
}

impl PermissionDeclaration {
    /// Declares a permission.
    #[must_use]
    pub const fn new(code: &'static str, description: &'static str) -> Self {
        Self { code, description }
    }

    /// Builds the row to insert for this declaration.
    #[must_use]
    pub fn to_permission(&self) -> Permission {
        Permission::new(self.code).with_description(self.description)
    }
}

/// A named group of declarations, one per protected area.
#[derive(Debug, Clone, Copy)]
pub struct CatalogRegion {
    /// Region name, used in logs.
    pub name: &'static str,
    /// Permissions checked by the region's operations.
    pub permissions: &'static [PermissionDeclaration],
}

/// Collects the catalog regions of the running code.
#[derive(Debug, Clone, Default)]
pub struct PermissionRegistry {
    regions: Vec<CatalogRegion>,
}

impl PermissionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a region.
    #[must_use]
    pub fn with_region(mut self, region: CatalogRegion) -> Self {
        self.regions.push(region);
        self
    }

    /// Returns the registered regions.
    #[must_use]
    pub fn regions(&self) -> &[CatalogRegion] {
        &self.regions
    }

    /// Returns every declared permission, sorted by code.
    ///
    /// A code declared more than once appears once, with the first
    /// description seen.
    #[must_use]
    pub fn resolve_declared_permissions(&self) -> Vec<PermissionDeclaration> {
        let mut by_code: BTreeMap<&'static str, PermissionDeclaration> = BTreeMap::new();
        for declaration in self.regions.iter().flat_map(|r| r.permissions.iter()) {
            by_code.entry(declaration.code).or_insert(*declaration);
        }
        by_code.into_values().collect()
    }
}

/// Returns the declared permissions whose code is not persisted.
#[must_use]
pub fn reconcile(
    declared: &[PermissionDeclaration],
    persisted: &[Permission],
) -> Vec<PermissionDeclaration> {
    let persisted: HashSet<&str> = persisted.iter().map(|p| p.code.as_str()).collect();
    declared
        .iter()
        .filter(|d| !persisted.contains(d.code))
        .copied()
        .collect()
}

/// Reconciles the registry with persisted permissions.
pub struct PermissionCatalog {
    registry: PermissionRegistry,
    storage: Arc<dyn PermissionStorage>,
}

impl PermissionCatalog {
    /// Creates a catalog over a registry and its backing storage.
    #[must_use]
    pub fn new(registry: PermissionRegistry, storage: Arc<dyn PermissionStorage>) -> Self {
        Self { registry, storage }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &PermissionRegistry {
        &self.registry
    }

    /// Inserts declared permissions missing from storage.
    ///
    /// Returns the inserted rows; empty when storage is already up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails, including a conflict
    /// when another instance inserted the same code concurrently.
    pub async fn synchronize(&self) -> AuthResult<Vec<Permission>> {
        let declared = self.registry.resolve_declared_permissions();
        let persisted = self.storage.list().await?;

        let to_insert: Vec<Permission> = reconcile(&declared, &persisted)
            .iter()
            .map(PermissionDeclaration::to_permission)
            .collect();

        if !to_insert.is_empty() {
            self.storage.insert_many(&to_insert).await?;
        }

        let regions: Vec<&str> = self.registry.regions().iter().map(|r| r.name).collect();
        tracing::debug!(
            ?regions,
            declared = declared.len(),
            persisted = persisted.len(),
            inserted = to_insert.len(),
            "Permission catalog reconciled"
        );

        Ok(to_insert)
    }
}
