//! Startup initializers.
//!
//! Run in order: administrator role, administrator account, permission
//! catalog. Each step checks its [`InitializationStrategy`] against the row
//! count of its target table and logs whether it acted.

use std::sync::Arc;

use crate::AuthResult;
use crate::config::{BootstrapConfig, InitializationStrategy};
use crate::password::hash_password;
use crate::rbac::catalog::{PermissionCatalog, PermissionRegistry};
use crate::storage::role::{PermissionStorage, Role, RoleStorage};
use crate::storage::user::{User, UserStorage};

/// What a single initializer did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step created or inserted rows.
    Applied,
    /// The step ran and found nothing to do.
    UpToDate,
    /// The strategy did not call for running the step.
    Skipped,
}

/// Outcome of a full bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Administrator role step.
    pub admin_role: StepOutcome,
    /// Administrator account step.
    pub admin_account: StepOutcome,
    /// Permission catalog step.
    pub permission_catalog: StepOutcome,
    /// Codes inserted by the catalog step.
    pub inserted_permissions: Vec<String>,
}

/// Seeds the administrator role and account and reconciles the catalog.
pub struct Bootstrapper {
    config: BootstrapConfig,
    admin_role_name: String,
    user_storage: Arc<dyn UserStorage>,
    role_storage: Arc<dyn RoleStorage>,
    permission_storage: Arc<dyn PermissionStorage>,
    catalog: PermissionCatalog,
}

impl Bootstrapper {
    /// Creates a bootstrapper.
    #[must_use]
    pub fn new(
        config: BootstrapConfig,
        admin_role_name: impl Into<String>,
        user_storage: Arc<dyn UserStorage>,
        role_storage: Arc<dyn RoleStorage>,
        permission_storage: Arc<dyn PermissionStorage>,
        registry: PermissionRegistry,
    ) -> Self {
        let catalog = PermissionCatalog::new(registry, permission_storage.clone());
        Self {
            config,
            admin_role_name: admin_role_name.into(),
            user_storage,
            role_storage,
            permission_storage,
            catalog,
        }
    }

    /// Runs every initializer in dependency order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing step and returns its error.
    pub async fn run(&self) -> AuthResult<BootstrapReport> {
        let admin_role = self.ensure_admin_role().await?;
        let admin_account = self.ensure_admin_account().await?;
        let (permission_catalog, inserted_permissions) = self.reconcile_catalog().await?;

        Ok(BootstrapReport {
            admin_role,
            admin_account,
            permission_catalog,
            inserted_permissions,
        })
    }

    /// Creates the administrator role if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub async fn ensure_admin_role(&self) -> AuthResult<StepOutcome> {
        if !should_run(self.config.admin_role, self.role_storage.count().await?) {
            tracing::info!(role = %self.admin_role_name, "Admin role initializer skipped");
            return Ok(StepOutcome::Skipped);
        }

        if self
            .role_storage
            .find_by_name_with_permissions(&self.admin_role_name)
            .await?
            .is_some()
        {
            tracing::info!(role = %self.admin_role_name, "Admin role already present");
            return Ok(StepOutcome::UpToDate);
        }

        self.role_storage
            .create(&Role::new(self.admin_role_name.clone()))
            .await?;
        tracing::info!(role = %self.admin_role_name, "Admin role created");
        Ok(StepOutcome::Applied)
    }

    /// Creates the administrator account and attaches the administrator role.
    ///
    /// Skipped with a warning when no admin password is configured. An
    /// account is still created when the role is missing, without roles.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing or a storage operation fails.
    pub async fn ensure_admin_account(&self) -> AuthResult<StepOutcome> {
        if !should_run(self.config.admin_account, self.user_storage.count().await?) {
            tracing::info!("Admin account initializer skipped");
            return Ok(StepOutcome::Skipped);
        }

        let email = &self.config.admin_email;
        if self
            .user_storage
            .find_by_email_with_roles(email)
            .await?
            .is_some()
        {
            tracing::info!(email = %email, "Admin account already present");
            return Ok(StepOutcome::UpToDate);
        }

        let Some(password) = self.config.admin_password.as_deref() else {
            tracing::warn!(
                email = %email,
                "No admin password configured; admin account not created"
            );
            return Ok(StepOutcome::Skipped);
        };

        let mut user = User::new(email, hash_password(password)?).verified();
        match self
            .role_storage
            .find_by_name_with_permissions(&self.admin_role_name)
            .await?
        {
            Some(role) => user = user.with_role(role),
            None => tracing::warn!(
                role = %self.admin_role_name,
                "Admin role not found; admin account created without it"
            ),
        }

        self.user_storage.create(&user).await?;
        tracing::info!(user_id = %user.id, email = %user.email, "Admin account created");
        Ok(StepOutcome::Applied)
    }

    /// Inserts declared permissions missing from storage.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub async fn reconcile_catalog(&self) -> AuthResult<(StepOutcome, Vec<String>)> {
        if !should_run(
            self.config.permission_catalog,
            self.permission_storage.count().await?,
        ) {
            tracing::info!("Permission catalog initializer skipped");
            return Ok((StepOutcome::Skipped, Vec::new()));
        }

        let inserted: Vec<String> = self
            .catalog
            .synchronize()
            .await?
            .into_iter()
            .map(|p| p.code)
            .collect();

        if inserted.is_empty() {
            tracing::info!("Permission catalog up to date");
            Ok((StepOutcome::UpToDate, inserted))
        } else {
            tracing::info!(inserted = inserted.len(), codes = ?inserted, "Permission catalog updated");
            Ok((StepOutcome::Applied, inserted))
        }
    }
}

fn should_run(strategy: InitializationStrategy, rows: i64) -> bool {
    match strategy {
        InitializationStrategy::OnReload => true,
        InitializationStrategy::OnTableEmpty => rows == 0,
    }
}
