//! Unified docvault interface
//!
//! Bundles the archive storage, the database provider and the collaborators
//! configured in a [`VaultConfig`], and exposes every operator operation.

use crate::backup::{BackupReport, BackupRunner};
use crate::migration::{CommandMigrationRunner, MigrationRunner, NoopMigrationRunner};
use crate::notify::{notifier_from_config, Notifier};
use crate::recovery::{DisasterRecovery, DisasterRecoveryRun};
use crate::restore::{restore_from_storage, RestoreError, RestoreOptions};
use crate::retention::{self, RetentionOutcome};
use crate::storage::{ArchiveStorage, BackupObject, ObjectStoreBackend};
use crate::verify::{VerificationReport, VerificationRunner};
use docvault_core::{
    config::VaultConfig,
    error::Result,
    traits::DatabaseProvider,
    types::RestoreReport,
};
use docvault_sqlite::SqliteDatabaseProvider;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Vault {
    config: VaultConfig,
    storage: Arc<dyn ArchiveStorage>,
    provider: Arc<dyn DatabaseProvider>,
    migrations: Arc<dyn MigrationRunner>,
    notifier: Arc<dyn Notifier>,
}

impl Vault {
    /// Build every handle from `config`
    ///
    /// Fails fast with a configuration error when the storage location is
    /// unset; nothing is contacted yet.
    pub fn from_config(config: VaultConfig) -> Result<Self> {
        config.validate_storage()?;
        let storage = Arc::new(ObjectStoreBackend::from_config(&config.storage)?);

        let migrations: Arc<dyn MigrationRunner> = match &config.recovery.migration_command {
            Some(argv) if !argv.is_empty() => Arc::new(CommandMigrationRunner::from_argv(argv)?),
            _ => Arc::new(NoopMigrationRunner),
        };
        let notifier = notifier_from_config(&config.alert)?;

        Ok(Self {
            config,
            storage,
            provider: Arc::new(SqliteDatabaseProvider),
            migrations,
            notifier,
        })
    }

    pub fn with_storage(mut self, storage: Arc<dyn ArchiveStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn DatabaseProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_migrations(mut self, migrations: Arc<dyn MigrationRunner>) -> Self {
        self.migrations = migrations;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn ArchiveStorage> {
        &self.storage
    }

    /// Back up the configured source database
    pub async fn backup(
        &self,
        prefix: Option<&str>,
        tag: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<BackupReport> {
        let store = self.provider.open(self.config.source()?)?;
        BackupRunner::new(
            store,
            self.storage.clone(),
            self.config.backup.clone(),
            self.config.storage.prefix.clone(),
        )
        .run(prefix, tag, cancel)
        .await
    }

    /// Replace the collections of `target` with those in archive `key`
    pub async fn restore(
        &self,
        key: &str,
        target: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<RestoreReport, RestoreError> {
        let store = self
            .provider
            .open(target)
            .map_err(|e| RestoreError::new(e, RestoreReport::new()))?;
        restore_from_storage(
            self.storage.as_ref(),
            key,
            store,
            &RestoreOptions::from(&self.config.restore),
            cancel,
        )
        .await
    }

    /// Restore drill into a disposable database
    pub async fn verify(
        &self,
        key: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<VerificationReport> {
        VerificationRunner::new(self.storage.clone(), self.provider.clone(), &self.config)
            .verify(key, cancel)
            .await
    }

    pub async fn recover(
        &self,
        target: &str,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> DisasterRecoveryRun {
        DisasterRecovery::new(
            self.storage.clone(),
            self.provider.clone(),
            self.migrations.clone(),
            self.notifier.clone(),
            &self.config,
        )
        .run(target, dry_run, cancel)
        .await
    }

    /// Objects under `prefix` (the configured one by default), newest first
    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<BackupObject>> {
        self.storage
            .list(prefix.unwrap_or(&self.config.storage.prefix))
            .await
    }

    /// Apply a retention window outside of a backup
    pub async fn prune(&self, prefix: Option<&str>, keep: usize) -> Result<RetentionOutcome> {
        retention::enforce(
            self.storage.as_ref(),
            prefix.unwrap_or(&self.config.storage.prefix),
            keep,
        )
        .await
    }
}
