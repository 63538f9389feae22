//! Restore drills against a disposable database
//!
//! A verification restores a backup into a throwaway location, runs the
//! smoke checks, and always removes the throwaway database afterwards.
//! A backup that cannot be restored yields a failed report carrying the
//! error and whatever was restored before it.

use crate::restore::{restore_from_storage, RestoreError, RestoreOptions};
use crate::storage::{latest_archive, ArchiveStorage};
use chrono::{DateTime, Utc};
use docvault_core::{
    config::{SmokeCheckConfig, VaultConfig},
    error::{ErrorDetail, ErrorKind, Result, VaultError},
    traits::{DatabaseProvider, DocumentStore},
    types::RestoreReport,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of one smoke check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub collection: String,
    pub exists: bool,
    pub count: u64,
    pub min_count: u64,
    pub passed: bool,
}

/// Count every checked collection; a missing collection counts as 0
pub fn run_smoke_checks(
    store: &dyn DocumentStore,
    checks: &[SmokeCheckConfig],
) -> Result<Vec<CheckResult>> {
    checks
        .iter()
        .map(|check| {
            let exists = store.has_collection(&check.collection)?;
            let count = if exists { store.count(&check.collection)? } else { 0 };
            let passed = count >= check.min_count;
            if !passed {
                tracing::warn!(
                    collection = %check.collection,
                    count,
                    min_count = check.min_count,
                    "smoke check failed"
                );
            }
            Ok(CheckResult {
                collection: check.collection.clone(),
                exists,
                count,
                min_count: check.min_count,
                passed,
            })
        })
        .collect()
}

/// Collections whose check failed, for error messages
pub fn failed_checks(results: &[CheckResult]) -> Vec<String> {
    results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| format!("{} has {} documents, expected at least {}", r.collection, r.count, r.min_count))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub key: String,

    /// Disposable database the backup was restored into
    pub location: String,

    pub restore: RestoreReport,
    pub checks: Vec<CheckResult>,
    pub passed: bool,

    /// Why the restore or the checks could not finish
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Drops a database when it goes out of scope, unless already disposed
///
/// Covers early returns, panics and cancelled futures alike.
pub struct DisposableDatabase {
    provider: Arc<dyn DatabaseProvider>,
    location: String,
    disposed: bool,
}

impl DisposableDatabase {
    pub fn new(provider: Arc<dyn DatabaseProvider>, location: impl Into<String>) -> Self {
        Self {
            provider,
            location: location.into(),
            disposed: false,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Drop the database now, reporting failures
    pub fn dispose(mut self) -> Result<()> {
        self.disposed = true;
        self.provider.drop_database(&self.location)
    }
}

impl Drop for DisposableDatabase {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        if let Err(e) = self.provider.drop_database(&self.location) {
            tracing::warn!(location = %self.location, error = %e, "failed to drop disposable database");
        }
    }
}

/// Restores backups into a disposable database and checks them
pub struct VerificationRunner {
    storage: Arc<dyn ArchiveStorage>,
    provider: Arc<dyn DatabaseProvider>,
    prefix: String,
    production: Option<String>,
    verify_location: Option<String>,
    checks: Vec<SmokeCheckConfig>,
    restore_options: RestoreOptions,
}

impl VerificationRunner {
    pub fn new(
        storage: Arc<dyn ArchiveStorage>,
        provider: Arc<dyn DatabaseProvider>,
        config: &VaultConfig,
    ) -> Self {
        Self {
            storage,
            provider,
            prefix: config.storage.prefix.clone(),
            production: config.database.target.clone(),
            verify_location: config.database.verify.clone(),
            checks: config.recovery.smoke_checks.clone(),
            restore_options: RestoreOptions::from(&config.restore),
        }
    }

    /// Where the drill restores to: the configured location or a fresh temp path
    fn disposable_location(&self) -> Result<String> {
        let location = match &self.verify_location {
            Some(location) => location.clone(),
            None => std::env::temp_dir()
                .join(format!("docvault-verify-{}.db", uuid::Uuid::new_v4()))
                .to_string_lossy()
                .into_owned(),
        };

        if let Some(production) = &self.production {
            if same_location(production, &location) {
                return Err(VaultError::Configuration(format!(
                    "verify location {} is the production database",
                    location
                )));
            }
        }
        Ok(location)
    }

    /// Verify `key`, or the newest archive when `None`
    pub async fn verify(
        &self,
        key: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<VerificationReport> {
        let started_at = Utc::now();
        let location = self.disposable_location()?;

        let key = match key {
            Some(key) => key.to_string(),
            None => {
                latest_archive(self.storage.as_ref(), &self.prefix)
                    .await?
                    .ok_or_else(|| {
                        VaultError::NotFound(format!("no backups under {}", self.prefix))
                    })?
                    .key
            }
        };

        tracing::info!(key = %key, location = %location, "verifying backup");

        // Start from an empty database even if a previous drill left one behind.
        self.provider.drop_database(&location)?;
        let guard = DisposableDatabase::new(self.provider.clone(), location.clone());

        let result = self.restore_and_check(&key, &location, cancel).await;
        let disposed = guard.dispose();

        let (restore, checks, error) = match result {
            Ok((restore, checks)) => {
                disposed?;
                (restore, checks, None)
            }
            Err(e) if e.kind() == ErrorKind::Cancelled => return Err(e.into()),
            Err(e) => {
                if let Err(drop_err) = disposed {
                    tracing::warn!(location = %location, error = %drop_err, "failed to drop disposable database");
                }
                tracing::error!(key = %key, error = %e.source, "backup could not be restored for verification");
                let detail = ErrorDetail::from(&e.source);
                (e.partial, Vec::new(), Some(detail))
            }
        };

        let passed = error.is_none() && checks.iter().all(|c| c.passed);
        if passed {
            tracing::info!(key = %key, "backup verified");
        } else if error.is_none() {
            tracing::warn!(key = %key, failed = ?failed_checks(&checks), "backup failed verification");
        }

        Ok(VerificationReport {
            key,
            location,
            restore,
            checks,
            passed,
            error,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Restore into `location` and run the smoke checks, keeping whatever
    /// was restored when either step fails
    async fn restore_and_check(
        &self,
        key: &str,
        location: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<(RestoreReport, Vec<CheckResult>), RestoreError> {
        let store = self
            .provider
            .open(location)
            .map_err(|e| RestoreError::new(e, RestoreReport::new()))?;
        let restore = restore_from_storage(
            self.storage.as_ref(),
            key,
            store.clone(),
            &self.restore_options,
            cancel,
        )
        .await?;
        match run_smoke_checks(store.as_ref(), &self.checks) {
            Ok(checks) => Ok((restore, checks)),
            Err(e) => Err(RestoreError::new(e, restore)),
        }
    }
}

fn same_location(a: &str, b: &str) -> bool {
    if a.trim() == b.trim() {
        return true;
    }
    match (Path::new(a).canonicalize(), Path::new(b).canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docvault_core::document::{Document, ID_FIELD};
    use docvault_sqlite::SqliteDocumentStore;

    #[test]
    fn test_missing_collection_counts_zero() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .insert_many("users", vec![Document::new().with(ID_FIELD, 1)])
            .unwrap();
        let checks = vec![
            SmokeCheckConfig::new("users").with_min_count(1),
            SmokeCheckConfig::new("orders"),
            SmokeCheckConfig::new("restaurants").with_min_count(1),
        ];

        let results = run_smoke_checks(&store, &checks).unwrap();

        assert!(results[0].passed);
        assert_eq!(results[1].count, 0);
        assert!(!results[1].exists);
        assert!(results[1].passed);
        assert!(!results[2].passed);
        assert_eq!(failed_checks(&results).len(), 1);
    }

    #[test]
    fn test_same_location() {
        assert!(same_location("/data/app.db", " /data/app.db"));
        assert!(!same_location("/data/app.db", "/data/verify.db"));
    }
}
