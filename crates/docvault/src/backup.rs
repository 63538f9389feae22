//! Full logical backup: export, upload, then retention
//!
//! The export runs on the blocking pool while the upload drains its output,
//! so archiving and uploading overlap. Retention only runs once the new
//! archive is committed.

use crate::archive::ArchiveWarning;
use crate::export::{spawn_export, ExportOptions};
use crate::retention::{self, RetentionOutcome};
use crate::storage::ArchiveStorage;
use chrono::{DateTime, Utc};
use docvault_core::{
    config::BackupConfig,
    error::{ErrorDetail, ErrorKind, Result, VaultError},
    observe,
    traits::DocumentStore,
    types::BackupKey,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Report of one committed backup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupReport {
    pub key: String,
    pub location: String,
    pub size_bytes: u64,

    /// Hex SHA-256 of the archive
    pub content_hash: String,

    /// Documents exported per collection
    pub collections: BTreeMap<String, u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ArchiveWarning>,

    /// `None` when retention is disabled
    pub retention: Option<RetentionOutcome>,

    /// Retention failed after the archive was committed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_error: Option<ErrorDetail>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Backs up one database into one storage prefix
pub struct BackupRunner {
    store: Arc<dyn DocumentStore>,
    storage: Arc<dyn ArchiveStorage>,
    config: BackupConfig,
    prefix: String,
}

impl BackupRunner {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        storage: Arc<dyn ArchiveStorage>,
        config: BackupConfig,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            storage,
            config,
            prefix: prefix.into(),
        }
    }

    /// Take a backup under `prefix` (the configured one by default)
    pub async fn run(
        &self,
        prefix: Option<&str>,
        tag: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<BackupReport> {
        let started = Instant::now();
        let result = self.run_inner(prefix, tag, cancel).await;

        match &result {
            Ok(report) => observe::record_backup(started.elapsed(), report.size_bytes, true),
            Err(e) => {
                tracing::error!(error = %e, "backup failed");
                observe::record_backup(started.elapsed(), 0, false);
            }
        }
        result
    }

    async fn run_inner(
        &self,
        prefix: Option<&str>,
        tag: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<BackupReport> {
        let started_at = Utc::now();
        let prefix = prefix.unwrap_or(&self.prefix);
        validate_prefix(prefix)?;
        let key = BackupKey::new(prefix, started_at, tag).to_string();

        tracing::info!(key = %key, "starting backup");

        let (stream, export) = spawn_export(
            self.store.clone(),
            ExportOptions::from(&self.config),
            cancel.child_token(),
        );
        let uploaded = self.storage.upload(&key, stream, cancel).await;
        let exported = export.wait().await;

        let (receipt, summary) = match (uploaded, exported) {
            (Ok(receipt), Ok(summary)) => (receipt, summary),
            // A failed stream shows up as an archive error; the export knows the cause.
            (Err(upload_err), Err(export_err)) => {
                return Err(if upload_err.kind() == ErrorKind::Archive {
                    export_err
                } else {
                    upload_err
                })
            }
            (Err(upload_err), Ok(_)) => return Err(upload_err),
            (Ok(_), Err(export_err)) => {
                // The upload completed before the export reported failure.
                tracing::warn!(key = %key, "removing archive of a failed export");
                if let Err(e) = self.storage.delete_batch(std::slice::from_ref(&key)).await {
                    tracing::warn!(key = %key, error = %e, "failed to remove archive");
                }
                return Err(export_err);
            }
        };

        tracing::info!(
            key = %key,
            size_bytes = receipt.size_bytes,
            documents = summary.total_documents(),
            "backup uploaded"
        );

        let (retention, retention_error) = if self.config.retention_count > 0 {
            match retention::enforce(self.storage.as_ref(), prefix, self.config.retention_count)
                .await
            {
                Ok(outcome) => (Some(outcome), None),
                Err(e) => {
                    tracing::warn!(prefix, error = %e, "retention failed after backup");
                    (None, Some(ErrorDetail::from(&e)))
                }
            }
        } else {
            (None, None)
        };

        Ok(BackupReport {
            key: receipt.key,
            location: receipt.location,
            size_bytes: receipt.size_bytes,
            content_hash: receipt.content_hash,
            collections: summary.collections,
            warnings: summary.warnings,
            retention,
            retention_error,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

impl BackupReport {
    pub fn total_documents(&self) -> u64 {
        self.collections.values().sum()
    }
}

/// Fails with a configuration error when `prefix` cannot hold backup keys
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.starts_with('/') || prefix.contains("//") {
        return Err(VaultError::Configuration(format!(
            "invalid backup prefix {:?}",
            prefix
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ObjectStoreBackend;
    use docvault_core::document::{Document, ID_FIELD};
    use docvault_sqlite::SqliteDocumentStore;

    fn runner(config: BackupConfig) -> (BackupRunner, Arc<ObjectStoreBackend>) {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .insert_many(
                "users",
                (0..3).map(|i| Document::new().with(ID_FIELD, i)).collect(),
            )
            .unwrap();
        let storage = Arc::new(ObjectStoreBackend::in_memory());
        (
            BackupRunner::new(Arc::new(store), storage.clone(), config, "backups/"),
            storage,
        )
    }

    #[tokio::test]
    async fn test_backup_uploads_archive() {
        let (runner, storage) = runner(BackupConfig::default());

        let report = runner
            .run(None, Some("nightly"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.key.starts_with("backups/backup-"));
        assert!(report.key.ends_with("-nightly.tar.gz"));
        assert_eq!(report.collections.get("users"), Some(&3));
        assert_eq!(report.content_hash.len(), 64);
        assert!(report.retention.is_some());

        let listed = storage.list("backups/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size_bytes, report.size_bytes);
    }

    #[tokio::test]
    async fn test_retention_disabled_at_zero() {
        let (runner, _) = runner(BackupConfig::default().with_retention_count(0));

        let report = runner.run(None, None, &CancellationToken::new()).await.unwrap();

        assert!(report.retention.is_none());
        assert!(report.retention_error.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_backup_commits_nothing() {
        let (runner, storage) = runner(BackupConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = runner.run(None, None, &cancel).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(storage.list("backups/").await.unwrap().is_empty());
    }

    #[test]
    fn test_validate_prefix() {
        assert!(validate_prefix("backups/").is_ok());
        assert!(validate_prefix("").is_ok());
        assert!(validate_prefix("/abs/").is_err());
        assert!(validate_prefix("a//b/").is_err());
    }
}
