//! docvault: backup, restore and disaster recovery for a document database
//!
//! docvault provides:
//! - **Backups**: full logical export streamed as a tar+gzip archive into
//!   object storage, with a retention window
//! - **Restores**: drop-and-replace restore of every archived collection
//! - **Verification**: restore drills into a disposable database
//! - **Disaster recovery**: select, restore, migrate and verify in one run,
//!   with an alert at the end
//!
//! # Quick Start
//!
//! ```no_run
//! use docvault::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let mut config = VaultConfig::from_env()?;
//! config.database.source = Some("./data/app.db".into());
//!
//! let vault = Vault::from_config(config)?;
//! let cancel = CancellationToken::new();
//!
//! let report = vault.backup(None, Some("nightly"), &cancel).await?;
//! println!("uploaded {} ({} bytes)", report.key, report.size_bytes);
//!
//! let drill = vault.verify(Some(&report.key), &cancel).await?;
//! assert!(drill.passed);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod backup;
pub mod export;
pub mod migration;
pub mod notify;
pub mod prelude;
pub mod recovery;
pub mod restore;
pub mod retention;
pub mod storage;
pub mod vault;
pub mod verify;

// Re-export core types
pub use docvault_core::{
    config::{
        AlertConfig, BackupConfig, DatabaseConfig, RecoveryConfig, RestoreConfig,
        SmokeCheckConfig, StorageConfig, StorageProvider, VaultConfig,
    },
    document::{codec, Binary, Document, ObjectId, Value, ID_FIELD},
    error::{DecodeError, ErrorDetail, ErrorKind, Result, VaultError},
    traits::{DatabaseProvider, DocumentCursor, DocumentStore, InsertOutcome, Rejection},
    types::{ArchiveManifest, BackupKey, RejectedDocument, RestoreReport},
};

// Re-export implementations
pub use docvault_sqlite::{SqliteDatabaseProvider, SqliteDocumentStore};

// Re-export main types from this crate
pub use archive::{ArchiveReader, ArchiveWarning, ArchiveWriter};
pub use backup::{BackupReport, BackupRunner};
pub use export::{export, spawn_export, ExportOptions, ExportSummary};
pub use migration::{
    CommandMigrationRunner, DocumentMigration, MigrationManager, MigrationRunner,
    MigrationSummary, NoopMigrationRunner,
};
pub use notify::{Alert, LogNotifier, Notifier, Severity, WebhookNotifier};
pub use recovery::{DisasterRecovery, DisasterRecoveryRun, RunPhase, StepStatus};
pub use restore::{
    restore_archive, restore_from_storage, restore_stream, RestoreError, RestoreOptions,
};
pub use retention::RetentionOutcome;
pub use storage::{ArchiveStorage, ArchiveStream, BackupObject, ObjectStoreBackend, UploadReceipt};
pub use vault::Vault;
pub use verify::{CheckResult, VerificationReport, VerificationRunner};
