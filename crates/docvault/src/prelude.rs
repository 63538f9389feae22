//! docvault Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use docvault::prelude::*;
//! ```

// Core types
pub use crate::{Document, ErrorKind, ObjectId, Result, Value, VaultError};

// Configs
pub use crate::{
    AlertConfig, BackupConfig, RecoveryConfig, RestoreConfig, SmokeCheckConfig, StorageConfig,
    StorageProvider, VaultConfig,
};

// Traits
pub use crate::{ArchiveStorage, DatabaseProvider, DocumentStore, MigrationRunner, Notifier};

// Implementations
pub use crate::{ObjectStoreBackend, SqliteDatabaseProvider, SqliteDocumentStore, Vault};

// Reports
pub use crate::{
    BackupReport, DisasterRecoveryRun, RestoreReport, RetentionOutcome, VerificationReport,
};

// Re-export common external deps
pub use anyhow;
pub use serde::{Deserialize, Serialize};
pub use std::sync::Arc;
pub use tokio_util::sync::CancellationToken;
pub use tracing;
