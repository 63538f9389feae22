//! docvault core: types and traits for the docvault backup engine
//!
//! This crate defines the pieces shared by every docvault crate:
//! - Error taxonomy with serializable error kinds for reports
//! - Layered configuration (JSON file + `DOCVAULT_*` environment)
//! - Tagged document model and the line-oriented Document Codec
//! - Database handle traits implemented by storage backends
//! - Backup keys, archive manifest and restore report types
//! - Optional metrics hooks (`observe` feature)

pub mod config;
pub mod document;
pub mod error;
pub mod observe;
pub mod traits;
pub mod types;

pub use config::{
    AlertConfig, BackupConfig, DatabaseConfig, RecoveryConfig, RestoreConfig, SmokeCheckConfig,
    StorageConfig, StorageProvider, VaultConfig,
};
pub use document::{Binary, Document, ObjectId, Value};
pub use error::{DecodeError, ErrorDetail, ErrorKind, Result, VaultError};
pub use traits::{DatabaseProvider, DocumentCursor, DocumentStore, InsertOutcome, Rejection};
pub use types::{ArchiveManifest, BackupKey, RejectedDocument, RestoreReport};
