pub mod key;
pub mod manifest;
pub mod report;

pub use key::{BackupKey, ARCHIVE_EXTENSION, DEFAULT_PREFIX};
pub use manifest::{ArchiveManifest, ARCHIVE_FORMAT_VERSION, MANIFEST_ENTRY};
pub use report::{RejectedDocument, RestoreReport, MAX_REJECTION_SAMPLES};
