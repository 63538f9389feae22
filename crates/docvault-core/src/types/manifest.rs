use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the trailing non-data entry of every archive
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Current archive layout version
pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

/// Archive manifest written after all collection entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveManifest {
    /// Archive layout version
    pub format_version: u32,

    /// Tool version that wrote the archive
    pub tool_version: String,

    /// Export timestamp (ISO 8601)
    pub created_at: String,

    /// Documents written per collection
    pub collections: BTreeMap<String, u64>,

    /// Non-fatal diagnostics raised while writing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ArchiveManifest {
    pub fn new(collections: BTreeMap<String, u64>, warnings: Vec<String>) -> Self {
        Self {
            format_version: ARCHIVE_FORMAT_VERSION,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            collections,
            warnings,
        }
    }
}
