use crate::traits::Rejection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound on rejected documents kept verbatim in a report
pub const MAX_REJECTION_SAMPLES: usize = 100;

/// A document the target database refused during restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedDocument {
    pub collection: String,

    /// 0-based position of the document inside its archive entry
    pub position: u64,

    pub reason: String,
}

/// Per-collection outcome of one restore pass
///
/// `collections` maps collection name to the number of documents inserted.
/// Rejections from unordered batch inserts are counted per collection; the
/// first [`MAX_REJECTION_SAMPLES`] are kept with their reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub collections: BTreeMap<String, u64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rejected: BTreeMap<String, u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<RejectedDocument>,
}

impl RestoreReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure the collection appears in the report, even with zero documents
    pub fn touch(&mut self, collection: &str) {
        self.collections.entry(collection.to_string()).or_insert(0);
    }

    pub fn record_inserted(&mut self, collection: &str, count: u64) {
        *self.collections.entry(collection.to_string()).or_insert(0) += count;
    }

    /// Record rejections from a batch whose first document sits at `batch_start`
    pub fn record_rejections(&mut self, collection: &str, batch_start: u64, rejections: &[Rejection]) {
        if rejections.is_empty() {
            return;
        }
        *self.rejected.entry(collection.to_string()).or_insert(0) += rejections.len() as u64;

        let room = MAX_REJECTION_SAMPLES.saturating_sub(self.rejections.len());
        self.rejections
            .extend(rejections.iter().take(room).map(|r| RejectedDocument {
                collection: collection.to_string(),
                position: batch_start + r.index as u64,
                reason: r.reason.clone(),
            }));
    }

    pub fn inserted(&self, collection: &str) -> u64 {
        self.collections.get(collection).copied().unwrap_or(0)
    }

    pub fn total_inserted(&self) -> u64 {
        self.collections.values().sum()
    }

    pub fn total_rejected(&self) -> u64 {
        self.rejected.values().sum()
    }
}
