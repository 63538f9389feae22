use crate::storage::{ArchiveStorage, FailedDelete};
use docvault_core::{error::Result, observe};
use serde::{Deserialize, Serialize};

/// Result of one retention pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionOutcome {
    /// False when retention is disabled (`keep == 0`)
    pub enforced: bool,

    /// Archives kept, newest first
    pub retained: Vec<String>,

    pub deleted: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedDelete>,
}

/// Keep the `keep` newest archives under `prefix` and delete the rest
///
/// Objects whose key is not a backup key are never touched. Running it again
/// after a partial failure converges on the same retained set.
pub async fn enforce(
    storage: &dyn ArchiveStorage,
    prefix: &str,
    keep: usize,
) -> Result<RetentionOutcome> {
    if keep == 0 {
        tracing::debug!(prefix, "retention disabled");
        return Ok(RetentionOutcome::default());
    }

    let archives: Vec<String> = storage
        .list(prefix)
        .await?
        .into_iter()
        .filter(|object| object.archive)
        .map(|object| object.key)
        .collect();

    let split = keep.min(archives.len());
    let (retained, expired) = archives.split_at(split);

    let mut outcome = RetentionOutcome {
        enforced: true,
        retained: retained.to_vec(),
        ..Default::default()
    };
    if expired.is_empty() {
        return Ok(outcome);
    }

    tracing::info!(prefix, keep, expired = expired.len(), "deleting expired archives");
    let deleted = storage.delete_batch(expired).await?;
    observe::record_retention(deleted.deleted.len(), deleted.failed.len());

    if !deleted.failed.is_empty() {
        tracing::warn!(
            failed = deleted.failed.len(),
            "some expired archives could not be deleted"
        );
    }
    outcome.deleted = deleted.deleted;
    outcome.failed = deleted.failed;
    Ok(outcome)
}
