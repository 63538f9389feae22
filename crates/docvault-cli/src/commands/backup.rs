//! Backup command implementation

use super::emit;
use anyhow::Result;
use docvault::{ErrorDetail, Vault, VaultConfig};
use tokio_util::sync::CancellationToken;

pub async fn execute(
    config: VaultConfig,
    prefix: Option<String>,
    tag: Option<String>,
    cancel: &CancellationToken,
) -> Result<bool> {
    let vault = Vault::from_config(config)?;

    match vault.backup(prefix.as_deref(), tag.as_deref(), cancel).await {
        Ok(report) => {
            tracing::info!(
                key = %report.key,
                size_bytes = report.size_bytes,
                documents = report.total_documents(),
                "Backup complete"
            );
            Ok(emit(Some(&report), None))
        }
        Err(e) => Ok(emit::<()>(None, Some(ErrorDetail::from(&e)))),
    }
}
