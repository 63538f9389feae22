//! Restore command implementation

use super::emit;
use anyhow::Result;
use docvault::{ErrorDetail, Vault, VaultConfig};
use tokio_util::sync::CancellationToken;

pub async fn execute(
    config: VaultConfig,
    key: String,
    target: Option<String>,
    cancel: &CancellationToken,
) -> Result<bool> {
    let target = match target {
        Some(target) => target,
        None => config.target()?.to_string(),
    };
    let vault = Vault::from_config(config)?;

    tracing::info!(key = %key, target = %target, "Restoring");
    match vault.restore(&key, &target, cancel).await {
        Ok(report) => Ok(emit(Some(&report), None)),
        // Collections listed in the partial report may be half-filled.
        Err(e) => Ok(emit(Some(&e.partial), Some(ErrorDetail::from(&e.source)))),
    }
}
