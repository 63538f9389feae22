//! Recover command implementation

use super::emit;
use anyhow::Result;
use docvault::{Vault, VaultConfig};
use tokio_util::sync::CancellationToken;

pub async fn execute(
    config: VaultConfig,
    target: Option<String>,
    dry_run: bool,
    cancel: &CancellationToken,
) -> Result<bool> {
    let target = match target {
        Some(target) => target,
        None => config.target()?.to_string(),
    };
    let vault = Vault::from_config(config)?;

    let run = vault.recover(&target, dry_run, cancel).await;
    if dry_run && run.succeeded() {
        tracing::info!(key = ?run.backup_key, "Dry run: would restore this archive");
    }
    // The run carries its own error detail.
    emit(Some(&run), None);
    Ok(run.succeeded())
}
