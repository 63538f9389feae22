//! Storage listing and pruning

use super::emit;
use anyhow::Result;
use docvault::{ErrorDetail, Vault, VaultConfig};

pub async fn list(config: VaultConfig, prefix: Option<String>) -> Result<bool> {
    let vault = Vault::from_config(config)?;

    match vault.list(prefix.as_deref()).await {
        Ok(objects) => {
            tracing::info!(count = objects.len(), "Listed objects");
            Ok(emit(Some(&objects), None))
        }
        Err(e) => Ok(emit::<()>(None, Some(ErrorDetail::from(&e)))),
    }
}

pub async fn prune(config: VaultConfig, keep: usize, prefix: Option<String>) -> Result<bool> {
    let vault = Vault::from_config(config)?;

    match vault.prune(prefix.as_deref(), keep).await {
        Ok(outcome) => {
            let ok = outcome.failed.is_empty();
            if !ok {
                tracing::warn!(failed = outcome.failed.len(), "Some archives were not deleted");
            }
            let error = (!ok).then(|| ErrorDetail {
                kind: docvault::ErrorKind::Storage,
                message: format!("{} archives could not be deleted", outcome.failed.len()),
            });
            emit(Some(&outcome), error);
            Ok(ok)
        }
        Err(e) => Ok(emit::<()>(None, Some(ErrorDetail::from(&e)))),
    }
}
