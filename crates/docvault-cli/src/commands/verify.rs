//! Verify command implementation

use super::emit;
use anyhow::Result;
use docvault::{ErrorDetail, ErrorKind, Vault, VaultConfig};
use tokio_util::sync::CancellationToken;

pub async fn execute(
    config: VaultConfig,
    key: Option<String>,
    cancel: &CancellationToken,
) -> Result<bool> {
    let vault = Vault::from_config(config)?;

    match vault.verify(key.as_deref(), cancel).await {
        Ok(report) if report.passed => Ok(emit(Some(&report), None)),
        Ok(report) => {
            if let Some(error) = report.error.clone() {
                return Ok(emit(Some(&report), Some(error)));
            }
            let failed = docvault::verify::failed_checks(&report.checks).join("; ");
            let error = ErrorDetail {
                kind: ErrorKind::Verification,
                message: failed,
            };
            Ok(emit(Some(&report), Some(error)))
        }
        Err(e) => Ok(emit::<()>(None, Some(ErrorDetail::from(&e)))),
    }
}
