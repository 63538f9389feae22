//! Command implementations
//!
//! Each command returns whether every step succeeded; the report itself is
//! printed on stdout.

pub mod backup;
pub mod recover;
pub mod restore;
pub mod storage;
pub mod verify;

use docvault::{ErrorDetail, ErrorKind, VaultError};
use serde::Serialize;

/// Print `{ "ok", "report", "error" }` on stdout
pub fn emit<T: Serialize>(report: Option<&T>, error: Option<ErrorDetail>) -> bool {
    let ok = error.is_none();
    let output = serde_json::json!({
        "ok": ok,
        "report": report,
        "error": error,
    });
    match serde_json::to_string_pretty(&output) {
        Ok(text) => println!("{}", text),
        Err(e) => tracing::error!(error = %e, "failed to serialize report"),
    }
    ok
}

/// Report an error that left no partial report behind
pub fn print_error(err: &anyhow::Error) {
    let detail = match err.downcast_ref::<VaultError>() {
        Some(vault) => ErrorDetail::from(vault),
        None => ErrorDetail {
            kind: ErrorKind::Internal,
            message: format!("{:#}", err),
        },
    };
    emit::<()>(None, Some(detail));
}
