//! Optional metrics instrumentation for docvault.
//!
//! When the `observe` feature is enabled, backup, restore, retention and
//! disaster-recovery operations emit counters and histograms via the
//! [`metrics`] crate. A downstream application must install a metrics
//! recorder to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a finished backup (counter + duration + archive size).
///
/// - `docvault.backup.runs_total` – counter with `outcome` label
/// - `docvault.backup.duration_seconds` – histogram
/// - `docvault.backup.archive_bytes` – histogram, successful runs only
#[inline]
pub fn record_backup(duration: std::time::Duration, size_bytes: u64, success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!("docvault.backup.runs_total", "outcome" => outcome).increment(1);
        metrics::histogram!("docvault.backup.duration_seconds").record(duration.as_secs_f64());
        if success {
            metrics::histogram!("docvault.backup.archive_bytes").record(size_bytes as f64);
        }
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, size_bytes, success);
    }
}

/// Record a restore pass.
///
/// - `docvault.restore.runs_total` – counter with `outcome` label
/// - `docvault.restore.documents_total` – counter of inserted documents
/// - `docvault.restore.duration_seconds` – histogram
#[inline]
pub fn record_restore(duration: std::time::Duration, documents: u64, success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!("docvault.restore.runs_total", "outcome" => outcome).increment(1);
        metrics::counter!("docvault.restore.documents_total").increment(documents);
        metrics::histogram!("docvault.restore.duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, documents, success);
    }
}

/// Record archives removed by retention.
///
/// - `docvault.retention.deleted_total` – counter
/// - `docvault.retention.failed_total` – counter
#[inline]
pub fn record_retention(deleted: usize, failed: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("docvault.retention.deleted_total").increment(deleted as u64);
        metrics::counter!("docvault.retention.failed_total").increment(failed as u64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (deleted, failed);
    }
}

/// Record a terminal disaster-recovery run.
///
/// - `docvault.recovery.runs_total` – counter with `outcome` and `dry_run` labels
/// - `docvault.recovery.duration_seconds` – histogram
#[inline]
pub fn record_recovery(duration: std::time::Duration, success: bool, dry_run: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        let dry_run = if dry_run { "true" } else { "false" };
        metrics::counter!("docvault.recovery.runs_total", "outcome" => outcome, "dry_run" => dry_run)
            .increment(1);
        metrics::histogram!("docvault.recovery.duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, success, dry_run);
    }
}
