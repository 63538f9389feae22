//! Disaster recovery: select, restore, migrate, verify
//!
//! One run walks `selecting → restoring → migrating → verifying` and ends
//! `completed` or `failed`. Nothing is retried. Every terminal state is
//! reported and alerted; a failed alert is only logged.

use crate::migration::{MigrationRunner, MigrationSummary};
use crate::notify::{Alert, Notifier, Severity};
use crate::restore::{restore_from_storage, RestoreOptions};
use crate::storage::{latest_archive, ArchiveStorage};
use crate::verify::{failed_checks, run_smoke_checks, CheckResult};
use chrono::{DateTime, Utc};
use docvault_core::{
    config::{SmokeCheckConfig, VaultConfig},
    error::{ErrorDetail, Result, VaultError},
    observe,
    traits::DatabaseProvider,
    types::RestoreReport,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Selecting,
    Restoring,
    Migrating,
    Verifying,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySteps {
    pub restore: StepStatus,
    pub migrate: StepStatus,
    pub verify: StepStatus,
}

/// Report of one disaster-recovery run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisasterRecoveryRun {
    pub run_id: Uuid,

    /// Selected archive; `None` when selection failed
    pub backup_key: Option<String>,

    pub target: String,
    pub dry_run: bool,
    pub phase: RunPhase,

    /// Phase the run was in when it failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<RunPhase>,

    pub steps: RecoverySteps,

    /// Restore counts, partial when the restore failed
    pub restore: Option<RestoreReport>,

    pub migration: Option<MigrationSummary>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckResult>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<ErrorDetail>,
}

impl DisasterRecoveryRun {
    fn new(target: &str, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            backup_key: None,
            target: target.to_string(),
            dry_run,
            phase: RunPhase::Selecting,
            failed_phase: None,
            steps: RecoverySteps::default(),
            restore: None,
            migration: None,
            checks: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.phase == RunPhase::Completed
    }

    fn fail(&mut self, err: &VaultError) {
        match self.phase {
            RunPhase::Restoring => self.steps.restore = StepStatus::Failed,
            RunPhase::Migrating => self.steps.migrate = StepStatus::Failed,
            RunPhase::Verifying => self.steps.verify = StepStatus::Failed,
            _ => {}
        }
        self.failed_phase = Some(self.phase);
        self.phase = RunPhase::Failed;
        self.error = Some(ErrorDetail::from(err));
    }

    /// One-line summary used as alert text
    pub fn summary(&self) -> String {
        let outcome = match (self.phase, self.dry_run) {
            (RunPhase::Completed, true) => "dry run completed",
            (RunPhase::Completed, false) => "completed",
            _ => "FAILED",
        };
        let mut text = format!(
            "Disaster recovery {} for {} from {} (restore={}, migrate={}, verify={})",
            outcome,
            self.target,
            self.backup_key.as_deref().unwrap_or("<none>"),
            self.steps.restore,
            self.steps.migrate,
            self.steps.verify,
        );
        if let Some(error) = &self.error {
            text.push_str(&format!(": {}", error.message));
        }
        text
    }
}

/// Restores the newest backup into a target and brings it back into service
pub struct DisasterRecovery {
    storage: Arc<dyn ArchiveStorage>,
    provider: Arc<dyn DatabaseProvider>,
    migrations: Arc<dyn MigrationRunner>,
    notifier: Arc<dyn Notifier>,
    prefix: String,
    restore_options: RestoreOptions,
    smoke_checks: Vec<SmokeCheckConfig>,
}

impl DisasterRecovery {
    pub fn new(
        storage: Arc<dyn ArchiveStorage>,
        provider: Arc<dyn DatabaseProvider>,
        migrations: Arc<dyn MigrationRunner>,
        notifier: Arc<dyn Notifier>,
        config: &VaultConfig,
    ) -> Self {
        Self {
            storage,
            provider,
            migrations,
            notifier,
            prefix: config.storage.prefix.clone(),
            restore_options: RestoreOptions::from(&config.restore),
            smoke_checks: config.recovery.smoke_checks.clone(),
        }
    }

    /// Run recovery against `target`
    ///
    /// Never returns an error: the outcome, including failures, is in the
    /// returned run.
    pub async fn run(
        &self,
        target: &str,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> DisasterRecoveryRun {
        let started = Instant::now();
        let mut run = DisasterRecoveryRun::new(target, dry_run);
        tracing::info!(run_id = %run.run_id, target, dry_run, "starting disaster recovery");

        match self.execute(&mut run, cancel).await {
            Ok(()) => {
                run.phase = RunPhase::Completed;
                tracing::info!(run_id = %run.run_id, "disaster recovery completed");
            }
            Err(e) => {
                tracing::error!(run_id = %run.run_id, phase = ?run.phase, error = %e, "disaster recovery failed");
                run.fail(&e);
            }
        }
        run.finished_at = Some(Utc::now());

        observe::record_recovery(started.elapsed(), run.succeeded(), dry_run);
        self.alert(&run).await;
        run
    }

    async fn execute(&self, run: &mut DisasterRecoveryRun, cancel: &CancellationToken) -> Result<()> {
        if run.target.trim().is_empty() {
            return Err(VaultError::Configuration("recovery target is not set".into()));
        }

        check_cancelled(cancel)?;
        let selected = latest_archive(self.storage.as_ref(), &self.prefix)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("no backups under {}", self.prefix)))?;
        tracing::info!(key = %selected.key, created_at = %selected.created_at, "selected backup");
        run.backup_key = Some(selected.key.clone());

        if run.dry_run {
            run.steps = RecoverySteps {
                restore: StepStatus::Skipped,
                migrate: StepStatus::Skipped,
                verify: StepStatus::Skipped,
            };
            return Ok(());
        }

        check_cancelled(cancel)?;
        run.phase = RunPhase::Restoring;
        let store = self.provider.open(&run.target)?;
        match restore_from_storage(
            self.storage.as_ref(),
            &selected.key,
            store.clone(),
            &self.restore_options,
            cancel,
        )
        .await
        {
            Ok(report) => {
                run.restore = Some(report);
                run.steps.restore = StepStatus::Success;
            }
            Err(e) => {
                run.restore = Some(e.partial);
                return Err(e.source);
            }
        }

        check_cancelled(cancel)?;
        run.phase = RunPhase::Migrating;
        let summary = self.migrations.apply_pending(&run.target, store.clone()).await?;
        tracing::info!(applied = summary.applied.len(), runner = %summary.runner, "migrations applied");
        run.migration = Some(summary);
        run.steps.migrate = StepStatus::Success;

        check_cancelled(cancel)?;
        run.phase = RunPhase::Verifying;
        run.checks = run_smoke_checks(store.as_ref(), &self.smoke_checks)?;
        let failed = failed_checks(&run.checks);
        if !failed.is_empty() {
            return Err(VaultError::Verification(failed.join("; ")));
        }
        run.steps.verify = StepStatus::Success;

        Ok(())
    }

    async fn alert(&self, run: &DisasterRecoveryRun) {
        let alert = Alert {
            severity: if run.succeeded() {
                Severity::Info
            } else {
                Severity::Critical
            },
            text: run.summary(),
            run: serde_json::to_value(run).unwrap_or(serde_json::Value::Null),
        };
        if let Err(e) = self.notifier.notify(&alert).await {
            tracing::warn!(run_id = %run.run_id, error = %e, "failed to deliver recovery alert");
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(VaultError::Cancelled("disaster recovery cancelled".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_marks_current_step() {
        let mut run = DisasterRecoveryRun::new("/data/app.db", false);
        run.phase = RunPhase::Migrating;
        run.steps.restore = StepStatus::Success;

        run.fail(&VaultError::Migration("exit 1".into()));

        assert_eq!(run.phase, RunPhase::Failed);
        assert_eq!(run.failed_phase, Some(RunPhase::Migrating));
        assert_eq!(run.steps.restore, StepStatus::Success);
        assert_eq!(run.steps.migrate, StepStatus::Failed);
        assert_eq!(run.steps.verify, StepStatus::Pending);
        assert!(run.summary().contains("FAILED"));
        assert!(run.summary().contains("exit 1"));
    }

    #[test]
    fn test_run_serializes_snake_case() {
        let run = DisasterRecoveryRun::new("t", true);
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["phase"], "selecting");
        assert_eq!(json["steps"]["restore"], "pending");
    }
}
