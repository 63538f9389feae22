//! Post-restore migration step
//!
//! After a disaster-recovery restore the target may be older than the code
//! that will run against it. A [`MigrationRunner`] brings it forward. Runners
//! must be idempotent: applying twice is the same as applying once.
//!
//! # Example
//!
//! ```no_run
//! use docvault::migration::{DocumentMigration, MigrationManager};
//! use docvault::prelude::*;
//!
//! struct BackfillPlan;
//!
//! impl DocumentMigration for BackfillPlan {
//!     fn version(&self) -> u32 {
//!         1
//!     }
//!
//!     fn name(&self) -> &str {
//!         "create_plans"
//!     }
//!
//!     fn up(&self, store: &dyn DocumentStore) -> Result<()> {
//!         store.create_collection("plans")
//!     }
//! }
//!
//! let mut manager = MigrationManager::new();
//! manager.add(Box::new(BackfillPlan));
//! ```

use async_trait::async_trait;
use chrono::Utc;
use docvault_core::{
    document::{Document, Value, ID_FIELD},
    error::{Result, VaultError},
    traits::DocumentStore,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::process::Stdio;
use std::sync::Arc;

/// Collection recording applied migrations in the target database
pub const MIGRATIONS_COLLECTION: &str = "_migrations";

/// Environment variable carrying the target location to migration commands
pub const TARGET_ENV: &str = "DOCVAULT_TARGET";

/// What a migration pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSummary {
    /// Which runner ran
    pub runner: String,

    /// Migrations applied by this pass, in order
    pub applied: Vec<String>,
}

/// Applies pending migrations to a freshly restored target
#[async_trait]
pub trait MigrationRunner: Send + Sync {
    async fn apply_pending(
        &self,
        target: &str,
        store: Arc<dyn DocumentStore>,
    ) -> Result<MigrationSummary>;
}

/// Runner that has nothing to apply
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMigrationRunner;

#[async_trait]
impl MigrationRunner for NoopMigrationRunner {
    async fn apply_pending(
        &self,
        _target: &str,
        _store: Arc<dyn DocumentStore>,
    ) -> Result<MigrationSummary> {
        Ok(MigrationSummary {
            runner: "noop".into(),
            applied: Vec::new(),
        })
    }
}

/// Migration trait
///
/// Implement this to define a migration over documents.
pub trait DocumentMigration: Send + Sync {
    /// Versions are applied in ascending order and recorded once applied
    fn version(&self) -> u32;

    /// Human-readable name for this migration
    fn name(&self) -> &str;

    /// Apply the migration
    fn up(&self, store: &dyn DocumentStore) -> Result<()>;

    /// Optional: verify the migration was applied correctly
    fn verify(&self, _store: &dyn DocumentStore) -> Result<()> {
        Ok(())
    }
}

/// Migration manager
///
/// Applies registered migrations in version order and records each one in
/// the `_migrations` collection of the target, so re-runs skip them.
#[derive(Default)]
pub struct MigrationManager {
    migrations: Vec<Arc<dyn DocumentMigration>>,
}

impl MigrationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a migration
    ///
    /// Migrations will be sorted by version when run.
    pub fn add(&mut self, migration: Box<dyn DocumentMigration>) {
        self.migrations.push(Arc::from(migration));
    }

    pub fn add_all(&mut self, migrations: Vec<Box<dyn DocumentMigration>>) {
        for m in migrations {
            self.add(m);
        }
    }

    /// Versions already recorded in the target
    pub fn applied_versions(store: &dyn DocumentStore) -> Result<BTreeSet<u32>> {
        let mut versions = BTreeSet::new();
        for doc in store.cursor(MIGRATIONS_COLLECTION, 1000)? {
            let doc = doc?;
            let version = match doc.id() {
                Some(Value::Int64(v)) => u32::try_from(*v).ok(),
                Some(Value::Int32(v)) => u32::try_from(*v).ok(),
                _ => None,
            };
            let version = version.ok_or_else(|| {
                VaultError::Migration(format!("unexpected migration record id {:?}", doc.id()))
            })?;
            versions.insert(version);
        }
        Ok(versions)
    }

    /// Names of migrations not yet applied, in the order they would run
    pub fn pending(&self, store: &dyn DocumentStore) -> Result<Vec<String>> {
        let applied = Self::applied_versions(store)?;
        Ok(sorted(&self.migrations)
            .into_iter()
            .filter(|m| !applied.contains(&m.version()))
            .map(|m| m.name().to_string())
            .collect())
    }

    /// Run every pending migration against `store`
    pub fn run(&self, store: &dyn DocumentStore) -> Result<Vec<String>> {
        run_migrations(&self.migrations, store)
    }
}

fn sorted(migrations: &[Arc<dyn DocumentMigration>]) -> Vec<Arc<dyn DocumentMigration>> {
    let mut sorted = migrations.to_vec();
    sorted.sort_by_key(|m| m.version());
    sorted
}

fn run_migrations(
    migrations: &[Arc<dyn DocumentMigration>],
    store: &dyn DocumentStore,
) -> Result<Vec<String>> {
    let applied = MigrationManager::applied_versions(store)?;
    let pending: Vec<_> = sorted(migrations)
        .into_iter()
        .filter(|m| !applied.contains(&m.version()))
        .collect();

    if pending.is_empty() {
        tracing::info!("No pending migrations");
        return Ok(Vec::new());
    }

    let mut names = Vec::with_capacity(pending.len());
    for migration in pending {
        tracing::info!(
            version = migration.version(),
            name = migration.name(),
            "applying migration"
        );
        migration.up(store).map_err(|e| {
            VaultError::Migration(format!("{} failed: {}", migration.name(), e))
        })?;
        migration.verify(store).map_err(|e| {
            VaultError::Migration(format!("{} did not verify: {}", migration.name(), e))
        })?;

        let record = Document::new()
            .with(ID_FIELD, migration.version() as i64)
            .with("name", migration.name())
            .with("applied_at", Utc::now());
        let outcome = store.insert_many(MIGRATIONS_COLLECTION, vec![record])?;
        if outcome.inserted != 1 {
            return Err(VaultError::Migration(format!(
                "could not record migration {}",
                migration.name()
            )));
        }
        names.push(migration.name().to_string());
    }

    Ok(names)
}

#[async_trait]
impl MigrationRunner for MigrationManager {
    async fn apply_pending(
        &self,
        target: &str,
        store: Arc<dyn DocumentStore>,
    ) -> Result<MigrationSummary> {
        tracing::debug!(target, "running registered migrations");
        let migrations = self.migrations.clone();
        let applied =
            tokio::task::spawn_blocking(move || run_migrations(&migrations, store.as_ref()))
                .await
                .map_err(|e| VaultError::Migration(format!("migration task failed: {}", e)))??;

        Ok(MigrationSummary {
            runner: "registered".into(),
            applied,
        })
    }
}

/// Runs an external migration command against the target
///
/// The target location is passed in `DOCVAULT_TARGET`; a non-zero exit fails
/// the step.
#[derive(Debug, Clone)]
pub struct CommandMigrationRunner {
    program: String,
    args: Vec<String>,
}

impl CommandMigrationRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a program-and-arguments list
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| VaultError::Configuration("migration command is empty".into()))?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }

    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl MigrationRunner for CommandMigrationRunner {
    async fn apply_pending(
        &self,
        target: &str,
        _store: Arc<dyn DocumentStore>,
    ) -> Result<MigrationSummary> {
        let command = self.describe();
        tracing::info!(command = %command, target, "running migration command");

        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .env(TARGET_ENV, target)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| VaultError::Migration(format!("cannot start {}: {}", command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let skip = stderr.chars().count().saturating_sub(500);
            let tail: String = stderr.chars().skip(skip).collect();
            return Err(VaultError::Migration(format!(
                "{} exited with {}: {}",
                command, output.status, tail
            )));
        }

        Ok(MigrationSummary {
            runner: "command".into(),
            applied: vec![command],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docvault_sqlite::SqliteDocumentStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CreatePlans {
        runs: Arc<AtomicUsize>,
    }

    impl DocumentMigration for CreatePlans {
        fn version(&self) -> u32 {
            2
        }

        fn name(&self) -> &str {
            "create_plans"
        }

        fn up(&self, store: &dyn DocumentStore) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            store.create_collection("plans")
        }

        fn verify(&self, store: &dyn DocumentStore) -> Result<()> {
            if store.has_collection("plans")? {
                Ok(())
            } else {
                Err(VaultError::Migration("plans missing".into()))
            }
        }
    }

    struct Broken;

    impl DocumentMigration for Broken {
        fn version(&self) -> u32 {
            1
        }

        fn name(&self) -> &str {
            "broken"
        }

        fn up(&self, _store: &dyn DocumentStore) -> Result<()> {
            Err(VaultError::Database("boom".into()))
        }
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
        let runs = Arc::new(AtomicUsize::new(0));
        let mut manager = MigrationManager::new();
        manager.add(Box::new(CreatePlans { runs: runs.clone() }));

        let first = manager.apply_pending("mem", store.clone()).await.unwrap();
        let second = manager.apply_pending("mem", store.clone()).await.unwrap();

        assert_eq!(first.applied, vec!["create_plans"]);
        assert!(second.applied.is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(manager.pending(store.as_ref()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_migration_is_migration_error() {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
        let mut manager = MigrationManager::new();
        manager.add_all(vec![
            Box::new(CreatePlans {
                runs: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(Broken),
        ]);

        let err = manager.apply_pending("mem", store.clone()).await.unwrap_err();

        assert!(matches!(err, VaultError::Migration(_)));
        // Version 1 runs first and fails, so nothing is recorded.
        assert_eq!(store.count(MIGRATIONS_COLLECTION).unwrap(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_runner_passes_target() {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
        let ok = CommandMigrationRunner::new(
            "sh",
            vec!["-c".into(), "test \"$DOCVAULT_TARGET\" = /tmp/target.db".into()],
        );
        assert!(ok.apply_pending("/tmp/target.db", store.clone()).await.is_ok());

        let failing = CommandMigrationRunner::new("sh", vec!["-c".into(), "echo nope >&2; exit 3".into()]);
        let err = failing.apply_pending("/tmp/target.db", store).await.unwrap_err();
        match err {
            VaultError::Migration(msg) => assert!(msg.contains("nope")),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_from_argv_rejects_empty() {
        assert!(CommandMigrationRunner::from_argv(&[]).is_err());
        let runner = CommandMigrationRunner::from_argv(&["migrate".into(), "up".into()]).unwrap();
        assert_eq!(runner.describe(), "migrate up");
    }

    #[test]
    fn test_out_of_range_recorded_version_is_rejected() {
        for id in [Value::Int64(-1), Value::Int64(u32::MAX as i64 + 2), Value::Int32(-7)] {
            let store = SqliteDocumentStore::open_in_memory().unwrap();
            store
                .insert_many(MIGRATIONS_COLLECTION, vec![Document::new().with(ID_FIELD, id)])
                .unwrap();

            let err = MigrationManager::applied_versions(&store).unwrap_err();
            assert!(matches!(err, VaultError::Migration(_)));
        }
    }
}
