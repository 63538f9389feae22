#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use docvault::migration::MigrationSummary;
use docvault::notify::Alert;
use docvault::prelude::*;
use docvault::{codec, BackupKey, Binary, DocumentCursor, InsertOutcome, ID_FIELD};
use object_store::{path::Path as ObjectPath, PutPayload};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

pub struct Fixture {
    pub dir: TempDir,
    pub storage: Arc<ObjectStoreBackend>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            storage: Arc::new(ObjectStoreBackend::in_memory()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn location(&self, name: &str) -> String {
        self.path(name).to_string_lossy().into_owned()
    }

    pub fn config(&self) -> VaultConfig {
        let mut config = VaultConfig::new(StorageConfig::memory());
        config.database.source = Some(self.location("source.db"));
        config.database.target = Some(self.location("target.db"));
        config.database.verify = Some(self.location("verify.db"));
        config
    }

    pub fn vault(&self, config: VaultConfig) -> Vault {
        Vault::from_config(config)
            .unwrap()
            .with_storage(self.storage.clone())
            .with_notifier(self.notifier.clone())
    }

    pub fn open(&self, name: &str) -> Arc<dyn DocumentStore> {
        SqliteDatabaseProvider.open(&self.location(name)).unwrap()
    }

    /// Store arbitrary bytes under a fresh archive key
    pub async fn put_raw(&self, bytes: Vec<u8>) -> String {
        let key = BackupKey::new("backups/", Utc::now(), None).to_string();
        self.storage
            .store()
            .put(&ObjectPath::parse(&key).unwrap(), PutPayload::from(bytes))
            .await
            .unwrap();
        key
    }
}

/// Three users with every value kind and an empty sessions collection
pub fn seed_source(store: &dyn DocumentStore) {
    let joined = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let users = (0..3i32)
        .map(|i| {
            Document::new()
                .with(ID_FIELD, ObjectId::new())
                .with("name", format!("user-{}", i))
                .with("age", 30 + i)
                .with("balance", i64::MAX - i as i64)
                .with("joined", joined)
                .with("avatar", Binary::generic(vec![i as u8; 4]))
                .with("tags", vec![Value::from("a"), Value::Null])
        })
        .collect();
    store.insert_many("users", users).unwrap();
    store.create_collection("sessions").unwrap();
}

/// Every document of a collection, encoded and sorted
pub fn dump(store: &dyn DocumentStore, collection: &str) -> Vec<String> {
    let mut lines: Vec<String> = store
        .cursor(collection, 100)
        .unwrap()
        .map(|doc| codec::encode(&doc.unwrap()))
        .collect();
    lines.sort();
    lines
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub alerts: Mutex<Vec<Alert>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }

    pub fn last_text(&self) -> Option<String> {
        self.alerts.lock().unwrap().last().map(|a| a.text.clone())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _alert: &Alert) -> Result<()> {
        Err(VaultError::Other(anyhow::anyhow!("webhook unreachable")))
    }
}

pub struct FailingMigrations;

#[async_trait]
impl MigrationRunner for FailingMigrations {
    async fn apply_pending(
        &self,
        _target: &str,
        _store: Arc<dyn DocumentStore>,
    ) -> Result<MigrationSummary> {
        Err(VaultError::Migration("migration 7 failed".into()))
    }
}

/// Provider that remembers which locations were opened and dropped
#[derive(Default)]
pub struct RecordingProvider {
    pub opened: Mutex<Vec<String>>,
    pub dropped: Mutex<Vec<String>>,
}

impl DatabaseProvider for RecordingProvider {
    fn open(&self, location: &str) -> Result<Arc<dyn DocumentStore>> {
        self.opened.lock().unwrap().push(location.to_string());
        SqliteDatabaseProvider.open(location)
    }

    fn drop_database(&self, location: &str) -> Result<()> {
        self.dropped.lock().unwrap().push(location.to_string());
        SqliteDatabaseProvider.drop_database(location)
    }

    fn kind(&self) -> &str {
        "recording"
    }
}

/// Store whose cursors fail after the first document
pub struct BrokenCursorStore {
    pub inner: SqliteDocumentStore,
}

impl DocumentStore for BrokenCursorStore {
    fn collection_names(&self) -> Result<Vec<String>> {
        self.inner.collection_names()
    }

    fn has_collection(&self, name: &str) -> Result<bool> {
        self.inner.has_collection(name)
    }

    fn create_collection(&self, name: &str) -> Result<()> {
        self.inner.create_collection(name)
    }

    fn drop_collection(&self, name: &str) -> Result<bool> {
        self.inner.drop_collection(name)
    }

    fn cursor<'a>(&'a self, name: &str, batch_size: usize) -> Result<DocumentCursor<'a>> {
        let inner = self.inner.cursor(name, batch_size)?;
        Ok(Box::new(inner.take(1).chain(std::iter::once(Err(
            VaultError::Database("cursor lost".into()),
        )))))
    }

    fn insert_many(&self, name: &str, docs: Vec<Document>) -> Result<InsertOutcome> {
        self.inner.insert_many(name, docs)
    }

    fn count(&self, name: &str) -> Result<u64> {
        self.inner.count(name)
    }
}
