//! Backup, restore and verification against real SQLite files

mod common;

use common::*;
use docvault::archive::ArchiveWriter;
use docvault::prelude::*;
use docvault::{codec, BackupRunner, Document, ID_FIELD};

#[tokio::test]
async fn test_backup_then_restore_replaces_target() {
    let fixture = Fixture::new();
    let source = fixture.open("source.db");
    seed_source(source.as_ref());

    // Leftovers that must not survive the restore.
    let target = fixture.open("target.db");
    target
        .insert_many("users", vec![Document::new().with(ID_FIELD, "stale")])
        .unwrap();
    target
        .insert_many("sessions", vec![Document::new().with(ID_FIELD, "stale")])
        .unwrap();

    let vault = fixture.vault(fixture.config());
    let cancel = CancellationToken::new();

    let backup = vault.backup(None, None, &cancel).await.unwrap();
    assert_eq!(backup.collections.get("users"), Some(&3));
    assert_eq!(backup.collections.get("sessions"), Some(&0));

    let report = vault
        .restore(&backup.key, &fixture.location("target.db"), &cancel)
        .await
        .unwrap();

    assert_eq!(report.inserted("users"), 3);
    assert_eq!(report.inserted("sessions"), 0);
    assert_eq!(dump(target.as_ref(), "users"), dump(source.as_ref(), "users"));
    assert_eq!(target.count("sessions").unwrap(), 0);
}

#[tokio::test]
async fn test_restore_twice_converges() {
    let fixture = Fixture::new();
    seed_source(fixture.open("source.db").as_ref());
    let vault = fixture.vault(fixture.config());
    let cancel = CancellationToken::new();
    let target = fixture.location("target.db");

    let backup = vault.backup(None, None, &cancel).await.unwrap();
    let first = vault.restore(&backup.key, &target, &cancel).await.unwrap();
    let after_first = dump(fixture.open("target.db").as_ref(), "users");
    let second = vault.restore(&backup.key, &target, &cancel).await.unwrap();
    let after_second = dump(fixture.open("target.db").as_ref(), "users");

    assert_eq!(first, second);
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn test_retention_keeps_newest_after_each_backup() {
    let fixture = Fixture::new();
    seed_source(fixture.open("source.db").as_ref());
    let mut config = fixture.config();
    config.backup.retention_count = 2;
    let vault = fixture.vault(config);
    let cancel = CancellationToken::new();

    let mut keys = Vec::new();
    for i in 0..4 {
        let tag = format!("run{}", i);
        let report = vault.backup(None, Some(&tag), &cancel).await.unwrap();
        keys.push(report.key);
        // Keys carry millisecond precision.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let listed: Vec<String> = vault
        .list(None)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.key)
        .collect();
    assert_eq!(listed, vec![keys[3].clone(), keys[2].clone()]);

    let again = vault.prune(None, 2).await.unwrap();
    assert!(again.deleted.is_empty());
    assert_eq!(again.retained.len(), 2);
}

#[tokio::test]
async fn test_export_failure_commits_no_archive() {
    let fixture = Fixture::new();
    let inner = SqliteDocumentStore::open_in_memory().unwrap();
    seed_source(&inner);
    let store: Arc<dyn DocumentStore> = Arc::new(BrokenCursorStore { inner });

    let runner = BackupRunner::new(
        store,
        fixture.storage.clone(),
        BackupConfig::default(),
        "backups/",
    );
    let err = runner
        .run(None, None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Database);
    assert!(fixture.storage.list("backups/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupt_line_aborts_restore() {
    let fixture = Fixture::new();
    let good = codec::encode(&Document::new().with(ID_FIELD, 1));
    let mut writer = ArchiveWriter::new(Vec::new(), 6);
    writer
        .append_entry("users", vec![good.clone(), good.replace('{', "")].into_iter().map(Ok))
        .unwrap();
    let key = fixture.put_raw(writer.finish().unwrap().sink).await;

    let vault = fixture.vault(fixture.config());
    let err = vault
        .restore(&key, &fixture.location("target.db"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Decode);
    // The only batch never filled, so nothing was inserted.
    assert_eq!(err.partial.inserted("users"), 0);
}

#[tokio::test]
async fn test_restore_missing_key_is_not_found() {
    let fixture = Fixture::new();
    let vault = fixture.vault(fixture.config());

    let err = vault
        .restore(
            "backups/backup-2020-01-01T00-00-00-000Z.tar.gz",
            &fixture.location("target.db"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_verify_passes_and_cleans_up() {
    let fixture = Fixture::new();
    let source = fixture.open("source.db");
    seed_source(source.as_ref());
    let mut config = fixture.config();
    config.recovery = RecoveryConfig::default().with_smoke_checks(vec![
        SmokeCheckConfig::new("users").with_min_count(3),
        SmokeCheckConfig::new("orders"),
    ]);
    let vault = fixture.vault(config);
    let cancel = CancellationToken::new();
    vault.backup(None, None, &cancel).await.unwrap();

    let report = vault.verify(None, &cancel).await.unwrap();

    assert!(report.passed);
    assert_eq!(report.checks[0].count, 3);
    assert!(!report.checks[1].exists);
    assert!(!exists(&fixture.path("verify.db")));
}

#[tokio::test]
async fn test_verify_drops_database_when_restore_fails() {
    let fixture = Fixture::new();
    let key = fixture.put_raw(b"not a gzip stream".to_vec()).await;
    let provider = Arc::new(RecordingProvider::default());
    let vault = fixture.vault(fixture.config()).with_provider(provider.clone());

    let report = vault
        .verify(Some(&key), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.passed);
    assert!(report.checks.is_empty());
    assert!(report.error.is_some());
    let verify = fixture.location("verify.db");
    assert!(provider.dropped.lock().unwrap().iter().filter(|l| **l == verify).count() >= 2);
    assert!(!exists(&fixture.path("verify.db")));
}

#[tokio::test]
async fn test_verify_refuses_production_location() {
    let fixture = Fixture::new();
    seed_source(fixture.open("source.db").as_ref());
    let mut config = fixture.config();
    config.database.verify = config.database.target.clone();
    let vault = fixture.vault(config);

    let err = vault
        .verify(None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_verify_without_backups_is_not_found() {
    let fixture = Fixture::new();
    let vault = fixture.vault(fixture.config());

    let err = vault
        .verify(None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}
