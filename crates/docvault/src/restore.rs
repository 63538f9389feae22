//! Drop-and-replace restore from an archive
//!
//! Every data entry replaces the collection it names: the collection is
//! dropped, recreated empty and refilled in unordered batches. Entries are
//! processed one at a time, in archive order.

use crate::archive::ArchiveReader;
use crate::storage::{ArchiveStorage, ArchiveStream};
use docvault_core::{
    config::RestoreConfig,
    document::{codec, Document},
    error::{ErrorKind, Result, VaultError},
    observe,
    traits::DocumentStore,
    types::RestoreReport,
};
use futures::stream::{self, StreamExt};
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Documents per unordered insert
    pub batch_size: usize,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self::from(&RestoreConfig::default())
    }
}

impl From<&RestoreConfig> for RestoreOptions {
    fn from(config: &RestoreConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
        }
    }
}

/// A restore that stopped early, with what it had done so far
///
/// Collections listed in `partial` may be half-filled; re-running the
/// restore replaces them again.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct RestoreError {
    #[source]
    pub source: VaultError,
    pub partial: RestoreReport,
}

impl RestoreError {
    pub fn new(source: VaultError, partial: RestoreReport) -> Self {
        Self { source, partial }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

impl From<RestoreError> for VaultError {
    fn from(err: RestoreError) -> Self {
        err.source
    }
}

/// Restore every data entry of `source` into `store`
///
/// A corrupt line or a failed batch stops the restore at once; the partial
/// batch in flight is discarded.
pub fn restore_archive<R: Read>(
    source: R,
    store: &dyn DocumentStore,
    options: &RestoreOptions,
    cancel: &CancellationToken,
) -> std::result::Result<RestoreReport, RestoreError> {
    let started = Instant::now();
    let mut report = RestoreReport::new();

    let result = restore_entries(source, store, options, cancel, &mut report);
    observe::record_restore(started.elapsed(), report.total_inserted(), result.is_ok());

    match result {
        Ok(()) => {
            tracing::info!(
                collections = report.collections.len(),
                inserted = report.total_inserted(),
                rejected = report.total_rejected(),
                "restore complete"
            );
            Ok(report)
        }
        Err(source) => {
            tracing::error!(error = %source, "restore aborted");
            Err(RestoreError::new(source, report))
        }
    }
}

fn restore_entries<R: Read>(
    source: R,
    store: &dyn DocumentStore,
    options: &RestoreOptions,
    cancel: &CancellationToken,
    report: &mut RestoreReport,
) -> Result<()> {
    let batch_size = options.batch_size.max(1);
    let mut reader = ArchiveReader::new(source);

    for entry in reader.entries()? {
        let entry = entry?;
        check_cancelled(cancel)?;

        let collection = entry.collection().to_string();
        let name = entry.name().to_string();

        store.drop_collection(&collection)?;
        store.create_collection(&collection)?;
        report.touch(&collection);

        let mut batch: Vec<Document> = Vec::with_capacity(batch_size);
        let mut batch_start = 0u64;
        let mut position = 0u64;

        for line in entry.lines() {
            let (line_no, text) = line?;
            let doc = codec::decode(&text).map_err(|e| e.at(name.as_str(), line_no))?;
            batch.push(doc);
            position += 1;

            if batch.len() >= batch_size {
                check_cancelled(cancel)?;
                flush(store, &collection, &mut batch, batch_start, report)?;
                batch_start = position;
            }
        }
        check_cancelled(cancel)?;
        flush(store, &collection, &mut batch, batch_start, report)?;

        tracing::info!(
            collection = %collection,
            inserted = report.inserted(&collection),
            "restored collection"
        );
    }

    Ok(())
}

fn flush(
    store: &dyn DocumentStore,
    collection: &str,
    batch: &mut Vec<Document>,
    batch_start: u64,
    report: &mut RestoreReport,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let docs = std::mem::replace(batch, Vec::with_capacity(batch.capacity()));
    let outcome = store.insert_many(collection, docs)?;
    report.record_inserted(collection, outcome.inserted);

    if !outcome.rejected.is_empty() {
        tracing::warn!(
            collection,
            rejected = outcome.rejected.len(),
            "documents rejected by the target database"
        );
        report.record_rejections(collection, batch_start, &outcome.rejected);
    }
    Ok(())
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(VaultError::Cancelled("restore cancelled".into()));
    }
    Ok(())
}

/// Stream the archive stored under `key` into `store`
pub async fn restore_from_storage(
    storage: &dyn ArchiveStorage,
    key: &str,
    store: Arc<dyn DocumentStore>,
    options: &RestoreOptions,
    cancel: &CancellationToken,
) -> std::result::Result<RestoreReport, RestoreError> {
    tracing::info!(key, "restoring archive");
    let stream = storage
        .download(key)
        .await
        .map_err(|e| RestoreError::new(e, RestoreReport::new()))?;

    restore_stream(stream, store, options, cancel).await
}

/// Restore an archive arriving as a byte stream
///
/// A pending read is abandoned as soon as `cancel` fires, so a stalled
/// download cannot keep the restore alive.
pub async fn restore_stream(
    stream: ArchiveStream,
    store: Arc<dyn DocumentStore>,
    options: &RestoreOptions,
    cancel: &CancellationToken,
) -> std::result::Result<RestoreReport, RestoreError> {
    // Bridge the async download to the blocking reader; must be built inside the runtime.
    let source = SyncIoBridge::new(StreamReader::new(abort_on_cancel(stream, cancel.clone())));
    let options = options.clone();
    let token = cancel.clone();

    let result = tokio::task::spawn_blocking(move || {
        restore_archive(source, store.as_ref(), &options, &token)
    })
    .await
    .map_err(|e| {
        RestoreError::new(
            VaultError::Other(anyhow::anyhow!("restore task failed: {}", e)),
            RestoreReport::new(),
        )
    })?;

    // An aborted read surfaces as a broken archive.
    result.map_err(|e| {
        if cancel.is_cancelled() && e.kind() != ErrorKind::Cancelled {
            RestoreError::new(VaultError::Cancelled("restore cancelled".into()), e.partial)
        } else {
            e
        }
    })
}

fn abort_on_cancel(inner: ArchiveStream, cancel: CancellationToken) -> ArchiveStream {
    stream::unfold(Some((inner, cancel)), |state| async move {
        let (mut inner, cancel) = state?;
        tokio::select! {
            _ = cancel.cancelled() => {
                Some((Err(io::Error::new(io::ErrorKind::Other, "download aborted")), None))
            }
            item = inner.next() => item.map(|item| (item, Some((inner, cancel)))),
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveWriter;
    use bytes::Bytes;
    use docvault_core::document::{Value, ID_FIELD};
    use docvault_core::traits::{DocumentCursor, InsertOutcome};
    use docvault_sqlite::SqliteDocumentStore;
    use std::time::Duration;

    /// Fires `cancel` as soon as a collection is recreated
    struct CancelOnCreate {
        inner: SqliteDocumentStore,
        cancel: CancellationToken,
    }

    impl DocumentStore for CancelOnCreate {
        fn collection_names(&self) -> Result<Vec<String>> {
            self.inner.collection_names()
        }

        fn has_collection(&self, name: &str) -> Result<bool> {
            self.inner.has_collection(name)
        }

        fn create_collection(&self, name: &str) -> Result<()> {
            self.cancel.cancel();
            self.inner.create_collection(name)
        }

        fn drop_collection(&self, name: &str) -> Result<bool> {
            self.inner.drop_collection(name)
        }

        fn cursor<'a>(&'a self, name: &str, batch_size: usize) -> Result<DocumentCursor<'a>> {
            self.inner.cursor(name, batch_size)
        }

        fn insert_many(&self, name: &str, docs: Vec<Document>) -> Result<InsertOutcome> {
            self.inner.insert_many(name, docs)
        }

        fn count(&self, name: &str) -> Result<u64> {
            self.inner.count(name)
        }
    }

    fn archive(entries: &[(&str, Vec<String>)]) -> Vec<u8> {
        let mut writer = ArchiveWriter::new(Vec::new(), 6);
        for (collection, lines) in entries {
            writer
                .append_entry(collection, lines.iter().cloned().map(Ok))
                .unwrap();
        }
        writer.finish().unwrap().sink
    }

    fn user(id: i32) -> String {
        codec::encode(&Document::new().with(ID_FIELD, id).with("name", "u"))
    }

    #[test]
    fn test_restore_replaces_collections() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .insert_many("users", vec![Document::new().with(ID_FIELD, 99)])
            .unwrap();
        store
            .insert_many("untouched", vec![Document::new().with(ID_FIELD, 1)])
            .unwrap();

        let bytes = archive(&[
            ("users", (0..5).map(user).collect()),
            ("sessions", Vec::new()),
        ]);
        let options = RestoreOptions { batch_size: 2 };
        let report = restore_archive(
            bytes.as_slice(),
            &store,
            &options,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(report.inserted("users"), 5);
        assert_eq!(report.inserted("sessions"), 0);
        assert_eq!(store.count("users").unwrap(), 5);
        assert!(store.has_collection("sessions").unwrap());
        assert_eq!(store.count("untouched").unwrap(), 1);
    }

    #[test]
    fn test_restore_is_idempotent() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let bytes = archive(&[("users", (0..3).map(user).collect())]);
        let options = RestoreOptions::default();

        let first =
            restore_archive(bytes.as_slice(), &store, &options, &CancellationToken::new()).unwrap();
        let second =
            restore_archive(bytes.as_slice(), &store, &options, &CancellationToken::new()).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.count("users").unwrap(), 3);
    }

    #[test]
    fn test_corrupt_line_fails_fast_with_partial_report() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let mut lines: Vec<String> = (0..3).map(user).collect();
        lines.push("{not json".to_string());
        lines.push(user(4));
        let bytes = archive(&[("orders", vec![user(1)]), ("users", lines)]);

        let err = restore_archive(
            bytes.as_slice(),
            &store,
            &RestoreOptions { batch_size: 2 },
            &CancellationToken::new(),
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Decode);
        match &err.source {
            VaultError::Decode(decode) => {
                assert_eq!(decode.line, Some(4));
                assert_eq!(decode.entry.as_deref(), Some("users.jsonl"));
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(err.partial.inserted("orders"), 1);
        // First full batch landed, the partial batch with the corrupt line did not.
        assert_eq!(err.partial.inserted("users"), 2);
        assert_eq!(store.count("users").unwrap(), 2);
    }

    #[test]
    fn test_rejections_do_not_block_siblings() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let bytes = archive(&[("users", vec![user(1), user(1), user(2)])]);

        let report = restore_archive(
            bytes.as_slice(),
            &store,
            &RestoreOptions::default(),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(report.inserted("users"), 2);
        assert_eq!(report.total_rejected(), 1);
        assert_eq!(report.rejections[0].position, 1);
    }

    #[test]
    fn test_types_survive_restore() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let doc = Document::new()
            .with(ID_FIELD, 1)
            .with("big", i64::MAX)
            .with("ratio", 0.5);
        let bytes = archive(&[("things", vec![codec::encode(&doc)])]);

        restore_archive(
            bytes.as_slice(),
            &store,
            &RestoreOptions::default(),
            &CancellationToken::new(),
        )
        .unwrap();

        let restored = store.cursor("things", 10).unwrap().next().unwrap().unwrap();
        assert_eq!(restored.get("big"), Some(&Value::Int64(i64::MAX)));
        assert_eq!(restored, doc);
    }

    #[test]
    fn test_cancel_mid_entry_skips_last_batch() {
        let store = CancelOnCreate {
            inner: SqliteDocumentStore::open_in_memory().unwrap(),
            cancel: CancellationToken::new(),
        };
        let bytes = archive(&[("users", (0..3).map(user).collect())]);

        let err = restore_archive(
            bytes.as_slice(),
            &store,
            &RestoreOptions::default(),
            &store.cancel.clone(),
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.partial.inserted("users"), 0);
        assert_eq!(store.inner.count("users").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_abandons_stalled_download() {
        let bytes = archive(&[("users", (0..50).map(user).collect())]);
        let head = Bytes::copy_from_slice(&bytes[..bytes.len() / 2]);
        let stalled: ArchiveStream = stream::once(async move { Ok(head) })
            .chain(stream::pending())
            .boxed();
        let store: Arc<dyn DocumentStore> =
            Arc::new(SqliteDocumentStore::open_in_memory().unwrap());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(10),
            restore_stream(stalled, store, &RestoreOptions::default(), &cancel),
        )
        .await
        .expect("restore kept waiting on the download")
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
