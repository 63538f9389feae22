//! Database export into a compressed archive
//!
//! The export itself is blocking: it walks every collection with a forward
//! cursor and feeds encoded lines to an [`ArchiveWriter`]. [`spawn_export`]
//! runs it on the blocking pool and hands the compressed output to async
//! code as an [`ArchiveStream`] backed by a bounded channel, so a slow
//! upload applies backpressure all the way to the cursor.

use crate::archive::{ArchiveWarning, ArchiveWriter};
use crate::storage::ArchiveStream;
use bytes::{Bytes, BytesMut};
use docvault_core::{
    config::BackupConfig,
    document::codec,
    error::{Result, VaultError},
    traits::DocumentStore,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tuning for one export
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub compression_level: u32,
    pub cursor_batch_size: usize,
    pub chunk_size: usize,
    pub channel_capacity: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from(&BackupConfig::default())
    }
}

impl From<&BackupConfig> for ExportOptions {
    fn from(config: &BackupConfig) -> Self {
        Self {
            compression_level: config.compression_level,
            cursor_batch_size: config.cursor_batch_size.max(1),
            chunk_size: config.chunk_size.max(1),
            channel_capacity: config.channel_capacity.max(1),
        }
    }
}

/// What an export wrote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    /// Documents written per collection
    pub collections: BTreeMap<String, u64>,

    pub warnings: Vec<ArchiveWarning>,
}

impl ExportSummary {
    pub fn total_documents(&self) -> u64 {
        self.collections.values().sum()
    }
}

/// Export every collection of `store` into `sink`
///
/// Collections are written in name order. A cursor error or cancellation
/// aborts the export; whatever reached the sink is then incomplete.
pub fn export<W: Write>(
    store: &dyn DocumentStore,
    sink: W,
    options: &ExportOptions,
    cancel: &CancellationToken,
) -> Result<ExportSummary> {
    let mut names = store.collection_names()?;
    names.sort();

    let mut writer = ArchiveWriter::new(sink, options.compression_level);
    for name in &names {
        if cancel.is_cancelled() {
            return Err(VaultError::Cancelled("export cancelled".into()));
        }

        let cursor = store.cursor(name, options.cursor_batch_size)?;
        let lines = cursor.map(|doc| {
            if cancel.is_cancelled() {
                return Err(VaultError::Cancelled("export cancelled".into()));
            }
            doc.map(|d| codec::encode(&d))
        });
        let count = writer.append_entry(name, lines)?;
        tracing::debug!(collection = %name, documents = count, "exported collection");
    }

    let outcome = writer.finish()?;
    let mut sink = outcome.sink;
    sink.flush()?;

    Ok(ExportSummary {
        collections: outcome.entries,
        warnings: outcome.warnings,
    })
}

/// Completion signal of a spawned export
pub struct ExportHandle {
    join: JoinHandle<Result<ExportSummary>>,
}

impl ExportHandle {
    /// Wait for the export to finish
    pub async fn wait(self) -> Result<ExportSummary> {
        self.join
            .await
            .map_err(|e| VaultError::Other(anyhow::anyhow!("export task failed: {}", e)))?
    }
}

/// Run [`export`] on the blocking pool, streaming compressed chunks
///
/// On failure an error item is pushed into the stream before it closes, so
/// the consumer can tell a finished archive from a truncated one.
pub fn spawn_export(
    store: Arc<dyn DocumentStore>,
    options: ExportOptions,
    cancel: CancellationToken,
) -> (ArchiveStream, ExportHandle) {
    let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
    let error_tx = tx.clone();

    let join = tokio::task::spawn_blocking(move || {
        let sink = ChannelWriter::new(tx, options.chunk_size);
        let result = export(store.as_ref(), sink, &options, &cancel);
        if let Err(e) = &result {
            tracing::error!(error = %e, "export failed");
            // The consumer may already be gone; nothing left to tell it then.
            let _ = error_tx.blocking_send(Err(io::Error::other(e.to_string())));
        }
        result
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    (stream.boxed(), ExportHandle { join })
}

/// Blocking `Write` adapter that forwards fixed-size chunks into a channel
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buf: BytesMut,
    chunk_size: usize,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<io::Result<Bytes>>, chunk_size: usize) -> Self {
        Self {
            tx,
            buf: BytesMut::with_capacity(chunk_size),
            chunk_size,
        }
    }

    fn send_chunk(&mut self) -> io::Result<()> {
        let chunk = self.buf.split().freeze();
        self.tx.blocking_send(Ok(chunk)).map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "archive consumer went away")
        })
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= self.chunk_size {
            self.send_chunk()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.send_chunk()?;
        }
        Ok(())
    }
}
