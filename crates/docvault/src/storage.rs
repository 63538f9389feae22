//! Archive transport over object storage
//!
//! [`ArchiveStorage`] is the seam between the engine and a provider. The
//! shipped implementation, [`ObjectStoreBackend`], speaks to S3, GCS, Azure,
//! a local directory or process memory through the `object_store` crate.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use docvault_core::{
    config::{StorageConfig, StorageProvider},
    error::{Result, VaultError},
    types::BackupKey,
};
use futures::stream::{self, BoxStream, StreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, WriteMultipart};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Compressed archive bytes in flight between a producer and a consumer
///
/// An `Err` item means the producer failed; consumers must not commit what
/// they received so far.
pub type ArchiveStream = BoxStream<'static, io::Result<Bytes>>;

/// Parts uploaded concurrently by one multipart upload
const MAX_IN_FLIGHT_PARTS: usize = 4;

/// One object found under a prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupObject {
    pub key: String,

    /// Creation time parsed from the key, or the last-modified time for
    /// objects whose key is not a backup key
    pub created_at: DateTime<Utc>,

    pub size_bytes: u64,

    pub last_modified: DateTime<Utc>,

    pub location: String,

    /// Whether the key parses as a backup archive key
    pub archive: bool,
}

/// Result of a committed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub key: String,
    pub location: String,
    pub size_bytes: u64,

    /// Hex SHA-256 of the uploaded bytes
    pub content_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDelete {
    pub key: String,
    pub reason: String,
}

/// Partial-success result of a batch delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub deleted: Vec<String>,
    pub failed: Vec<FailedDelete>,
}

impl DeleteOutcome {
    fn fail(&mut self, key: String, reason: String) {
        tracing::warn!(key = %key, reason = %reason, "failed to delete object");
        self.failed.push(FailedDelete { key, reason });
    }
}

/// Object storage for backup archives
#[async_trait]
pub trait ArchiveStorage: Send + Sync {
    /// Upload a stream of unknown length under `key`
    ///
    /// The upload is aborted, and nothing is committed, when the stream
    /// yields an error or `cancel` fires.
    async fn upload(
        &self,
        key: &str,
        stream: ArchiveStream,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt>;

    /// Stream the object stored under `key`
    async fn download(&self, key: &str) -> Result<ArchiveStream>;

    /// Every object under `prefix`, newest first
    async fn list(&self, prefix: &str) -> Result<Vec<BackupObject>>;

    /// Delete keys in provider-sized batches, reporting partial success
    async fn delete_batch(&self, keys: &[String]) -> Result<DeleteOutcome>;

    /// Human-readable location of `key`, e.g. `s3://bucket/backups/...`
    fn location(&self, key: &str) -> String;

    /// Get the storage type identifier
    fn storage_type(&self) -> &str;
}

/// Newest backup archive under `prefix`, ignoring foreign objects
pub async fn latest_archive(
    storage: &dyn ArchiveStorage,
    prefix: &str,
) -> Result<Option<BackupObject>> {
    Ok(storage
        .list(prefix)
        .await?
        .into_iter()
        .find(|object| object.archive))
}

/// [`ArchiveStorage`] over any `object_store` provider
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    provider: StorageProvider,
    bucket: String,
    part_size: usize,
    delete_batch_size: usize,
}

impl ObjectStoreBackend {
    /// Build the provider client described by `config`
    ///
    /// Fails with `Configuration` before any network traffic when the
    /// configuration is incomplete.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        let bucket = config.bucket()?.to_string();
        let build_err = |e: object_store::Error| VaultError::Configuration(e.to_string());

        let store: Arc<dyn ObjectStore> = match config.provider {
            StorageProvider::S3 => {
                let mut builder = AmazonS3Builder::from_env()
                    .with_bucket_name(&bucket)
                    .with_allow_http(config.allow_http);

                if let Some(ref region) = config.region {
                    builder = builder.with_region(region);
                }
                if let Some(ref endpoint) = config.endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if let Some(ref access_key) = config.access_key_id {
                    builder = builder.with_access_key_id(access_key);
                }
                if let Some(ref secret_key) = config.secret_access_key {
                    builder = builder.with_secret_access_key(secret_key);
                }

                Arc::new(builder.build().map_err(build_err)?)
            }
            StorageProvider::Gcs => {
                let builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(&bucket);

                Arc::new(builder.build().map_err(build_err)?)
            }
            StorageProvider::Azure => {
                let mut builder = MicrosoftAzureBuilder::from_env()
                    .with_container_name(&bucket)
                    .with_allow_http(config.allow_http);

                if let Some(ref account) = config.access_key_id {
                    builder = builder.with_account(account);
                }
                if let Some(ref access_key) = config.secret_access_key {
                    builder = builder.with_access_key(access_key);
                }

                Arc::new(builder.build().map_err(build_err)?)
            }
            StorageProvider::Local => {
                let path = PathBuf::from(&bucket);
                std::fs::create_dir_all(&path)?;
                Arc::new(LocalFileSystem::new_with_prefix(path).map_err(build_err)?)
            }
            StorageProvider::Memory => Arc::new(InMemory::new()),
        };

        tracing::debug!(provider = %config.provider, bucket = %bucket, "storage backend ready");

        Ok(Self {
            store,
            provider: config.provider,
            bucket,
            part_size: config.part_size,
            delete_batch_size: config.delete_batch_size.max(1),
        })
    }

    /// Wrap an existing store, taking tuning knobs from `config`
    pub fn new(store: Arc<dyn ObjectStore>, config: &StorageConfig) -> Self {
        Self {
            store,
            provider: config.provider,
            bucket: config.bucket.clone().unwrap_or_default(),
            part_size: config.part_size,
            delete_batch_size: config.delete_batch_size.max(1),
        }
    }

    /// Process-local backend, handy in tests
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), &StorageConfig::memory())
    }

    /// The underlying object store
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    fn object_path(&self, key: &str) -> Result<ObjectPath> {
        ObjectPath::parse(key).map_err(|e| VaultError::storage([key], e))
    }

    fn map_err(&self, key: &str, err: object_store::Error) -> VaultError {
        match err {
            object_store::Error::NotFound { .. } => {
                VaultError::NotFound(format!("no object at {}", self.location(key)))
            }
            other => VaultError::storage([key], other),
        }
    }
}

#[async_trait]
impl ArchiveStorage for ObjectStoreBackend {
    async fn upload(
        &self,
        key: &str,
        mut stream: ArchiveStream,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt> {
        let path = self.object_path(key)?;
        let upload = self
            .store
            .put_multipart(&path)
            .await
            .map_err(|e| self.map_err(key, e))?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, self.part_size);

        let mut hasher = Sha256::new();
        let mut size_bytes = 0u64;

        let streamed: Result<()> = async {
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(VaultError::Cancelled(format!("upload of {} cancelled", key)));
                    }
                    next = stream.next() => next,
                };

                match next {
                    None => return Ok(()),
                    Some(Err(e)) => {
                        return Err(VaultError::Archive(format!(
                            "archive stream for {} failed: {}",
                            key, e
                        )));
                    }
                    Some(Ok(chunk)) => {
                        writer
                            .wait_for_capacity(MAX_IN_FLIGHT_PARTS)
                            .await
                            .map_err(|e| self.map_err(key, e))?;
                        hasher.update(&chunk);
                        size_bytes += chunk.len() as u64;
                        writer.write(&chunk);
                    }
                }
            }
        }
        .await;

        if let Err(e) = streamed {
            tracing::warn!(key, error = %e, "aborting multipart upload");
            if let Err(abort_err) = writer.abort().await {
                tracing::warn!(key, error = %abort_err, "failed to abort multipart upload");
            }
            return Err(e);
        }

        writer.finish().await.map_err(|e| self.map_err(key, e))?;

        let receipt = UploadReceipt {
            key: key.to_string(),
            location: self.location(key),
            size_bytes,
            content_hash: hex::encode(hasher.finalize()),
        };
        tracing::info!(key, size_bytes, "uploaded archive");
        Ok(receipt)
    }

    async fn download(&self, key: &str) -> Result<ArchiveStream> {
        let path = self.object_path(key)?;
        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| self.map_err(key, e))?;

        Ok(result
            .into_stream()
            .map(|chunk| chunk.map_err(io::Error::other))
            .boxed())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BackupObject>> {
        // object_store lists by path segment; filter the file-name part of the prefix here.
        let dir = prefix.rfind('/').map(|i| &prefix[..i]).unwrap_or("");
        let dir_path = if dir.is_empty() {
            None
        } else {
            Some(self.object_path(dir)?)
        };

        let mut objects = Vec::new();
        let mut listing = self.store.list(dir_path.as_ref());
        while let Some(meta) = listing.next().await {
            let meta = meta.map_err(|e| VaultError::storage([prefix], e))?;
            let key = meta.location.to_string();
            if !key.starts_with(prefix) {
                continue;
            }

            let parsed = BackupKey::parse(&key);
            objects.push(BackupObject {
                created_at: parsed
                    .as_ref()
                    .map(|k| k.created_at())
                    .unwrap_or(meta.last_modified),
                size_bytes: meta.size as u64,
                last_modified: meta.last_modified,
                location: self.location(&key),
                archive: parsed.is_some(),
                key,
            });
        }

        objects.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.key.cmp(&a.key))
        });
        Ok(objects)
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<DeleteOutcome> {
        let mut outcome = DeleteOutcome::default();

        for batch in keys.chunks(self.delete_batch_size) {
            let mut pending = Vec::with_capacity(batch.len());
            let mut paths = Vec::with_capacity(batch.len());
            for key in batch {
                match self.object_path(key) {
                    Ok(path) => {
                        pending.push(key.clone());
                        paths.push(path);
                    }
                    Err(e) => outcome.fail(key.clone(), e.to_string()),
                }
            }
            if paths.is_empty() {
                continue;
            }

            // One bulk request per chunk; results come back in request order.
            let mut results = self
                .store
                .delete_stream(stream::iter(paths).map(Ok::<_, object_store::Error>).boxed())
                .collect::<Vec<_>>()
                .await
                .into_iter();

            for key in pending {
                match results.next() {
                    Some(Ok(_)) | Some(Err(object_store::Error::NotFound { .. })) => {
                        outcome.deleted.push(key)
                    }
                    Some(Err(e)) => outcome.fail(key, e.to_string()),
                    None => outcome.fail(key, "provider returned no result".to_string()),
                }
            }
        }

        Ok(outcome)
    }

    fn location(&self, key: &str) -> String {
        format!("{}://{}/{}", self.provider.scheme(), self.bucket, key)
    }

    fn storage_type(&self) -> &str {
        self.provider.as_str()
    }
}
