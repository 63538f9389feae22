use crate::error::{Result, VaultError};
use crate::types::DEFAULT_PREFIX;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Object storage provider backing the archives
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// Amazon S3 or any S3-compatible endpoint
    #[default]
    S3,
    Gcs,
    Azure,
    /// Local directory; `bucket` is the root path
    Local,
    /// Process-local store, gone when the process exits
    Memory,
}

impl StorageProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Gcs => "gcs",
            Self::Azure => "azure",
            Self::Local => "local",
            Self::Memory => "memory",
        }
    }

    /// URL scheme used in archive locations
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Gcs => "gs",
            Self::Azure => "az",
            Self::Local => "file",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageProvider {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "gcs" | "gs" => Ok(Self::Gcs),
            "azure" | "az" => Ok(Self::Azure),
            "local" | "file" => Ok(Self::Local),
            "memory" => Ok(Self::Memory),
            other => Err(VaultError::Configuration(format!(
                "unknown storage provider '{}'",
                other
            ))),
        }
    }
}

/// Configuration for the archive object store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,

    /// Bucket or container name (root directory for `local`)
    #[serde(default)]
    pub bucket: Option<String>,

    /// Key prefix for archives
    /// Default: "backups/"
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible services
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default, skip_serializing)]
    pub secret_access_key: Option<String>,

    /// Permit plain HTTP endpoints
    #[serde(default)]
    pub allow_http: bool,

    /// Multipart upload part size in bytes
    /// Default: 5MB
    #[serde(default = "default_part_size")]
    pub part_size: usize,

    /// Keys per delete request
    /// Default: 1000
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: usize,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_part_size() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_delete_batch_size() -> usize {
    1000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            bucket: None,
            prefix: default_prefix(),
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            allow_http: false,
            part_size: default_part_size(),
            delete_batch_size: default_delete_batch_size(),
        }
    }
}

impl StorageConfig {
    pub fn new(provider: StorageProvider, bucket: impl Into<String>) -> Self {
        Self {
            provider,
            bucket: Some(bucket.into()),
            ..Self::default()
        }
    }

    /// Process-local storage, used by tests and dry experiments
    pub fn memory() -> Self {
        Self {
            provider: StorageProvider::Memory,
            bucket: Some("memory".to_string()),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size;
        self
    }

    pub fn with_delete_batch_size(mut self, size: usize) -> Self {
        self.delete_batch_size = size;
        self
    }

    /// Bucket name, or a `Configuration` error when unset
    pub fn bucket(&self) -> Result<&str> {
        self.bucket
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| VaultError::Configuration("storage bucket is not set".into()))
    }

    /// Pre-flight checks run before any storage or database work
    pub fn validate(&self) -> Result<()> {
        self.bucket()?;
        if self.part_size < 5 * 1024 * 1024 && self.provider == StorageProvider::S3 {
            return Err(VaultError::Configuration(format!(
                "part_size {} is below the 5MB S3 minimum",
                self.part_size
            )));
        }
        if self.delete_batch_size == 0 {
            return Err(VaultError::Configuration(
                "delete_batch_size must be positive".into(),
            ));
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(VaultError::Configuration(
                "access_key_id and secret_access_key must be set together".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_bucket_is_configuration_error() {
        let err = StorageConfig::default().validate().unwrap_err();
        assert!(matches!(err, VaultError::Configuration(_)));

        let blank = StorageConfig::new(StorageProvider::S3, "  ");
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_half_credentials_rejected() {
        let mut config = StorageConfig::new(StorageProvider::S3, "b");
        config.access_key_id = Some("id".into());
        assert!(config.validate().is_err());

        let config = config.with_credentials("id", "secret");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("GS".parse::<StorageProvider>().unwrap(), StorageProvider::Gcs);
        assert_eq!("file".parse::<StorageProvider>().unwrap(), StorageProvider::Local);
        assert!("ftp".parse::<StorageProvider>().is_err());
    }

    #[test]
    fn test_defaults_from_empty_json() {
        let config: StorageConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.prefix, "backups/");
        assert_eq!(config.part_size, 5 * 1024 * 1024);
        assert_eq!(config.delete_batch_size, 1000);
        assert_eq!(config.provider, StorageProvider::S3);
    }
}
