pub mod backup;
pub mod recovery;
pub mod storage;

pub use backup::{BackupConfig, RestoreConfig};
pub use recovery::{AlertConfig, DatabaseConfig, RecoveryConfig, SmokeCheckConfig};
pub use storage::{StorageConfig, StorageProvider};

use crate::error::{Result, VaultError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Prefix of every environment variable read by [`VaultConfig::from_env`]
pub const ENV_PREFIX: &str = "DOCVAULT_";

/// Complete engine configuration
///
/// Every section has defaults, so an empty JSON object is a valid file.
/// Environment variables override file values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub restore: RestoreConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub alert: AlertConfig,
}

impl VaultConfig {
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            ..Self::default()
        }
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VaultError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            VaultError::Configuration(format!("invalid config {}: {}", path.display(), e))
        })
    }

    /// Defaults overridden by `DOCVAULT_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Override fields from an arbitrary variable source
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, suffix)).filter(|v| !v.trim().is_empty())
        };

        if let Some(v) = var("STORAGE_PROVIDER") {
            self.storage.provider = v.parse()?;
        }
        if let Some(v) = var("BUCKET") {
            self.storage.bucket = Some(v);
        }
        if let Some(v) = var("PREFIX") {
            self.storage.prefix = v;
        }
        if let Some(v) = var("REGION") {
            self.storage.region = Some(v);
        }
        if let Some(v) = var("ENDPOINT") {
            self.storage.endpoint = Some(v);
        }
        if let Some(v) = var("ACCESS_KEY_ID") {
            self.storage.access_key_id = Some(v);
        }
        if let Some(v) = var("SECRET_ACCESS_KEY") {
            self.storage.secret_access_key = Some(v);
        }
        if let Some(v) = var("ALLOW_HTTP") {
            self.storage.allow_http = parse_var("ALLOW_HTTP", &v)?;
        }
        if let Some(v) = var("PART_SIZE") {
            self.storage.part_size = parse_var("PART_SIZE", &v)?;
        }

        if let Some(v) = var("RETENTION_COUNT") {
            self.backup.retention_count = parse_var("RETENTION_COUNT", &v)?;
        }
        if let Some(v) = var("COMPRESSION_LEVEL") {
            self.backup.compression_level = parse_var("COMPRESSION_LEVEL", &v)?;
        }
        if let Some(v) = var("RESTORE_BATCH_SIZE") {
            self.restore.batch_size = parse_var("RESTORE_BATCH_SIZE", &v)?;
        }

        if let Some(v) = var("SOURCE_DB") {
            self.database.source = Some(v);
        }
        if let Some(v) = var("TARGET_DB") {
            self.database.target = Some(v);
        }
        if let Some(v) = var("VERIFY_DB") {
            self.database.verify = Some(v);
        }

        if let Some(v) = var("MIGRATION_COMMAND") {
            self.recovery.migration_command =
                Some(v.split_whitespace().map(str::to_string).collect());
        }
        if let Some(v) = var("ALERT_WEBHOOK") {
            self.alert.webhook_url = Some(v);
        }
        if let Some(v) = var("ALERT_TIMEOUT_SECS") {
            self.alert.timeout_secs = parse_var("ALERT_TIMEOUT_SECS", &v)?;
        }

        Ok(())
    }

    /// Fail fast when object storage cannot be reached by configuration alone
    pub fn validate_storage(&self) -> Result<()> {
        self.storage.validate()?;
        if self.backup.compression_level > 9 {
            return Err(VaultError::Configuration(format!(
                "compression_level {} is outside 0-9",
                self.backup.compression_level
            )));
        }
        Ok(())
    }

    /// Source database location, or a `Configuration` error
    pub fn source(&self) -> Result<&str> {
        required(self.database.source.as_deref(), "database.source")
    }

    /// Production target location, or a `Configuration` error
    pub fn target(&self) -> Result<&str> {
        required(self.database.target.as_deref(), "database.target")
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| VaultError::Configuration(format!("{} is not set", field)))
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        VaultError::Configuration(format!("invalid value for {}{}: '{}'", ENV_PREFIX, name, raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config: VaultConfig =
            serde_json::from_str(r#"{"storage":{"bucket":"from-file","prefix":"a/"}}"#).unwrap();

        config
            .apply_env_with(env(&[
                ("DOCVAULT_BUCKET", "from-env"),
                ("DOCVAULT_RETENTION_COUNT", "3"),
                ("DOCVAULT_MIGRATION_COMMAND", "migrate --up"),
            ]))
            .unwrap();

        assert_eq!(config.storage.bucket.as_deref(), Some("from-env"));
        assert_eq!(config.storage.prefix, "a/");
        assert_eq!(config.backup.retention_count, 3);
        assert_eq!(
            config.recovery.migration_command,
            Some(vec!["migrate".to_string(), "--up".to_string()])
        );
    }

    #[test]
    fn test_bad_number_is_configuration_error() {
        let mut config = VaultConfig::default();
        let err = config
            .apply_env_with(env(&[("DOCVAULT_RETENTION_COUNT", "seven")]))
            .unwrap_err();
        assert!(matches!(err, VaultError::Configuration(_)));
    }

    #[test]
    fn test_validate_storage_requires_bucket() {
        assert!(VaultConfig::default().validate_storage().is_err());
        assert!(VaultConfig::new(StorageConfig::memory())
            .validate_storage()
            .is_ok());
    }

    #[test]
    fn test_default_smoke_checks() {
        let config = VaultConfig::default();
        let names: Vec<_> = config
            .recovery
            .smoke_checks
            .iter()
            .map(|c| c.collection.as_str())
            .collect();
        assert_eq!(names, vec!["users", "orders", "restaurants"]);
        assert!(config.target().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docvault.json");
        std::fs::write(&path, r#"{"backup":{"retention_count":2}}"#).unwrap();

        let config = VaultConfig::from_file(&path).unwrap();
        assert_eq!(config.backup.retention_count, 2);
        assert_eq!(config.backup.compression_level, 6);

        let missing = VaultConfig::from_file(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(VaultError::Configuration(_))));
    }
}
