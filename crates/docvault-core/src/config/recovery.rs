use serde::{Deserialize, Serialize};

/// Database locations the engine works against
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database exported by `backup`
    #[serde(default)]
    pub source: Option<String>,

    /// Production database replaced by `restore` and `recover`
    #[serde(default)]
    pub target: Option<String>,

    /// Disposable database used by `verify`; a fresh unique location when unset
    #[serde(default)]
    pub verify: Option<String>,
}

/// Minimum expectation for one collection after a restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmokeCheckConfig {
    pub collection: String,

    #[serde(default)]
    pub min_count: u64,
}

impl SmokeCheckConfig {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            min_count: 0,
        }
    }

    pub fn with_min_count(mut self, min_count: u64) -> Self {
        self.min_count = min_count;
        self
    }
}

/// Configuration for verification and disaster recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Collections checked after a restore
    /// Default: users, orders, restaurants with no minimum
    #[serde(default = "default_smoke_checks")]
    pub smoke_checks: Vec<SmokeCheckConfig>,

    /// External migration command (program followed by its arguments)
    #[serde(default)]
    pub migration_command: Option<Vec<String>>,
}

fn default_smoke_checks() -> Vec<SmokeCheckConfig> {
    ["users", "orders", "restaurants"]
        .into_iter()
        .map(SmokeCheckConfig::new)
        .collect()
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            smoke_checks: default_smoke_checks(),
            migration_command: None,
        }
    }
}

impl RecoveryConfig {
    pub fn with_smoke_checks(mut self, checks: Vec<SmokeCheckConfig>) -> Self {
        self.smoke_checks = checks;
        self
    }
}

/// Configuration for operator alerts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Webhook receiving a JSON alert; alerts go to the log when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Default: 10s
    #[serde(default = "default_alert_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_alert_timeout_secs() -> u64 {
    10
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_alert_timeout_secs(),
        }
    }
}
