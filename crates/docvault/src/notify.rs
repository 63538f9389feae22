//! Operator alerts
//!
//! Alerts are best-effort: callers log a failed delivery and carry on.

use async_trait::async_trait;
use docvault_core::{
    config::AlertConfig,
    error::{Result, VaultError},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Critical,
}

/// One alert: a human summary plus the machine-readable run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub text: String,
    pub run: serde_json::Value,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Writes alerts to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        match alert.severity {
            Severity::Info => tracing::info!(alert = %alert.text, "docvault alert"),
            Severity::Critical => tracing::error!(alert = %alert.text, "docvault alert"),
        }
        Ok(())
    }
}

/// POSTs alerts as JSON to a webhook
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VaultError::Configuration(format!("cannot build alert client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        tracing::debug!(url = %self.url, "sending alert");
        self.client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| VaultError::Other(anyhow::anyhow!("alert delivery failed: {}", e)))?;
        Ok(())
    }
}

/// Webhook notifier when a URL is configured, log notifier otherwise
pub fn notifier_from_config(config: &AlertConfig) -> Result<Arc<dyn Notifier>> {
    match &config.webhook_url {
        Some(url) if !url.trim().is_empty() => Ok(Arc::new(WebhookNotifier::new(
            url.trim(),
            Duration::from_secs(config.timeout_secs.max(1)),
        )?)),
        _ => Ok(Arc::new(LogNotifier)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let alert = Alert {
            severity: Severity::Critical,
            text: "disaster recovery failed".into(),
            run: serde_json::json!({ "phase": "failed" }),
        };
        assert!(LogNotifier.notify(&alert).await.is_ok());
    }

    #[test]
    fn test_alert_serializes_severity() {
        let alert = Alert {
            severity: Severity::Info,
            text: "ok".into(),
            run: serde_json::Value::Null,
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["severity"], "info");
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_an_error() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:1/alert", Duration::from_secs(1)).unwrap();
        let alert = Alert {
            severity: Severity::Info,
            text: "ok".into(),
            run: serde_json::Value::Null,
        };
        assert!(notifier.notify(&alert).await.is_err());
    }
}
