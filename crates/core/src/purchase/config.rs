//! Purchase orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::backoff::BackoffPolicy;
use super::types::RetryClassification;

/// Configuration for the purchase orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Wait for ordinary controls (milliseconds).
    #[serde(default = "default_short_timeout")]
    pub short_timeout_ms: u64,

    /// Wait for controls behind slow server round-trips: the login form
    /// and the promo code confirmation (milliseconds).
    #[serde(default = "default_long_timeout")]
    pub long_timeout_ms: u64,

    /// Pause after a reload caused by a stale element (milliseconds).
    #[serde(default = "default_reload_settle")]
    pub reload_settle_ms: u64,

    /// Category strip pages to advance before giving up on a tab.
    #[serde(default = "default_max_page_advances")]
    pub max_page_advances: u32,

    /// Delay between failed iterations.
    #[serde(default)]
    pub backoff: BackoffPolicy,

    /// Which failures are retried.
    #[serde(default)]
    pub retry_classification: RetryClassification,
}

fn default_short_timeout() -> u64 {
    5000 // 5 seconds
}

fn default_long_timeout() -> u64 {
    15000 // 15 seconds
}

fn default_reload_settle() -> u64 {
    2000
}

fn default_max_page_advances() -> u32 {
    10
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            short_timeout_ms: default_short_timeout(),
            long_timeout_ms: default_long_timeout(),
            reload_settle_ms: default_reload_settle(),
            max_page_advances: default_max_page_advances(),
            backoff: BackoffPolicy::default(),
            retry_classification: RetryClassification::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn short_timeout(&self) -> Duration {
        Duration::from_millis(self.short_timeout_ms)
    }

    pub fn long_timeout(&self) -> Duration {
        Duration::from_millis(self.long_timeout_ms)
    }

    pub fn reload_settle(&self) -> Duration {
        Duration::from_millis(self.reload_settle_ms)
    }

    /// Same configuration with a different backoff.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.short_timeout(), Duration::from_secs(5));
        assert_eq!(config.long_timeout(), Duration::from_secs(15));
        assert_eq!(config.reload_settle(), Duration::from_secs(2));
        assert_eq!(config.max_page_advances, 10);
        assert_eq!(config.backoff, BackoffPolicy::None);
        assert_eq!(config.retry_classification, RetryClassification::All);
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: OrchestratorConfig = toml::from_str("max_page_advances = 4").unwrap();
        assert_eq!(config.max_page_advances, 4);
        assert_eq!(config.short_timeout_ms, 5000);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            short_timeout_ms = 3000
            long_timeout_ms = 20000
            reload_settle_ms = 0
            max_page_advances = 6
            retry_classification = "transient_only"
            backoff = { kind = "fixed", delay_ms = 1500 }
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.short_timeout_ms, 3000);
        assert_eq!(config.long_timeout_ms, 20000);
        assert_eq!(config.reload_settle_ms, 0);
        assert_eq!(config.max_page_advances, 6);
        assert_eq!(
            config.retry_classification,
            RetryClassification::TransientOnly
        );
        assert_eq!(config.backoff, BackoffPolicy::Fixed { delay_ms: 1500 });
    }

    #[test]
    fn test_with_backoff() {
        let config =
            OrchestratorConfig::default().with_backoff(BackoffPolicy::SERVICE_DEFAULT);
        assert_eq!(config.backoff, BackoffPolicy::Fixed { delay_ms: 10_000 });
        assert_eq!(config.max_page_advances, 10);
    }
}
