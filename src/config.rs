//! Configuration
//!
//! Monitor parameters and the exchange address-label list, loaded from JSON
//! files with sensible defaults for every field.

use std::path::Path;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::ipc::DEFAULT_IPC_PATHS;
use crate::publisher::DEFAULT_CHANNEL;

/// Reporting threshold: approvals within the window must exceed this count
pub const DEFAULT_CALLS_THRESHOLD: usize = 20;

/// How long approvals stay in the store (the observation window)
pub const DEFAULT_SECONDS_KEEP_APPROVALS: u64 = 6 * 60 * 60;

/// How long attacker traces keep accruing after the last report
pub const DEFAULT_SECONDS_KEEP_FINDINGS: u64 = 7 * 24 * 60 * 60;

/// How long address classifications stay cached
pub const DEFAULT_SECONDS_REGISTRY_CACHE: u64 = 6 * 60 * 60;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Monitor parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    /// Approvals count a spender must exceed to be reported
    pub calls_threshold: usize,
    /// Store retention window in seconds
    pub seconds_keep_approvals: u64,
    /// Attacker-trace retention window in seconds
    pub seconds_keep_findings: u64,
    /// Registry cache TTL in seconds
    pub seconds_registry_cache: u64,
    /// Node IPC socket path
    pub ipc_path: String,
    /// Redis connection URL
    pub redis_url: String,
    /// Redis channel findings are published to
    pub alert_channel: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            calls_threshold: DEFAULT_CALLS_THRESHOLD,
            seconds_keep_approvals: DEFAULT_SECONDS_KEEP_APPROVALS,
            seconds_keep_findings: DEFAULT_SECONDS_KEEP_FINDINGS,
            seconds_registry_cache: DEFAULT_SECONDS_REGISTRY_CACHE,
            ipc_path: DEFAULT_IPC_PATHS[0].to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            alert_channel: DEFAULT_CHANNEL.to_string(),
        }
    }
}

impl MonitorConfig {
    /// Load and validate config from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        info!(path = %path.display(), "loaded monitor config");
        Ok(config)
    }

    /// Check parameter sanity
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.calls_threshold == 0 {
            return Err(ConfigError::Invalid(
                "callsThreshold must be at least 1".to_string(),
            ));
        }
        if self.seconds_keep_approvals == 0 {
            return Err(ConfigError::Invalid(
                "secondsKeepApprovals must be non-zero".to_string(),
            ));
        }
        if self.seconds_keep_findings < self.seconds_keep_approvals {
            return Err(ConfigError::Invalid(
                "secondsKeepFindings must not be shorter than secondsKeepApprovals".to_string(),
            ));
        }
        Ok(())
    }
}

/// An entry of the address-label list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressLabel {
    pub address: String,
    #[serde(rename = "type")]
    pub label: String,
}

/// Load address labels from a JSON file
pub fn load_labels(path: impl AsRef<Path>) -> Result<Vec<AddressLabel>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Addresses labeled as centralized exchanges, for seeding the registry.
/// Unparseable addresses are skipped rather than failing the whole list.
pub fn exchange_addresses(labels: &[AddressLabel]) -> Vec<Address> {
    labels
        .iter()
        .filter(|l| l.label == "Exchange")
        .filter_map(|l| l.address.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    // ==================== MonitorConfig tests ====================

    #[test]
    fn test_config_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.calls_threshold, DEFAULT_CALLS_THRESHOLD);
        assert_eq!(config.seconds_keep_approvals, DEFAULT_SECONDS_KEEP_APPROVALS);
        assert_eq!(config.seconds_keep_findings, DEFAULT_SECONDS_KEEP_FINDINGS);
        assert_eq!(config.seconds_registry_cache, DEFAULT_SECONDS_REGISTRY_CACHE);
        assert_eq!(config.alert_channel, "phishing_alerts");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file() {
        let file = write_temp(
            r#"{
                "callsThreshold": 5,
                "secondsKeepApprovals": 3600,
                "secondsKeepFindings": 7200,
                "ipcPath": "/tmp/anvil.ipc"
            }"#,
        );

        let config = MonitorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.calls_threshold, 5);
        assert_eq!(config.seconds_keep_approvals, 3600);
        assert_eq!(config.seconds_keep_findings, 7200);
        assert_eq!(config.ipc_path, "/tmp/anvil.ipc");
        // unspecified fields fall back to defaults
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
    }

    #[test]
    fn test_config_from_missing_file() {
        let result = MonitorConfig::from_file("/nonexistent/config.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_config_from_invalid_json() {
        let file = write_temp("{ not json");
        let result = MonitorConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_rejects_zero_threshold() {
        let file = write_temp(r#"{ "callsThreshold": 0 }"#);
        let result = MonitorConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_config_rejects_findings_window_shorter_than_approvals() {
        let file = write_temp(
            r#"{ "secondsKeepApprovals": 7200, "secondsKeepFindings": 3600 }"#,
        );
        let result = MonitorConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    // ==================== address label tests ====================

    #[test]
    fn test_load_labels_and_filter_exchanges() {
        let file = write_temp(
            r#"[
                { "address": "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266", "type": "Exchange" },
                { "address": "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D", "type": "Router" },
                { "address": "0xa0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "type": "Exchange" }
            ]"#,
        );

        let labels = load_labels(file.path()).unwrap();
        assert_eq!(labels.len(), 3);

        let exchanges = exchange_addresses(&labels);
        assert_eq!(exchanges.len(), 2);
    }

    #[test]
    fn test_exchange_addresses_skips_unparseable() {
        let labels = vec![
            AddressLabel {
                address: "not-an-address".to_string(),
                label: "Exchange".to_string(),
            },
            AddressLabel {
                address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
                label: "Exchange".to_string(),
            },
        ];

        let exchanges = exchange_addresses(&labels);
        assert_eq!(exchanges.len(), 1);
    }
}
