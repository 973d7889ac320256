//! Configuration for the chainsift daemon.
//!
//! Loaded from a TOML file; every tunable has a default so a minimal config
//! only names the RPC endpoint and the database.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::watcher::WatcherSettings;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chain node connection.
    pub node: NodeConfig,

    /// Database connection.
    pub database: DatabaseConfig,

    /// Supervisor tunables.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Storage diff ingestion; absent means no diff source.
    #[serde(default)]
    pub storage_diffs: Option<StorageDiffsConfig>,
}

/// Chain node connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// HTTP JSON-RPC endpoint.
    pub rpc_url: String,
}

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL, e.g. `sqlite://chainsift.db`.
    pub url: String,

    /// Maximum connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Supervisor tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Block number to start syncing from.
    #[serde(default)]
    pub starting_block: i64,

    /// Seconds between rounds when a round found no work.
    #[serde(default = "default_polling_interval_secs")]
    pub polling_interval_secs: u64,

    /// Recent headers re-fetched each round for reorg repair.
    #[serde(default = "default_validation_window")]
    pub validation_window: i64,

    /// Re-examine already-checked headers up to the recheck cap.
    #[serde(default)]
    pub recheck_headers: bool,

    /// Per-transformer check-count ceiling used when rechecking.
    #[serde(default = "default_recheck_cap")]
    pub recheck_cap: i64,

    /// Unexpected errors tolerated before shutting down.
    #[serde(default = "default_max_unexpected_errors")]
    pub max_unexpected_errors: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            starting_block: 0,
            polling_interval_secs: default_polling_interval_secs(),
            validation_window: default_validation_window(),
            recheck_headers: false,
            recheck_cap: default_recheck_cap(),
            max_unexpected_errors: default_max_unexpected_errors(),
        }
    }
}

impl SyncConfig {
    /// Translate into supervisor settings.
    pub fn watcher_settings(&self, diff_drain_limit: usize) -> WatcherSettings {
        WatcherSettings {
            polling_interval: Duration::from_secs(self.polling_interval_secs),
            validation_window: self.validation_window,
            max_unexpected_errors: self.max_unexpected_errors,
            recheck_cap: self.recheck_cap,
            recheck_headers: self.recheck_headers,
            starting_block: self.starting_block,
            diff_drain_limit,
        }
    }
}

/// Where storage diffs come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffSource {
    /// A tailed CSV file.
    Csv,
    /// A node subscription.
    Stream,
}

/// Storage diff ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageDiffsConfig {
    /// Diff source kind.
    pub source: DiffSource,

    /// Path of the tailed CSV file; required for the csv source.
    #[serde(default)]
    pub path: Option<String>,

    /// Capacity of the ingestion channel.
    #[serde(default = "default_diff_channel_capacity")]
    pub channel_capacity: usize,

    /// Most diffs drained per supervisor round.
    #[serde(default = "default_diff_drain_limit")]
    pub drain_limit: usize,
}

impl StorageDiffsConfig {
    /// A diff-source config with default channel sizing.
    pub fn new(source: DiffSource, path: Option<String>) -> Self {
        Self {
            source,
            path,
            channel_capacity: default_diff_channel_capacity(),
            drain_limit: default_diff_drain_limit(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_polling_interval_secs() -> u64 {
    7
}

fn default_validation_window() -> i64 {
    15
}

fn default_recheck_cap() -> i64 {
    3
}

fn default_max_unexpected_errors() -> i64 {
    5
}

fn default_diff_channel_capacity() -> usize {
    500
}

fn default_diff_drain_limit() -> usize {
    500
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.node.rpc_url.is_empty() {
            anyhow::bail!("Node RPC URL cannot be empty");
        }
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be > 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }
        if self.sync.polling_interval_secs == 0 {
            anyhow::bail!("Sync polling_interval_secs must be > 0");
        }
        if self.sync.recheck_cap < 1 {
            anyhow::bail!("Sync recheck_cap must be >= 1");
        }
        if self.sync.max_unexpected_errors < 0 {
            anyhow::bail!("Sync max_unexpected_errors cannot be negative");
        }
        if let Some(diffs) = &self.storage_diffs {
            if diffs.source == DiffSource::Csv && diffs.path.is_none() {
                anyhow::bail!("storage_diffs.path is required for the csv source");
            }
            if diffs.channel_capacity == 0 {
                anyhow::bail!("storage_diffs.channel_capacity must be > 0");
            }
            if diffs.drain_limit == 0 {
                anyhow::bail!("storage_diffs.drain_limit must be > 0");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let toml = r#"
[node]
rpc_url = "http://localhost:8545"

[database]
url = "sqlite://chainsift.db"
        "#;

        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.sync.polling_interval_secs, 7);
        assert_eq!(config.sync.validation_window, 15);
        assert_eq!(config.sync.recheck_cap, 3);
        assert_eq!(config.sync.max_unexpected_errors, 5);
        assert!(!config.sync.recheck_headers);
        assert_eq!(config.database.max_connections, 5);
        assert!(config.storage_diffs.is_none());
    }

    #[test]
    fn test_full_config_parses() {
        let toml = r#"
[node]
rpc_url = "http://localhost:8545"

[database]
url = "sqlite://chainsift.db"
max_connections = 10

[sync]
starting_block = 8928152
polling_interval_secs = 3
recheck_headers = true
recheck_cap = 5

[storage_diffs]
source = "csv"
path = "/var/lib/chainsift/diffs.csv"
        "#;

        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.sync.starting_block, 8_928_152);
        assert!(config.sync.recheck_headers);
        let diffs = config.storage_diffs.unwrap();
        assert_eq!(diffs.source, DiffSource::Csv);
        assert_eq!(diffs.drain_limit, 500);
    }

    #[test]
    fn test_validation_rejects_empty_rpc_url() {
        let toml = r#"
[node]
rpc_url = ""

[database]
url = "sqlite://chainsift.db"
        "#;

        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(format!("{:#}", err).contains("RPC URL"));
    }

    #[test]
    fn test_validation_rejects_csv_source_without_path() {
        let toml = r#"
[node]
rpc_url = "http://localhost:8545"

[database]
url = "sqlite://chainsift.db"

[storage_diffs]
source = "csv"
        "#;

        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(format!("{:#}", err).contains("path is required"));
    }

    #[test]
    fn test_stream_source_needs_no_path() {
        let toml = r#"
[node]
rpc_url = "http://localhost:8545"

[database]
url = "sqlite://chainsift.db"

[storage_diffs]
source = "stream"
        "#;

        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.storage_diffs.unwrap().source, DiffSource::Stream);
    }

    #[test]
    fn test_watcher_settings_translation() {
        let sync = SyncConfig {
            polling_interval_secs: 3,
            starting_block: 42,
            ..SyncConfig::default()
        };
        let settings = sync.watcher_settings(250);
        assert_eq!(settings.polling_interval, Duration::from_secs(3));
        assert_eq!(settings.starting_block, 42);
        assert_eq!(settings.diff_drain_limit, 250);
    }
}
