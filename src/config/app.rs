//! Main application configuration
//!
//! Configuration is layered: built-in defaults, then a TOML file if one is
//! given, then environment variables, then CLI overrides applied by the
//! binary. Validation runs after every load path.

use crate::error::QueueError;
use crate::matching::MatchingConfig;
use crate::store::journal::FsyncPolicy;
use crate::store::{StoreConfig, TtlPolicy};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub storage: StorageSettings,
    pub matchmaking: MatchmakingSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Durable store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory for the journal file
    pub data_dir: PathBuf,
    /// Fsync policy: always, every_n, or never
    pub fsync_policy: String,
    /// Appends between fsyncs when fsync_policy is every_n
    pub fsync_every_n: usize,
    /// TTL applied to entries at insert time, in seconds
    pub entry_ttl_seconds: u64,
    /// TTL scope: per_entry or whole_partition
    pub ttl_policy: String,
    /// Journal compaction interval in seconds
    pub compaction_interval_seconds: u64,
}

/// Matchmaking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Matching pass interval in milliseconds
    pub match_interval_ms: u64,
    /// Cap on pairs created in one pass over one partition
    pub max_pairs_per_pass: usize,
    /// Expiry sweep interval in seconds
    pub expiry_sweep_interval_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "waiting-room".to_string(),
            log_level: "info".to_string(),
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_policy: "always".to_string(),
            fsync_every_n: 32,
            entry_ttl_seconds: 3600,
            ttl_policy: "per_entry".to_string(),
            compaction_interval_seconds: 300,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            match_interval_ms: 500,
            max_pairs_per_pass: 64,
            expiry_sweep_interval_seconds: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to
    /// defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        let config = self;

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Storage settings
        if let Ok(data_dir) = env::var("DATA_DIR") {
            config.storage.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(policy) = env::var("FSYNC_POLICY") {
            config.storage.fsync_policy = policy;
        }
        if let Ok(every_n) = env::var("FSYNC_EVERY_N") {
            config.storage.fsync_every_n = every_n
                .parse()
                .map_err(|_| anyhow!("Invalid FSYNC_EVERY_N value: {}", every_n))?;
        }
        if let Ok(ttl) = env::var("ENTRY_TTL_SECONDS") {
            config.storage.entry_ttl_seconds = ttl
                .parse()
                .map_err(|_| anyhow!("Invalid ENTRY_TTL_SECONDS value: {}", ttl))?;
        }
        if let Ok(policy) = env::var("TTL_POLICY") {
            config.storage.ttl_policy = policy;
        }
        if let Ok(interval) = env::var("COMPACTION_INTERVAL_SECONDS") {
            config.storage.compaction_interval_seconds = interval
                .parse()
                .map_err(|_| anyhow!("Invalid COMPACTION_INTERVAL_SECONDS value: {}", interval))?;
        }

        // Matchmaking settings
        if let Ok(interval) = env::var("MATCH_INTERVAL_MS") {
            config.matchmaking.match_interval_ms = interval
                .parse()
                .map_err(|_| anyhow!("Invalid MATCH_INTERVAL_MS value: {}", interval))?;
        }
        if let Ok(pairs) = env::var("MAX_PAIRS_PER_PASS") {
            config.matchmaking.max_pairs_per_pass = pairs
                .parse()
                .map_err(|_| anyhow!("Invalid MAX_PAIRS_PER_PASS value: {}", pairs))?;
        }
        if let Ok(sweep) = env::var("EXPIRY_SWEEP_INTERVAL_SECONDS") {
            config.matchmaking.expiry_sweep_interval_seconds = sweep.parse().map_err(|_| {
                anyhow!("Invalid EXPIRY_SWEEP_INTERVAL_SECONDS value: {}", sweep)
            })?;
        }

        Ok(())
    }

    /// Load configuration from a TOML file, then apply environment
    /// overrides on top.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env_overrides()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get matching pass interval as Duration
    pub fn match_interval(&self) -> Duration {
        Duration::from_millis(self.matchmaking.match_interval_ms)
    }

    /// Get expiry sweep interval as Duration
    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.matchmaking.expiry_sweep_interval_seconds)
    }

    /// Get compaction interval as Duration
    pub fn compaction_interval(&self) -> Duration {
        Duration::from_secs(self.storage.compaction_interval_seconds)
    }

    /// Path of the journal file inside the data directory
    pub fn journal_path(&self) -> PathBuf {
        self.storage.data_dir.join("queue.journal")
    }

    /// Store configuration derived from the storage section
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            default_ttl: Duration::from_secs(self.storage.entry_ttl_seconds),
            ttl_policy: match self.storage.ttl_policy.as_str() {
                "whole_partition" => TtlPolicy::WholePartition,
                _ => TtlPolicy::PerEntry,
            },
        }
    }

    /// Fsync policy derived from the storage section
    pub fn fsync_policy(&self) -> FsyncPolicy {
        match self.storage.fsync_policy.as_str() {
            "never" => FsyncPolicy::Never,
            "every_n" => FsyncPolicy::EveryN(self.storage.fsync_every_n),
            _ => FsyncPolicy::EveryWrite,
        }
    }

    /// Matching configuration derived from the matchmaking section
    pub fn matching_config(&self) -> MatchingConfig {
        MatchingConfig {
            max_pairs_per_pass: self.matchmaking.max_pairs_per_pass,
        }
    }
}

fn config_err(message: String) -> anyhow::Error {
    QueueError::Configuration { message }.into()
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => {
            return Err(config_err(format!(
                "Invalid log level: {}",
                config.service.log_level
            )))
        }
    }

    if config.service.shutdown_timeout_seconds == 0 {
        return Err(config_err("Shutdown timeout must be greater than 0".into()));
    }

    match config.storage.fsync_policy.as_str() {
        "always" | "every_n" | "never" => {}
        other => return Err(config_err(format!("Invalid fsync policy: {}", other))),
    }
    if config.storage.fsync_policy == "every_n" && config.storage.fsync_every_n == 0 {
        return Err(config_err("fsync_every_n must be greater than 0".into()));
    }
    match config.storage.ttl_policy.as_str() {
        "per_entry" | "whole_partition" => {}
        other => return Err(config_err(format!("Invalid TTL policy: {}", other))),
    }
    if config.storage.entry_ttl_seconds == 0 {
        return Err(config_err("Entry TTL must be greater than 0".into()));
    }
    if config.storage.compaction_interval_seconds == 0 {
        return Err(config_err(
            "Compaction interval must be greater than 0".into(),
        ));
    }

    if config.matchmaking.match_interval_ms == 0 {
        return Err(config_err("Match interval must be greater than 0".into()));
    }
    if config.matchmaking.max_pairs_per_pass == 0 {
        return Err(config_err("Max pairs per pass must be greater than 0".into()));
    }
    if config.matchmaking.expiry_sweep_interval_seconds == 0 {
        return Err(config_err(
            "Expiry sweep interval must be greater than 0".into(),
        ));
    }

    Ok(())
}
