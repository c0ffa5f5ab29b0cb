//! Configuration for a CFDP entity's inbound router.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CFDP_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/cfdp/config.toml
//!   3. ~/.config/cfdp/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CfdpConfig {
    pub entity: EntityConfig,
    pub router: RouterConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    /// CFDP entity ID of this entity.
    pub local_entity_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Messages the inbound queue holds before senders see backpressure.
    pub inbound_queue_depth: usize,
    /// Packet infos the destination engine can have outstanding.
    pub destination_queue_depth: usize,
    /// Packet infos the source engine can have outstanding.
    pub source_queue_depth: usize,
    /// Attach a source engine. When false, PDUs addressed to the file
    /// sender are rejected.
    pub source_engine: bool,
    /// Period of the drain loop.
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Packet slots in the shared store.
    pub max_packets: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for EntityConfig {
    fn default() -> Self {
        Self { local_entity_id: 1 }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            inbound_queue_depth: 64,
            destination_queue_depth: 64,
            source_queue_depth: 64,
            source_engine: true,
            poll_interval_ms: 50,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { max_packets: 256 }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("cfdp")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid setting {0}: {1}")]
    Invalid(&'static str, String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl CfdpConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific file, falling back to defaults if it is absent.
    /// No env overrides are applied.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(CfdpConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CFDP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config to `path` if nothing is there yet.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text =
            toml::to_string_pretty(&CfdpConfig::default()).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Reject settings the router cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let depths = [
            ("router.inbound_queue_depth", self.router.inbound_queue_depth),
            ("router.destination_queue_depth", self.router.destination_queue_depth),
            ("router.source_queue_depth", self.router.source_queue_depth),
            ("store.max_packets", self.store.max_packets),
        ];
        for (name, value) in depths {
            if value == 0 {
                return Err(ConfigError::Invalid(name, "must be non-zero".into()));
            }
        }
        if self.router.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "router.poll_interval_ms",
                "must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Apply CFDP_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, keyed by env var name. Values that do
    /// not parse are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("CFDP_ENTITY__LOCAL_ENTITY_ID").and_then(|v| v.parse().ok()) {
            self.entity.local_entity_id = id;
        }
        if let Some(ms) = lookup("CFDP_ROUTER__POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.router.poll_interval_ms = ms;
        }
        if let Some(v) = lookup("CFDP_ROUTER__SOURCE_ENGINE") {
            self.router.source_engine = v == "true" || v == "1";
        }
        if let Some(n) = lookup("CFDP_STORE__MAX_PACKETS").and_then(|v| v.parse().ok()) {
            self.store.max_packets = n;
        }
    }
}
