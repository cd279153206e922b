//! Configuration for the operation queue.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $COURIER_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/courier/config.toml
//!   3. ~/.config/courier/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default ATT payload: 23-byte MTU minus the 3-byte write header.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 20;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Deadline for the active operation's next ack. 0 = wait forever.
    pub operation_timeout_ms: u64,
    /// Pause between consecutive chunks of one write. 0 = no pause.
    pub chunk_interval_ms: u64,
    /// Chunk size for `PeripheralHandle::write_default`. Zero from the
    /// environment is ignored.
    pub default_max_chunk_size: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 0,
            chunk_interval_ms: 0,
            default_max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

impl QueueConfig {
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_ms > 0).then(|| Duration::from_millis(self.operation_timeout_ms))
    }

    pub fn chunk_interval(&self) -> Option<Duration> {
        (self.chunk_interval_ms > 0).then(|| Duration::from_millis(self.chunk_interval_ms))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("courier")
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
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl CourierConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit path without env overrides. A missing file
    /// yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(CourierConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("COURIER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        Self::write_default_to(&path)?;
        Ok(path)
    }

    fn write_default_to(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text = toml::to_string_pretty(&CourierConfig::default())
            .map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Apply COURIER_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ms) =
            lookup("COURIER_QUEUE__OPERATION_TIMEOUT_MS").and_then(|v| v.parse().ok())
        {
            self.queue.operation_timeout_ms = ms;
        }
        if let Some(ms) = lookup("COURIER_QUEUE__CHUNK_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.queue.chunk_interval_ms = ms;
        }
        if let Some(size) = lookup("COURIER_QUEUE__DEFAULT_MAX_CHUNK_SIZE")
            .and_then(|v| v.parse().ok())
            .filter(|size: &usize| *size > 0)
        {
            self.queue.default_max_chunk_size = size;
        }
    }
}
