//! Engine configuration
//!
//! All settings have defaults; a JSON document only needs to name the ones
//! it changes.
//!
//! ```rust
//! use synckit_collab::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "history": { "max_entries": 20 } }"#).unwrap();
//! assert_eq!(config.history.max_entries, 20);
//! assert_eq!(config.history.restore_batch_size, 50);
//! ```

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub history: HistoryConfig,
    pub buffer: BufferConfig,
    pub server: ServerConfig,
}

/// Undo/redo history settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Undo frames kept before the oldest are folded into the tail
    pub max_entries: usize,

    /// Records fetched per round trip when restoring server history
    pub restore_batch_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            restore_batch_size: 50,
        }
    }
}

/// Ordered message buffer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Stash size after which every further stashed message logs a warning
    pub stash_warn_threshold: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            stash_warn_threshold: 256,
        }
    }
}

/// Server-side revision store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Attempts per multi-field transaction before giving up
    pub max_transaction_retries: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_transaction_retries: 8,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.history.max_entries == 0 {
            return Err(SyncError::Config("history.max_entries must be positive".to_string()));
        }
        if self.history.restore_batch_size == 0 {
            return Err(SyncError::Config(
                "history.restore_batch_size must be positive".to_string(),
            ));
        }
        if self.server.max_transaction_retries == 0 {
            return Err(SyncError::Config(
                "server.max_transaction_retries must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
