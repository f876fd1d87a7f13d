//! Notifier configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How recursive watches are realised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecursionMode {
    /// Use native recursive watches when the backend offers them
    #[default]
    Auto,
    /// Always watch each directory separately and discover new ones
    Emulated,
}

/// Notifier configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Recursion strategy (default: auto)
    #[serde(default)]
    pub recursion: RecursionMode,

    /// Capacity of the raw event queue feeding the dispatcher (default: 1024)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Descend into symlinked directories when emulating recursion
    /// (default: false)
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            recursion: RecursionMode::Auto,
            queue_capacity: default_queue_capacity(),
            follow_symlinks: false,
        }
    }
}

impl NotifierConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse notifier config")?;
        if config.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be at least 1");
        }
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_toml_str(&text)
    }
}

fn default_queue_capacity() -> usize {
    1024
}
