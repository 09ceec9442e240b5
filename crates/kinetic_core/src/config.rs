//! # Substrate Configuration
//!
//! Loaded once at startup, typically from the `[arena]` table of the world
//! definition file.
//!
//! ```toml
//! default_capacity = 4096
//! initial_table_len = 32
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for an [`ArenaAllocator`](crate::memory::ArenaAllocator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArenaConfig {
    /// Stack capacity, in items, of every newly created slab.
    pub default_capacity: usize,
    /// Initial length of the per-type slab lookup table.
    pub initial_table_len: usize,
}

impl ArenaConfig {
    /// Default slab capacity in items.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Default lookup table length.
    pub const DEFAULT_TABLE_LEN: usize = 16;

    /// Creates a config with the given slab capacity and default table length.
    #[must_use]
    pub const fn new(default_capacity: usize) -> Self {
        Self {
            default_capacity,
            initial_table_len: Self::DEFAULT_TABLE_LEN,
        }
    }

    /// Parses a config from a TOML document. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] if the document is malformed or has unknown keys.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
