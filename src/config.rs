//! Process-wide tunables.
//!
//! The configuration can be installed once, before any rope reads it. After
//! that it is frozen for the life of the process.

use std::sync::OnceLock;

use crate::error::{Result, RopeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Concatenations of materialized ropes shorter than this are copied into
    /// a single leaf.
    pub flatten_threshold: usize,
    /// Substrings shorter than this are copied out of their parent.
    pub substring_copy_threshold: usize,
    /// Concatenations deeper than this are flattened.
    pub max_depth: usize,
    /// Largest byte length a rope may have.
    pub max_byte_length: usize,
    /// Pending native buffer releases before the finalization queue drains
    /// inline.
    pub finalizer_batch: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            flatten_threshold: 128,
            substring_copy_threshold: 32,
            max_depth: 128,
            max_byte_length: i32::MAX as usize,
            finalizer_batch: 64,
        }
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Install `config`. Fails if a configuration is already in place, including
/// the default one set by the first read.
pub fn install(config: Config) -> Result<()> {
    CONFIG.set(config).map_err(|_| RopeError::ConfigLocked)
}

pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}
