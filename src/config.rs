//! Pipeline configuration
//!
//! Loaded from an optional `vesta.toml` next to the binary plus `VESTA_`
//! environment overrides (e.g. `VESTA_MAX_COMMANDS_PER_TURN=20`).

use std::path::PathBuf;

use serde::Deserialize;

/// Tunable limits of the turn pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum commands executed per turn; overflow is reported, not run
    pub max_commands_per_turn: usize,
    /// Number of entries returned by data samples
    pub sample_size: usize,
    /// SQLite history database; in-memory history when absent
    pub database_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_commands_per_turn: 12,
            sample_size: 5,
            database_path: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("vesta").required(false))
            .add_source(config::Environment::with_prefix("VESTA"))
            .build()?
            .try_deserialize()
    }
}
