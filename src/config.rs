//! Executor initialization parameters.
//!
//! Parameters come from [`InitParams::default`], from `TLC_*` environment
//! variables, or from a TOML file. Environment values that fail to parse fall
//! back to defaults without crashing; TOML files are parsed strictly.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `TLC_ENGINE_PATH` | `engines/rank0.engine` | Engine artifact location |
//! | `TLC_MAX_BATCH_SIZE` | 8 | Max sequences per generation step |
//! | `TLC_MAX_BATCH_TOKENS` | 4096 | Max prompt + generated tokens per step |
//! | `TLC_MAX_CONCURRENT` | 256 | Max live requests (queued + in flight) |
//! | `TLC_MAX_INPUT_LEN` | 4096 | Max prompt tokens per request |
//! | `TLC_MAX_OUTPUT_LEN` | 2048 | Max `max_new_tokens` per request |
//! | `TLC_QUEUE_ORDER` | `fifo` | `fifo` or `priority` |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::InitError;
use crate::scheduler::{BatchConfig, QueueOrder};

/// Parameters needed to bring up an [`Executor`](crate::Executor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitParams {
    /// Location of the serialized engine the generator loads.
    pub engine_path: PathBuf,
    /// Max sequences stepped together.
    pub max_batch_size: usize,
    /// Max prompt plus generated tokens across one step's batch.
    pub max_batch_tokens: usize,
    /// Max requests admitted but not yet finalized.
    pub max_concurrent_requests: usize,
    /// Max prompt length.
    pub max_input_len: usize,
    /// Max `max_new_tokens` a request may ask for.
    pub max_output_len: usize,
    pub queue_order: QueueOrder,
}

impl Default for InitParams {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::from("engines/rank0.engine"),
            max_batch_size: 8,
            max_batch_tokens: 4096,
            max_concurrent_requests: 256,
            max_input_len: 4096,
            max_output_len: 2048,
            queue_order: QueueOrder::Fifo,
        }
    }
}

/// Errors loading parameters from a file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Returns parameters with documented defaults.
pub fn init_default_params() -> InitParams {
    InitParams::default()
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

impl InitParams {
    /// Load parameters from `TLC_*` environment variables.
    ///
    /// Missing or invalid values fall back to defaults; numeric limits are
    /// floored at 1.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let engine_path = std::env::var("TLC_ENGINE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.engine_path);
        let queue_order = std::env::var("TLC_QUEUE_ORDER")
            .ok()
            .and_then(|v| v.parse::<QueueOrder>().ok())
            .unwrap_or(defaults.queue_order);

        Self {
            engine_path,
            max_batch_size: parse_usize("TLC_MAX_BATCH_SIZE", defaults.max_batch_size).max(1),
            max_batch_tokens: parse_usize("TLC_MAX_BATCH_TOKENS", defaults.max_batch_tokens)
                .max(1),
            max_concurrent_requests: parse_usize(
                "TLC_MAX_CONCURRENT",
                defaults.max_concurrent_requests,
            )
            .max(1),
            max_input_len: parse_usize("TLC_MAX_INPUT_LEN", defaults.max_input_len).max(1),
            max_output_len: parse_usize("TLC_MAX_OUTPUT_LEN", defaults.max_output_len).max(1),
            queue_order,
        }
    }

    /// Parse parameters from TOML text. Missing keys take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML parameter file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check limits and that the engine artifact exists.
    pub fn validate(&self) -> Result<(), InitError> {
        let limits = [
            ("max_batch_size", self.max_batch_size),
            ("max_batch_tokens", self.max_batch_tokens),
            ("max_concurrent_requests", self.max_concurrent_requests),
            ("max_input_len", self.max_input_len),
            ("max_output_len", self.max_output_len),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(InitError::InvalidConfig(format!("{name} must be at least 1")));
            }
        }
        if self.engine_path.as_os_str().is_empty() {
            return Err(InitError::InvalidConfig("engine_path is empty".into()));
        }
        if !self.engine_path.exists() {
            return Err(InitError::ArtifactNotFound(self.engine_path.clone()));
        }
        Ok(())
    }

    /// Batch selection limits for the scheduler.
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_batch_size: self.max_batch_size,
            max_total_tokens: self.max_batch_tokens,
        }
    }
}
