//! Config CLI subcommands: show, defaults, validate.
//!
//! Parameters come from `TLC_*` environment variables, or from a TOML file
//! when `--file PATH` is given.

use std::path::Path;

use super::EXIT_CONFIG_ERROR;
use crate::config::{ConfigError, InitParams};

/// Load parameters from `file`, or from the environment when absent.
pub fn load(file: Option<&Path>) -> Result<InitParams, ConfigError> {
    match file {
        Some(path) => InitParams::from_toml_file(path),
        None => Ok(InitParams::from_env()),
    }
}

/// Print effective parameters as env-style key-value pairs to stdout.
pub fn run_show(file: Option<&Path>) -> i32 {
    match load(file) {
        Ok(params) => {
            print_params(&params);
            0
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            EXIT_CONFIG_ERROR
        }
    }
}

/// Print default parameters (no env overrides) to stdout.
pub fn run_defaults() {
    print_params(&InitParams::default());
}

/// Validate parameters, including that the engine artifact exists.
///
/// Returns 0 if valid, 1 if validation fails, 2 if the file cannot be loaded.
pub fn run_validate(file: Option<&Path>) -> i32 {
    let params = match load(file) {
        Ok(params) => params,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return EXIT_CONFIG_ERROR;
        }
    };
    match params.validate() {
        Ok(()) => {
            println!("Configuration is valid.");
            0
        }
        Err(e) => {
            eprintln!("INVALID: {e}");
            1
        }
    }
}

/// Parameters as `(env var, value)` pairs, in documentation order.
pub fn env_pairs(params: &InitParams) -> Vec<(&'static str, String)> {
    vec![
        ("TLC_ENGINE_PATH", params.engine_path.display().to_string()),
        ("TLC_MAX_BATCH_SIZE", params.max_batch_size.to_string()),
        ("TLC_MAX_BATCH_TOKENS", params.max_batch_tokens.to_string()),
        ("TLC_MAX_CONCURRENT", params.max_concurrent_requests.to_string()),
        ("TLC_MAX_INPUT_LEN", params.max_input_len.to_string()),
        ("TLC_MAX_OUTPUT_LEN", params.max_output_len.to_string()),
        ("TLC_QUEUE_ORDER", params.queue_order.as_str().to_string()),
    ]
}

fn print_params(params: &InitParams) {
    for (key, value) in env_pairs(params) {
        println!("{key}={value}");
    }
}
