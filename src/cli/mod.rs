//! CLI subcommands for the `tlc-cli` binary.
//!
//! ## Usage
//!
//! ```bash
//! tlc-cli run --tokens 1,2,3 --max-new-tokens 8   # stream JSON responses
//! tlc-cli config show                              # effective parameters
//! tlc-cli config validate --file tlc.toml          # check a parameter file
//! ```

pub mod config_cmd;
pub mod run_cmd;

pub use run_cmd::{RunOptions, RunOptionsError};

/// Exit code for a configuration problem.
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Value following `flag` in `args`, if present.
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}
