//! `run` subcommand: drive a local executor and stream responses.
//!
//! Each response is printed to stdout as one JSON line. Ctrl-C shuts the
//! executor down; requests still running come back `Cancelled`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::{config_cmd, EXIT_CONFIG_ERROR};
use crate::engine::{SyntheticConfig, SyntheticLoader};
use crate::request::{Request, RequestParams, TokenId};
use crate::Executor;

/// Options accepted by `run`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub tokens: Vec<TokenId>,
    pub max_new_tokens: usize,
    pub requests: usize,
    pub temperature: f32,
    /// Overrides the engine path from the environment or config file.
    pub engine: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            tokens: vec![1, 2, 3],
            max_new_tokens: 16,
            requests: 1,
            temperature: 0.0,
            engine: None,
            config_file: None,
        }
    }
}

/// Argument errors for `run`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunOptionsError {
    #[error("Missing value for {0}")]
    MissingValue(String),
    #[error("Invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },
    #[error("Unknown option: {0}")]
    UnknownOption(String),
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, RunOptionsError> {
    value.trim().parse().map_err(|_| RunOptionsError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    })
}

impl RunOptions {
    /// Parse the arguments following `run`.
    pub fn parse(args: &[String]) -> Result<Self, RunOptionsError> {
        let mut opts = Self::default();
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            let value = args
                .get(i + 1)
                .map(String::as_str)
                .ok_or_else(|| RunOptionsError::MissingValue(flag.to_string()));
            match flag {
                "--tokens" => {
                    opts.tokens = value?
                        .split(',')
                        .filter(|t| !t.trim().is_empty())
                        .map(|t| parse_value(flag, t))
                        .collect::<Result<_, _>>()?;
                }
                "--max-new-tokens" => opts.max_new_tokens = parse_value(flag, value?)?,
                "--requests" => opts.requests = parse_value(flag, value?)?,
                "--temperature" => opts.temperature = parse_value(flag, value?)?,
                "--engine" => opts.engine = Some(PathBuf::from(value?)),
                "--file" => opts.config_file = Some(PathBuf::from(value?)),
                other => return Err(RunOptionsError::UnknownOption(other.to_string())),
            }
            i += 2;
        }
        Ok(opts)
    }

    fn request(&self, client_id: u64) -> Request {
        let params = RequestParams {
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
            ..RequestParams::default()
        };
        Request::new(self.tokens.clone(), params, client_id)
    }
}

/// Run the command. Returns the process exit code.
pub async fn run(opts: RunOptions) -> i32 {
    let mut params = match config_cmd::load(opts.config_file.as_deref()) {
        Ok(params) => params,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return EXIT_CONFIG_ERROR;
        }
    };
    if let Some(engine) = &opts.engine {
        params.engine_path = engine.clone();
    }

    let executor = match Executor::init(params, SyntheticLoader::new(SyntheticConfig::default())) {
        Ok(executor) => executor,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return EXIT_CONFIG_ERROR;
        }
    };

    let mut pending = HashSet::new();
    for client_id in 0..opts.requests as u64 {
        match executor.enqueue(opts.request(client_id)) {
            Ok(id) => {
                pending.insert(id);
            }
            Err(e) => {
                eprintln!("ERROR: request {client_id} rejected: {e}");
                return 1;
            }
        }
    }
    info!(requests = pending.len(), "requests enqueued");

    let mut interrupted = false;
    while !pending.is_empty() {
        let batch = tokio::select! {
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                warn!("interrupted, shutting down");
                interrupted = true;
                tokio::task::block_in_place(|| executor.shutdown());
                continue;
            }
            batch = executor.await_responses_async(Some(Duration::from_millis(250))) => batch,
        };
        let responses = match batch {
            Ok(responses) => responses,
            Err(e) => {
                eprintln!("ERROR: {e}");
                return 1;
            }
        };
        for response in responses {
            if response.is_request_final {
                pending.remove(&response.request_id);
            }
            match serde_json::to_string(&response) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "failed to encode response"),
            }
        }
    }

    tokio::task::block_in_place(|| executor.shutdown());
    if interrupted {
        130
    } else {
        0
    }
}
