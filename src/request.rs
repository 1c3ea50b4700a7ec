//! Request types accepted by the executor.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::InitParams;
use crate::error::ExecutorError;

/// Vocabulary token identifier.
pub type TokenId = u32;

/// Executor-assigned identifier returned by a successful enqueue.
///
/// Ids come from a per-executor monotonic counter starting at 1 and are never
/// reused by the same executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generation parameters for a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    /// Upper bound on generated tokens. Must be at least 1.
    pub max_new_tokens: usize,
    /// Sampling temperature. 0.0 means greedy.
    pub temperature: f32,
    /// End-of-sequence token. Generation stops when it is produced; the token
    /// itself is not emitted.
    pub end_id: Option<TokenId>,
    /// Scheduling priority, lower runs first. Ignored by FIFO queues.
    pub priority: u8,
}

impl Default for RequestParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 16,
            temperature: 0.0,
            end_id: None,
            priority: 0,
        }
    }
}

impl RequestParams {
    pub fn with_max_new_tokens(max_new_tokens: usize) -> Self {
        Self {
            max_new_tokens,
            ..Default::default()
        }
    }
}

/// A generation request. Immutable once accepted by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Prompt tokens, in order.
    pub tokens: Vec<TokenId>,
    pub params: RequestParams,
    /// Caller correlation id, echoed on every response.
    pub client_id: u64,
}

impl Request {
    pub fn new(tokens: Vec<TokenId>, params: RequestParams, client_id: u64) -> Self {
        Self {
            tokens,
            params,
            client_id,
        }
    }

    /// Number of prompt tokens.
    pub fn num_tokens(&self) -> usize {
        self.tokens.len()
    }

    /// Check the request against the executor limits.
    pub fn validate(&self, limits: &InitParams) -> Result<(), ExecutorError> {
        if self.tokens.is_empty() {
            return Err(ExecutorError::InvalidRequest(
                "request has no input tokens".into(),
            ));
        }
        if self.tokens.len() > limits.max_input_len {
            return Err(ExecutorError::InvalidRequest(format!(
                "input has {} tokens (max {})",
                self.tokens.len(),
                limits.max_input_len
            )));
        }
        let params = &self.params;
        if params.max_new_tokens == 0 {
            return Err(ExecutorError::InvalidRequest(
                "max_new_tokens must be at least 1".into(),
            ));
        }
        if params.max_new_tokens > limits.max_output_len {
            return Err(ExecutorError::InvalidRequest(format!(
                "max_new_tokens {} exceeds limit {}",
                params.max_new_tokens, limits.max_output_len
            )));
        }
        if !params.temperature.is_finite() || params.temperature < 0.0 {
            return Err(ExecutorError::InvalidRequest(format!(
                "temperature must be a non-negative number, got {}",
                params.temperature
            )));
        }
        Ok(())
    }
}
