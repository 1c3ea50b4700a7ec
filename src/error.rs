//! Error types for the executor.
//!
//! Construction and admission failures are returned from the call that caused
//! them. Once a request is accepted, its failures travel through the response
//! stream as [`ResponseError`] and never escape `await_responses`.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors raised while bringing an executor up. The executor is never
/// returned when one of these occurs.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Engine artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("Resource allocation failed: {0}")]
    ResourceAllocation(String),

    #[error("Failed to spawn scheduler thread: {0}")]
    ThreadSpawn(String),
}

/// Errors returned by facade calls on an initialized (or shut down) executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Capacity exceeded: {live}/{max} live requests")]
    CapacityExceeded { live: usize, max: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Executor is not initialized")]
    NotInitialized,
}

impl ExecutorError {
    /// Returns true if retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }
}

/// Failure of a single sequence during a generation step. Finalizes only the
/// affected request.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
pub enum GenerationError {
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Generation failed: {0}")]
    Failed(String),
}

/// Failure of the generation collaborator as a whole. Every in-flight request
/// is finalized with this error and the executor shuts down.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
pub enum FatalExecutorError {
    #[error("Compute device lost: {0}")]
    DeviceLost(String),

    #[error("Generator contract violated: {0}")]
    ContractViolation(String),

    #[error("Generator panicked: {0}")]
    Panicked(String),
}

/// Error carried by a [`Response`](crate::response::Response).
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
pub enum ResponseError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Fatal(#[from] FatalExecutorError),
}

impl ResponseError {
    /// Returns true if the whole executor failed, not just this request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}
