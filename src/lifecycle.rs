//! Executor lifecycle state machine.
//!
//! `Uninitialized → Initialized → Shutdown`. Shutdown is terminal and is
//! reached either by an explicit call or by a systemic generator failure.

use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Lifecycle states of an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorState {
    Uninitialized,
    Initialized,
    Shutdown,
}

/// Shared lifecycle of one executor instance.
///
/// The cancellation token fires on the transition to `Shutdown` and is what
/// the scheduler loop watches.
#[derive(Debug)]
pub struct Lifecycle {
    state: RwLock<ExecutorState>,
    token: CancellationToken,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ExecutorState::Uninitialized),
            token: CancellationToken::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> ExecutorState {
        *self.state.read()
    }

    /// Check if the executor accepts calls.
    pub fn is_running(&self) -> bool {
        self.state() == ExecutorState::Initialized
    }

    pub fn is_shutdown(&self) -> bool {
        self.state() == ExecutorState::Shutdown
    }

    /// `Uninitialized → Initialized`. Returns false from any other state.
    pub fn mark_initialized(&self) -> bool {
        let mut state = self.state.write();
        if *state != ExecutorState::Uninitialized {
            return false;
        }
        *state = ExecutorState::Initialized;
        true
    }

    /// Move to `Shutdown` and fire the token. Returns true only for the call
    /// that performed the transition.
    pub fn begin_shutdown(&self) -> bool {
        let mut state = self.state.write();
        if *state == ExecutorState::Shutdown {
            return false;
        }
        *state = ExecutorState::Shutdown;
        drop(state);
        self.token.cancel();
        true
    }

    /// Token cancelled on shutdown.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
