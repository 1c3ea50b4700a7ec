//! Batch membership policy.

use super::queue::QueuedRequest;
use super::sequence::SequenceState;

/// Limits on what one generation step may carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub max_batch_size: usize,
    /// Cap on prompt plus generated tokens summed over the batch.
    pub max_total_tokens: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 8,
            max_total_tokens: 4096,
        }
    }
}

/// Decides which queued requests join the running batch.
///
/// Admission is head-of-line: if the next queued request does not fit, later
/// ones wait too, so queue order is never violated. An empty batch always
/// takes the head so oversized requests cannot stall the queue.
#[derive(Debug, Clone)]
pub struct BatchPolicy {
    config: BatchConfig,
}

impl BatchPolicy {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Whether the batch has a free sequence slot.
    pub fn has_room(&self, active: &[SequenceState]) -> bool {
        active.len() < self.config.max_batch_size
    }

    /// Check if `candidate` can join `active`.
    pub fn can_admit(&self, active: &[SequenceState], candidate: &QueuedRequest) -> bool {
        if active.is_empty() {
            return true;
        }
        if !self.has_room(active) {
            return false;
        }
        let in_use: usize = active.iter().map(SequenceState::context_len).sum();
        in_use + candidate.request.tokens.len() <= self.config.max_total_tokens
    }
}
