//! The generation collaborator seam.
//!
//! The executor never runs a model itself. A [`Generator`] advances a batch of
//! sequences by one step and reports the tokens each produced; a
//! [`GeneratorLoader`] builds one from the executor's [`InitParams`].

use crate::config::InitParams;
use crate::error::{FatalExecutorError, GenerationError, InitError};
use crate::request::{RequestId, RequestParams, TokenId};

/// Borrowed view of one in-flight sequence for a single step.
#[derive(Debug, Clone, Copy)]
pub struct SequenceView<'a> {
    pub request_id: RequestId,
    pub prompt: &'a [TokenId],
    /// Tokens already emitted for this request.
    pub generated: &'a [TokenId],
    pub params: &'a RequestParams,
}

impl SequenceView<'_> {
    /// Prompt plus generated length.
    pub fn context_len(&self) -> usize {
        self.prompt.len() + self.generated.len()
    }

    /// Last token of the context, generated or prompt.
    pub fn last_token(&self) -> Option<TokenId> {
        self.generated.last().or_else(|| self.prompt.last()).copied()
    }
}

/// Per-sequence outcome of a step.
pub type StepOutput = Result<Vec<TokenId>, GenerationError>;

/// Steps batches of sequences.
///
/// `step` must return exactly one output per input sequence, in input order.
/// An output may hold zero or more tokens; the scheduler clips it to the
/// request's remaining budget and end token. A per-sequence `Err` finalizes
/// only that request. Returning `Err` from `step` itself means the
/// collaborator is unusable: every request fails and the executor shuts down.
pub trait Generator: Send {
    fn step(&mut self, batch: &[SequenceView<'_>]) -> Result<Vec<StepOutput>, FatalExecutorError>;

    /// Free per-sequence resources once a request is finalized.
    fn release(&mut self, _request_id: RequestId) {}

    /// Free collaborator resources. Called once, from the scheduler thread.
    fn shutdown(&mut self) {}
}

impl<G: Generator + ?Sized> Generator for Box<G> {
    fn step(&mut self, batch: &[SequenceView<'_>]) -> Result<Vec<StepOutput>, FatalExecutorError> {
        (**self).step(batch)
    }

    fn release(&mut self, request_id: RequestId) {
        (**self).release(request_id)
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}

/// Allocates a generator for a validated set of parameters.
pub trait GeneratorLoader {
    type Generator: Generator + 'static;

    fn load(&self, params: &InitParams) -> Result<Self::Generator, InitError>;
}

impl<F, G> GeneratorLoader for F
where
    F: Fn(&InitParams) -> Result<G, InitError>,
    G: Generator + 'static,
{
    type Generator = G;

    fn load(&self, params: &InitParams) -> Result<G, InitError> {
        self(params)
    }
}
