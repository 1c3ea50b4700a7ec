//! Deterministic stand-in generator.
//!
//! Produces successor tokens of the context (`last + 1`, wrapping at the
//! vocabulary size). With a positive temperature the next token is drawn from
//! a per-request seeded RNG instead, so runs stay reproducible. Used by the CLI,
//! benchmarks and tests where no real engine is available.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::generator::{Generator, GeneratorLoader, SequenceView, StepOutput};
use crate::config::InitParams;
use crate::error::{FatalExecutorError, InitError};
use crate::request::{RequestId, TokenId};

/// Behaviour of the synthetic generator.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub vocab_size: u32,
    /// Tokens produced per sequence per step.
    pub tokens_per_step: usize,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            vocab_size: 32_000,
            tokens_per_step: 1,
            seed: 0x5eed,
        }
    }
}

/// Synthetic generator holding one RNG per sampled sequence.
#[derive(Debug)]
pub struct SyntheticGenerator {
    config: SyntheticConfig,
    rngs: HashMap<RequestId, StdRng>,
    steps: u64,
}

impl SyntheticGenerator {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config: SyntheticConfig {
                vocab_size: config.vocab_size.max(1),
                tokens_per_step: config.tokens_per_step.max(1),
                ..config
            },
            rngs: HashMap::new(),
            steps: 0,
        }
    }

    /// Steps taken so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Tokens a greedy run would produce after `prompt`.
    pub fn expected_greedy(prompt: &[TokenId], vocab_size: u32, count: usize) -> Vec<TokenId> {
        let mut last = prompt.last().copied().unwrap_or(0);
        (0..count)
            .map(|_| {
                last = successor(last, vocab_size.max(1));
                last
            })
            .collect()
    }

    fn advance(&mut self, seq: &SequenceView<'_>) -> Vec<TokenId> {
        let vocab = self.config.vocab_size;
        let mut last = seq.last_token().unwrap_or(0);
        let mut out = Vec::with_capacity(self.config.tokens_per_step);
        for _ in 0..self.config.tokens_per_step {
            last = if seq.params.temperature > 0.0 {
                let seed = self.config.seed ^ seq.request_id.0;
                let rng = self
                    .rngs
                    .entry(seq.request_id)
                    .or_insert_with(|| StdRng::seed_from_u64(seed));
                rng.gen_range(0..vocab)
            } else {
                successor(last, vocab)
            };
            out.push(last);
        }
        out
    }
}

/// Next token inside the vocabulary. Never overflows, whatever `last` is.
fn successor(last: TokenId, vocab: u32) -> TokenId {
    (last % vocab + 1) % vocab
}

impl Generator for SyntheticGenerator {
    fn step(&mut self, batch: &[SequenceView<'_>]) -> Result<Vec<StepOutput>, FatalExecutorError> {
        self.steps += 1;
        Ok(batch.iter().map(|seq| Ok(self.advance(seq))).collect())
    }

    fn release(&mut self, request_id: RequestId) {
        self.rngs.remove(&request_id);
    }

    fn shutdown(&mut self) {
        debug!(steps = self.steps, "synthetic generator shut down");
        self.rngs.clear();
    }
}

/// Loader producing [`SyntheticGenerator`]s.
#[derive(Debug, Clone, Default)]
pub struct SyntheticLoader {
    pub config: SyntheticConfig,
}

impl SyntheticLoader {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }
}

impl GeneratorLoader for SyntheticLoader {
    type Generator = SyntheticGenerator;

    fn load(&self, params: &InitParams) -> Result<SyntheticGenerator, InitError> {
        if params.engine_path.is_dir() {
            return Err(InitError::ResourceAllocation(format!(
                "engine path {} is a directory",
                params.engine_path.display()
            )));
        }
        Ok(SyntheticGenerator::new(self.config.clone()))
    }
}
