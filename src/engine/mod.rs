//! Generation collaborator interface.
//!
//! Provides the `Generator` trait the scheduler drives, and a deterministic
//! synthetic implementation.

mod generator;
mod synthetic;

pub use generator::{Generator, GeneratorLoader, SequenceView, StepOutput};
pub use synthetic::{SyntheticConfig, SyntheticGenerator, SyntheticLoader};
