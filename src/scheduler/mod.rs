//! Request scheduling for the executor.
//!
//! Manages admission, queue ordering, per-request sequence state, batch
//! selection and the scheduler thread that drives the generator.

mod admission;
mod batch;
mod priority;
mod queue;
mod sequence;
mod worker;

pub use admission::{AdmissionController, AdmissionPermit};
pub use batch::{BatchConfig, BatchPolicy};
pub use priority::{PriorityQueue, QueueOrder};
pub use queue::{QueuedRequest, RequestQueue};
pub use sequence::SequenceState;
pub use worker::{Scheduler, SCHEDULER_THREAD_NAME};
