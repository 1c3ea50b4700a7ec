//! tlc-runtime
//!
//! An asynchronous executor for token-generation requests. Callers enqueue
//! tokenized prompts and drain streamed partial responses; a dedicated
//! scheduler thread batches live requests and drives a pluggable
//! [`Generator`](engine::Generator) one step at a time.
//!
//! # Lifecycle
//!
//! - [`init_default_params`] returns parameters with documented defaults
//! - [`Executor::init`] validates them, loads a generator and starts the
//!   scheduler
//! - [`Executor::enqueue`] / [`Executor::await_responses`] stream tokens
//! - [`Executor::shutdown`] (or drop) finalizes everything still live as
//!   `Cancelled`
//!
//! ```no_run
//! use std::time::Duration;
//! use tlc_runtime::engine::{SyntheticConfig, SyntheticLoader};
//! use tlc_runtime::{init_default_params, Executor, Request, RequestParams};
//!
//! let executor = Executor::init(
//!     init_default_params(),
//!     SyntheticLoader::new(SyntheticConfig::default()),
//! )?;
//! let id = executor.enqueue(Request::new(vec![1, 2, 3], RequestParams::with_max_new_tokens(4), 0))?;
//! for response in executor.await_responses(Some(Duration::from_secs(1)))? {
//!     assert_eq!(response.request_id, id);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod request;
pub mod response;
pub mod scheduler;
pub mod telemetry;

pub use config::{init_default_params, ConfigError, InitParams};
pub use error::{ExecutorError, FatalExecutorError, GenerationError, InitError, ResponseError};
pub use executor::Executor;
pub use lifecycle::ExecutorState;
pub use request::{Request, RequestId, RequestParams, TokenId};
pub use response::{FinishReason, Response};
pub use scheduler::QueueOrder;
