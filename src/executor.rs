//! The executor facade.
//!
//! An [`Executor`] owns one scheduler thread plus the queue and response
//! buffer it shares with callers. Any number of threads may enqueue and
//! await concurrently; the handle is `Send + Sync` and is usually shared
//! behind an `Arc`.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::InitParams;
use crate::engine::GeneratorLoader;
use crate::error::{ExecutorError, InitError};
use crate::lifecycle::{ExecutorState, Lifecycle};
use crate::request::{Request, RequestId};
use crate::response::{Response, ResponseBuffer};
use crate::scheduler::{AdmissionController, BatchPolicy, RequestQueue, Scheduler};
use crate::telemetry;

/// A running inference executor.
///
/// Created by [`Executor::init`], which either returns a fully running
/// instance or nothing. Dropping the handle shuts it down.
pub struct Executor {
    id: Uuid,
    params: InitParams,
    lifecycle: Arc<Lifecycle>,
    queue: Arc<RequestQueue>,
    buffer: Arc<ResponseBuffer>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("live_requests", &self.live_requests())
            .finish()
    }
}

impl Executor {
    /// Validate `params`, load a generator and start the scheduler thread.
    pub fn init<L: GeneratorLoader>(params: InitParams, loader: L) -> Result<Self, InitError> {
        params.validate()?;
        let generator = loader.load(&params)?;

        let id = Uuid::new_v4();
        let lifecycle = Arc::new(Lifecycle::new());
        let admission = AdmissionController::new(params.max_concurrent_requests);
        let queue = Arc::new(RequestQueue::new(params.queue_order, admission));
        let buffer = Arc::new(ResponseBuffer::new());

        let scheduler = Scheduler::new(
            id,
            Arc::clone(&queue),
            Arc::clone(&buffer),
            Arc::clone(&lifecycle),
            BatchPolicy::new(params.batch_config()),
            generator,
        );
        let handle = scheduler
            .spawn()
            .map_err(|e| InitError::ThreadSpawn(e.to_string()))?;
        lifecycle.mark_initialized();

        info!(
            executor_id = %id,
            engine = %params.engine_path.display(),
            max_batch_size = params.max_batch_size,
            max_concurrent = params.max_concurrent_requests,
            "executor initialized"
        );

        Ok(Self {
            id,
            params,
            lifecycle,
            queue,
            buffer,
            scheduler: Mutex::new(Some(handle)),
        })
    }

    /// Submit a request for generation.
    ///
    /// Never waits on the scheduler. Errors leave no trace: the request is
    /// not queued and will never produce responses.
    pub fn enqueue(&self, request: Request) -> Result<RequestId, ExecutorError> {
        let result = self.try_enqueue(request);
        match &result {
            Ok(_) => telemetry::record_enqueued(),
            Err(e) => {
                let reason = match e {
                    ExecutorError::CapacityExceeded { .. } => "capacity",
                    ExecutorError::InvalidRequest(_) => "invalid",
                    ExecutorError::NotInitialized => "not_initialized",
                };
                telemetry::record_rejected(reason);
                warn!(executor_id = %self.id, error = %e, "enqueue rejected");
            }
        }
        result
    }

    fn try_enqueue(&self, request: Request) -> Result<RequestId, ExecutorError> {
        if !self.lifecycle.is_running() {
            return Err(ExecutorError::NotInitialized);
        }
        request.validate(&self.params)?;
        self.queue.push(request)
    }

    /// Collect every response published since the last call.
    ///
    /// `Some(Duration::ZERO)` polls. `Some(t)` waits up to `t` for the first
    /// response. `None` waits until a response arrives or the executor shuts
    /// down. Once shut down, buffered responses are still handed out;
    /// `NotInitialized` is returned only when nothing is left.
    pub fn await_responses(&self, timeout: Option<Duration>) -> Result<Vec<Response>, ExecutorError> {
        let responses = self.buffer.drain(timeout);
        self.settle(responses)
    }

    /// Async form of [`await_responses`](Self::await_responses).
    pub async fn await_responses_async(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Vec<Response>, ExecutorError> {
        let responses = self.buffer.drain_async(timeout).await;
        self.settle(responses)
    }

    fn settle(&self, responses: Vec<Response>) -> Result<Vec<Response>, ExecutorError> {
        if !responses.is_empty() || !self.buffer.is_closed() {
            return Ok(responses);
        }
        // Publishes happen before close, so one more poll sees them all.
        let late = self.buffer.drain(Some(Duration::ZERO));
        if late.is_empty() {
            return Err(ExecutorError::NotInitialized);
        }
        Ok(late)
    }

    /// Advisory: true if an enqueue right now would not be refused for
    /// capacity.
    pub fn can_enqueue(&self) -> bool {
        self.lifecycle.is_running() && self.queue.admission().can_enqueue()
    }

    /// Ask the scheduler to stop a live request. It receives a final
    /// `Cancelled` response. Returns false if the id is unknown or already
    /// finalized.
    pub fn cancel(&self, request_id: RequestId) -> Result<bool, ExecutorError> {
        if !self.lifecycle.is_running() {
            return Err(ExecutorError::NotInitialized);
        }
        let cancelled = self.queue.cancel(request_id);
        if cancelled {
            info!(executor_id = %self.id, request_id = %request_id, "request cancelled");
        }
        Ok(cancelled)
    }

    /// Stop the executor and wait for the scheduler thread.
    ///
    /// Every live request is finalized `Cancelled` first. Safe to call more
    /// than once and from several threads; every caller returns only after
    /// the scheduler thread has exited. Awaiters blocked in
    /// `await_responses` are released.
    pub fn shutdown(&self) {
        if self.lifecycle.begin_shutdown() {
            info!(executor_id = %self.id, "executor shutting down");
        }
        self.queue.close();

        // Held across the join so later callers return only once the
        // scheduler has finished.
        let mut slot = self.scheduler.lock();
        let Some(handle) = slot.take() else {
            return;
        };
        if handle.join().is_err() {
            error!(executor_id = %self.id, "scheduler thread panicked");
            self.queue.close_and_drain();
            self.buffer.close();
        }
        info!(executor_id = %self.id, "executor shut down");
    }

    pub fn state(&self) -> ExecutorState {
        self.lifecycle.state()
    }

    /// Unique id of this instance, carried on its log spans.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Requests admitted but not yet finalized.
    pub fn live_requests(&self) -> usize {
        self.queue.admission().live()
    }

    /// Requests waiting for a batch slot.
    pub fn queued_requests(&self) -> usize {
        self.queue.len()
    }

    pub fn params(&self) -> &InitParams {
        &self.params
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
