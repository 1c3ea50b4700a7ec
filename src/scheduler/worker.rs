//! Scheduler loop: claim queued requests, step the generator, publish.
//!
//! Runs on one dedicated thread and is the only writer of `SequenceState`.
//! Callers only ever see owned `Response` copies through the buffer.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use super::batch::BatchPolicy;
use super::queue::RequestQueue;
use super::sequence::SequenceState;
use crate::engine::{Generator, SequenceView, StepOutput};
use crate::error::{FatalExecutorError, ResponseError};
use crate::lifecycle::Lifecycle;
use crate::request::RequestId;
use crate::response::{FinishReason, ResponseBuffer};
use crate::telemetry;

/// Name given to the scheduler thread.
pub const SCHEDULER_THREAD_NAME: &str = "tlc-scheduler";

/// Drives generation for one executor.
pub struct Scheduler<G: Generator> {
    executor_id: Uuid,
    queue: Arc<RequestQueue>,
    buffer: Arc<ResponseBuffer>,
    lifecycle: Arc<Lifecycle>,
    policy: BatchPolicy,
    generator: G,
    active: Vec<SequenceState>,
    /// Set once a `release` call panics; the generator is not asked to
    /// release anything after that.
    release_failure: Option<FatalExecutorError>,
    poisoned: bool,
}

impl<G: Generator + 'static> Scheduler<G> {
    pub fn new(
        executor_id: Uuid,
        queue: Arc<RequestQueue>,
        buffer: Arc<ResponseBuffer>,
        lifecycle: Arc<Lifecycle>,
        policy: BatchPolicy,
        generator: G,
    ) -> Self {
        Self {
            executor_id,
            queue,
            buffer,
            lifecycle,
            policy,
            generator,
            active: Vec::new(),
            release_failure: None,
            poisoned: false,
        }
    }

    /// Run the loop on a dedicated thread.
    ///
    /// On failure the generator is dropped with the unstarted scheduler.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(SCHEDULER_THREAD_NAME.to_string())
            .spawn(move || self.run())
    }

    /// Loop until shutdown or a systemic failure. Every request still live
    /// when the loop ends gets a final response before the buffer closes.
    pub fn run(mut self) {
        let span = info_span!("executor", id = %self.executor_id);
        let _enter = span.enter();
        info!(max_batch_size = self.policy.config().max_batch_size, "scheduler started");

        while !self.lifecycle.is_cancelled() {
            self.retire_cancelled_queued();
            self.admit();

            let stepped = if self.active.is_empty() {
                Ok(())
            } else {
                self.step()
            };
            if let Err(fatal) = stepped.and_then(|()| self.take_release_failure()) {
                self.fail_all(fatal);
                return;
            }

            if self.active.is_empty() && !self.queue.wait_for_work() {
                break;
            }
        }

        self.cancel_all();
    }

    /// Move queued requests into the batch while the policy allows.
    fn admit(&mut self) {
        while self.policy.has_room(&self.active) {
            let policy = &self.policy;
            let active = &self.active;
            let Some(next) = self.queue.pop_next_if(|r| policy.can_admit(active, r)) else {
                break;
            };
            debug!(
                request_id = %next.id,
                queued_ms = next.enqueued_at.elapsed().as_millis() as u64,
                "request admitted to batch"
            );
            self.active.push(SequenceState::new(next));
        }
    }

    /// One generation step over the active batch.
    fn step(&mut self) -> Result<(), FatalExecutorError> {
        self.retire_cancelled_active();
        if self.active.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        let outputs = self.invoke_generator()?;

        let mut responses = Vec::with_capacity(outputs.len());
        for (state, output) in self.active.iter_mut().zip(outputs) {
            let response = match output {
                Ok(tokens) => state.advance(&tokens),
                Err(e) => {
                    warn!(request_id = %state.request_id(), error = %e, "sequence failed");
                    state.fail(ResponseError::Generation(e))
                }
            };
            responses.extend(response);
        }

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        telemetry::record_step(self.active.len(), latency_ms);
        debug!(
            batch = self.active.len(),
            published = responses.len(),
            latency_ms,
            "step complete"
        );

        self.buffer.publish_all(responses);
        self.retire_finished();
        Ok(())
    }

    /// Call the generator, converting panics and malformed results into
    /// systemic failures.
    fn invoke_generator(&mut self) -> Result<Vec<StepOutput>, FatalExecutorError> {
        let views: Vec<SequenceView<'_>> = self.active.iter().map(SequenceState::view).collect();
        let generator = &mut self.generator;
        let outputs = panic::catch_unwind(AssertUnwindSafe(|| generator.step(&views)))
            .map_err(|payload| FatalExecutorError::Panicked(panic_message(payload.as_ref())))??;

        if outputs.len() != views.len() {
            return Err(FatalExecutorError::ContractViolation(format!(
                "step returned {} outputs for {} sequences",
                outputs.len(),
                views.len()
            )));
        }
        Ok(outputs)
    }

    /// Finalize requests cancelled while still queued.
    fn retire_cancelled_queued(&mut self) {
        let cancelled: Vec<SequenceState> = self
            .queue
            .take_cancelled()
            .into_iter()
            .map(SequenceState::new)
            .collect();
        self.finalize(cancelled, |s| s.finish(FinishReason::Cancelled));
    }

    /// Finalize in-flight requests whose cancel flag is set.
    fn retire_cancelled_active(&mut self) {
        if !self.active.iter().any(SequenceState::is_cancelled) {
            return;
        }
        let (cancelled, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(SequenceState::is_cancelled);
        self.active = running;
        self.finalize(cancelled, |s| s.finish(FinishReason::Cancelled));
    }

    fn retire_finished(&mut self) {
        let (done, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(SequenceState::is_request_final);
        self.active = running;
        for state in done {
            self.retire(state);
        }
    }

    /// Publish a final response for each state, then retire them all.
    fn finalize(
        &mut self,
        mut states: Vec<SequenceState>,
        mut close: impl FnMut(&mut SequenceState) -> Option<crate::response::Response>,
    ) {
        if states.is_empty() {
            return;
        }
        let responses: Vec<_> = states.iter_mut().filter_map(&mut close).collect();
        self.buffer.publish_all(responses);
        for state in states {
            self.retire(state);
        }
    }

    /// Release per-request resources. Dropping the state frees its
    /// admission slot, after its final response is already visible.
    fn retire(&mut self, state: SequenceState) {
        let id = state.request_id();
        if !self.poisoned {
            if let Err(fatal) = self.release_generator(id) {
                error!(request_id = %id, error = %fatal, "generator release failed");
                self.poisoned = true;
                self.release_failure = Some(fatal);
            }
        }
        self.queue.forget(id);

        let reason = state.finish_reason().unwrap_or(FinishReason::Cancelled);
        let latency_ms = state.started_at().elapsed().as_millis() as u64;
        telemetry::record_finished(reason, state.generated().len(), latency_ms);
        debug!(
            request_id = %id,
            reason = reason.as_str(),
            tokens = state.generated().len(),
            "request finalized"
        );
    }

    fn release_generator(&mut self, id: RequestId) -> Result<(), FatalExecutorError> {
        let generator = &mut self.generator;
        panic::catch_unwind(AssertUnwindSafe(|| generator.release(id)))
            .map_err(|payload| FatalExecutorError::Panicked(panic_message(payload.as_ref())))
    }

    fn take_release_failure(&mut self) -> Result<(), FatalExecutorError> {
        self.release_failure.take().map_or(Ok(()), Err)
    }

    /// Everything still live, with the queue closed to new requests.
    fn take_all_live(&mut self) -> Vec<SequenceState> {
        let mut states = std::mem::take(&mut self.active);
        states.extend(self.queue.close_and_drain().into_iter().map(SequenceState::new));
        states
    }

    fn cancel_all(&mut self) {
        let states = self.take_all_live();
        info!(in_flight = states.len(), "scheduler stopping, cancelling live requests");
        self.finalize(states, |s| s.finish(FinishReason::Cancelled));
        self.stop();
    }

    fn fail_all(&mut self, fatal: FatalExecutorError) {
        error!(error = %fatal, "generator failed, shutting executor down");
        self.lifecycle.begin_shutdown();
        let states = self.take_all_live();
        let error = ResponseError::Fatal(fatal);
        self.finalize(states, |s| s.fail(error.clone()));
        self.stop();
    }

    fn stop(&mut self) {
        let generator = &mut self.generator;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| generator.shutdown())) {
            error!(panic = %panic_message(payload.as_ref()), "generator shutdown panicked");
        }
        self.buffer.close();
        info!("scheduler stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
