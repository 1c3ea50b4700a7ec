//! Request queue management.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use super::admission::{AdmissionController, AdmissionPermit};
use super::priority::{PriorityQueue, QueueOrder};
use crate::error::ExecutorError;
use crate::request::{Request, RequestId};
use crate::telemetry;

/// An accepted request waiting for the scheduler.
pub struct QueuedRequest {
    pub id: RequestId,
    pub request: Request,
    pub enqueued_at: Instant,
    cancelled: Arc<AtomicBool>,
    permit: AdmissionPermit,
}

impl std::fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("id", &self.id)
            .field("client_id", &self.request.client_id)
            .field("tokens", &self.request.tokens.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl QueuedRequest {
    /// Check if the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Split into the request, its cancel flag and its admission permit.
    pub(crate) fn into_parts(self) -> (RequestId, Request, Arc<AtomicBool>, AdmissionPermit) {
        (self.id, self.request, self.cancelled, self.permit)
    }
}

struct QueueState {
    pending: PriorityQueue<QueuedRequest>,
    closed: bool,
}

/// Thread-safe request queue.
///
/// Many producers push; the scheduler is the single consumer. Admission is
/// checked under the queue lock, so a closed queue never accepts a request
/// the scheduler would not see.
pub struct RequestQueue {
    state: Mutex<QueueState>,
    /// Signalled when work arrives or the queue closes.
    work: Condvar,
    admission: AdmissionController,
    next_id: AtomicU64,
    /// Cancel flags of every live request, queued or in flight.
    cancels: DashMap<RequestId, Arc<AtomicBool>>,
}

impl RequestQueue {
    pub fn new(order: QueueOrder, admission: AdmissionController) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: PriorityQueue::new(order),
                closed: false,
            }),
            work: Condvar::new(),
            admission,
            next_id: AtomicU64::new(1),
            cancels: DashMap::new(),
        }
    }

    /// Admit and enqueue a request.
    pub fn push(&self, request: Request) -> Result<RequestId, ExecutorError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ExecutorError::NotInitialized);
        }
        let permit = self.admission.try_admit()?;

        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancelled = Arc::new(AtomicBool::new(false));
        self.cancels.insert(id, Arc::clone(&cancelled));
        let priority = request.params.priority;
        state.pending.push(
            QueuedRequest {
                id,
                request,
                enqueued_at: Instant::now(),
                cancelled,
                permit,
            },
            priority,
        );
        telemetry::record_queue_depth(state.pending.len());
        drop(state);

        self.work.notify_one();
        Ok(id)
    }

    /// Pop the next request in scheduling order.
    pub fn pop_next(&self) -> Option<QueuedRequest> {
        self.pop_next_if(|_| true)
    }

    /// Pop the head only if `admit` accepts it. The head stays queued
    /// otherwise, so ordering is preserved.
    pub fn pop_next_if(&self, admit: impl FnOnce(&QueuedRequest) -> bool) -> Option<QueuedRequest> {
        let mut state = self.state.lock();
        if !admit(state.pending.peek()?) {
            return None;
        }
        let next = state.pending.pop();
        telemetry::record_queue_depth(state.pending.len());
        next
    }

    /// Remove requests cancelled while still queued.
    pub fn take_cancelled(&self) -> Vec<QueuedRequest> {
        let mut state = self.state.lock();
        let taken = state.pending.extract_if(QueuedRequest::is_cancelled);
        if !taken.is_empty() {
            telemetry::record_queue_depth(state.pending.len());
        }
        taken
    }

    /// Park until the queue has work or is closed. Returns false once closed.
    pub fn wait_for_work(&self) -> bool {
        let mut state = self.state.lock();
        while state.pending.is_empty() && !state.closed {
            self.work.wait(&mut state);
        }
        !state.closed
    }

    /// Wake a parked scheduler.
    pub fn notify(&self) {
        self.work.notify_all();
    }

    /// Refuse further pushes and wake the scheduler. Queued requests stay
    /// put for the scheduler to finalize.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.admission.close();
        drop(state);
        self.work.notify_all();
    }

    /// Refuse further pushes and hand back everything still queued.
    pub fn close_and_drain(&self) -> Vec<QueuedRequest> {
        let mut state = self.state.lock();
        state.closed = true;
        self.admission.close();
        let drained = state.pending.drain();
        telemetry::record_queue_depth(0);
        drop(state);

        self.work.notify_all();
        drained
    }

    /// Flag a live request as cancelled. Returns false for unknown or retired ids.
    pub fn cancel(&self, id: RequestId) -> bool {
        let Some(flag) = self.cancels.get(&id).map(|f| Arc::clone(f.value())) else {
            return false;
        };
        flag.store(true, Ordering::Release);
        self.notify();
        true
    }

    /// Drop the cancel handle of a retired request.
    pub(crate) fn forget(&self, id: RequestId) {
        self.cancels.remove(&id);
    }

    /// Number of live requests that can still be cancelled.
    pub fn tracked(&self) -> usize {
        self.cancels.len()
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Current queue length.
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Check if queue is empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
