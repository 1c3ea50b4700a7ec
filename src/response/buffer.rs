//! Thread-safe staging area between the scheduler and callers.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use super::Response;

#[derive(Default)]
struct BufferState {
    responses: Vec<Response>,
    closed: bool,
}

/// Accumulates published responses until a caller drains them.
///
/// Responses come out in publish order, so each request's chunks keep their
/// sequence order within one drain and across successive drains. Closing
/// wakes every waiter; later drains still return whatever is buffered.
#[derive(Default)]
pub struct ResponseBuffer {
    state: Mutex<BufferState>,
    available: Condvar,
    /// Wakes async waiters alongside the condvar.
    notify: Notify,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage one response.
    pub fn publish(&self, response: Response) {
        self.publish_all(vec![response]);
    }

    /// Stage a step's worth of responses under a single lock.
    pub fn publish_all(&self, responses: Vec<Response>) {
        if responses.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        state.responses.extend(responses);
        drop(state);
        self.wake();
    }

    /// Take everything buffered.
    ///
    /// `Some(Duration::ZERO)` never blocks. `Some(t)` waits up to `t` for the
    /// first response. `None` waits until a response arrives or the buffer
    /// is closed.
    pub fn drain(&self, timeout: Option<Duration>) -> Vec<Response> {
        let mut state = self.state.lock();
        match timeout {
            Some(t) if t.is_zero() => {}
            Some(t) => {
                let deadline = Instant::now() + t;
                while state.responses.is_empty() && !state.closed {
                    if self.available.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
            }
            None => {
                while state.responses.is_empty() && !state.closed {
                    self.available.wait(&mut state);
                }
            }
        }
        std::mem::take(&mut state.responses)
    }

    /// Async counterpart of [`drain`](Self::drain) for tokio callers.
    pub async fn drain_async(&self, timeout: Option<Duration>) -> Vec<Response> {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                // Register before checking so a publish in between is not missed.
                notified.as_mut().enable();
                {
                    let mut state = self.state.lock();
                    if !state.responses.is_empty() || state.closed {
                        return std::mem::take(&mut state.responses);
                    }
                }
                notified.await;
            }
        };
        match timeout {
            Some(t) => match tokio::time::timeout(t, wait).await {
                Ok(responses) => responses,
                Err(_) => self.drain(Some(Duration::ZERO)),
            },
            None => wait.await,
        }
    }

    /// Wake all waiters permanently. Buffered responses stay drainable.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.wake();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of responses waiting to be drained.
    pub fn len(&self) -> usize {
        self.state.lock().responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().responses.is_empty()
    }

    fn wake(&self) {
        self.available.notify_all();
        self.notify.notify_waiters();
    }
}
