//! Admission control for live requests.
//!
//! A request is live from the moment it is admitted until its final response
//! has been published. Admission hands out an RAII permit that travels with
//! the request and releases the slot when dropped.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::ExecutorError;

/// Shared counters behind the controller and its permits.
#[derive(Debug)]
struct AdmissionInner {
    max_live: usize,
    live: AtomicUsize,
    open: AtomicBool,
}

/// Bounds the number of live requests.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    inner: Arc<AdmissionInner>,
}

impl AdmissionController {
    pub fn new(max_live: usize) -> Self {
        Self {
            inner: Arc::new(AdmissionInner {
                max_live: max_live.max(1),
                live: AtomicUsize::new(0),
                open: AtomicBool::new(true),
            }),
        }
    }

    /// Advisory capacity check. A later `try_admit` may still fail if another
    /// caller took the last slot in between.
    pub fn can_enqueue(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
            && self.inner.live.load(Ordering::Acquire) < self.inner.max_live
    }

    /// Atomically reserve a slot.
    pub fn try_admit(&self) -> Result<AdmissionPermit, ExecutorError> {
        let inner = &self.inner;
        if !inner.open.load(Ordering::Acquire) {
            return Err(ExecutorError::NotInitialized);
        }
        inner
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < inner.max_live).then_some(live + 1)
            })
            .map_err(|live| ExecutorError::CapacityExceeded {
                live,
                max: inner.max_live,
            })?;
        Ok(AdmissionPermit {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Refuse all further admissions.
    pub fn close(&self) {
        self.inner.open.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Current number of live requests.
    pub fn live(&self) -> usize {
        self.inner.live.load(Ordering::Acquire)
    }

    pub fn max_live(&self) -> usize {
        self.inner.max_live
    }
}

/// RAII guard for one admission slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    inner: Arc<AdmissionInner>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.inner.live.fetch_sub(1, Ordering::AcqRel);
    }
}
