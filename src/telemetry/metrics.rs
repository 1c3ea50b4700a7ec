//! Executor metrics via the `metrics` facade.
//!
//! Nothing is exported unless the embedding process installs a recorder.

use ::metrics::{counter, gauge, histogram};

use crate::response::FinishReason;

/// Record an accepted request.
pub fn record_enqueued() {
    counter!("tlc_requests_enqueued_total").increment(1);
}

/// Record a rejected enqueue. `reason` is a short static label.
pub fn record_rejected(reason: &'static str) {
    counter!("tlc_requests_rejected_total", "reason" => reason).increment(1);
}

/// Record a request reaching its final response.
pub fn record_finished(reason: FinishReason, tokens: usize, latency_ms: u64) {
    counter!("tlc_requests_finished_total", "reason" => reason.as_str()).increment(1);
    counter!("tlc_tokens_generated_total").increment(tokens as u64);
    histogram!("tlc_request_latency_ms").record(latency_ms as f64);
}

/// Record one generation step.
pub fn record_step(batch_size: usize, latency_ms: f64) {
    histogram!("tlc_step_batch_size").record(batch_size as f64);
    histogram!("tlc_step_latency_ms").record(latency_ms);
}

/// Record current queue depth.
pub fn record_queue_depth(depth: usize) {
    gauge!("tlc_queue_depth").set(depth as f64);
}
