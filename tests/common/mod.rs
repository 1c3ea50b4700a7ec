//! Shared helpers for executor integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tlc_runtime::engine::{Generator, SequenceView, StepOutput};
use tlc_runtime::{
    Executor, FatalExecutorError, InitError, InitParams, Request, RequestId, RequestParams,
    Response, TokenId,
};

/// Parameters pointing at a throwaway engine artifact. Keep the `TempDir`
/// alive for as long as the executor runs.
pub fn params_with_engine() -> (TempDir, InitParams) {
    let dir = tempfile::tempdir().unwrap();
    let engine = dir.path().join("rank0.engine");
    std::fs::write(&engine, b"engine").unwrap();
    let params = InitParams {
        engine_path: engine,
        ..InitParams::default()
    };
    (dir, params)
}

pub fn request(tokens: Vec<TokenId>, max_new_tokens: usize) -> Request {
    Request::new(tokens, RequestParams::with_max_new_tokens(max_new_tokens), 0)
}

/// Successor-token generator that sleeps every step, so requests stay live
/// long enough to observe.
pub struct Stalling {
    pub delay: Duration,
}

impl Generator for Stalling {
    fn step(&mut self, batch: &[SequenceView<'_>]) -> Result<Vec<StepOutput>, FatalExecutorError> {
        std::thread::sleep(self.delay);
        Ok(batch
            .iter()
            .map(|s| Ok(vec![s.last_token().unwrap_or(0) + 1]))
            .collect())
    }
}

pub fn stalling(_: &InitParams) -> Result<Stalling, InitError> {
    Ok(Stalling {
        delay: Duration::from_millis(5),
    })
}

/// Drain until every id in `ids` has its final response.
pub fn collect_final(executor: &Executor, ids: &[RequestId]) -> HashMap<RequestId, Vec<Response>> {
    let mut by_id = HashMap::new();
    collect_final_into(executor, ids, &mut by_id);
    by_id
}

/// Like [`collect_final`], adding to responses already seen.
pub fn collect_final_into(
    executor: &Executor,
    ids: &[RequestId],
    by_id: &mut HashMap<RequestId, Vec<Response>>,
) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let done = ids.iter().all(|id| {
            by_id
                .get(id)
                .is_some_and(|rs| rs.iter().any(|r| r.is_request_final))
        });
        if done {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for final responses");
        for r in executor
            .await_responses(Some(Duration::from_millis(50)))
            .unwrap()
        {
            by_id.entry(r.request_id).or_default().push(r);
        }
    }
}

/// Concatenate payload tokens in sequence-index order.
pub fn reconstruct(responses: &[Response]) -> Vec<TokenId> {
    let mut sorted: Vec<&Response> = responses.iter().collect();
    sorted.sort_by_key(|r| r.sequence_index);
    sorted.iter().flat_map(|r| r.tokens().to_vec()).collect()
}

/// Wait for `cond` to hold, polling.
pub fn eventually(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}
