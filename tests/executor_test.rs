//! Integration tests for the executor facade.

mod common;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use common::{
    collect_final, collect_final_into, eventually, params_with_engine, reconstruct, request,
    stalling,
};
use tlc_runtime::engine::{
    Generator, SequenceView, StepOutput, SyntheticConfig, SyntheticGenerator, SyntheticLoader,
};
use tlc_runtime::{
    Executor, ExecutorError, ExecutorState, FatalExecutorError, FinishReason, GenerationError,
    InitError, InitParams, QueueOrder, Request, RequestParams, ResponseError,
};

fn synthetic() -> SyntheticLoader {
    SyntheticLoader::new(SyntheticConfig::default())
}

#[test]
fn five_token_prompt_with_budget_three_finishes_on_length() {
    let (_dir, params) = params_with_engine();
    let executor = Executor::init(params, synthetic()).unwrap();
    assert_eq!(executor.state(), ExecutorState::Initialized);

    let id = executor.enqueue(request(vec![1, 2, 3, 4, 5], 3)).unwrap();
    let by_id = collect_final(&executor, &[id]);
    let responses = &by_id[&id];

    let total: usize = responses.iter().map(|r| r.num_tokens()).sum();
    assert!(total <= 3);
    assert_eq!(
        reconstruct(responses),
        SyntheticGenerator::expected_greedy(&[1, 2, 3, 4, 5], 32_000, 3)
    );

    let indices: Vec<u32> = responses.iter().map(|r| r.sequence_index).collect();
    assert_eq!(indices, (0..responses.len() as u32).collect::<Vec<_>>());

    let last = responses.last().unwrap();
    assert!(last.is_request_final);
    assert!(last.is_sequence_final);
    assert_eq!(last.finish_reason, Some(FinishReason::Length));
    assert_eq!(responses.iter().filter(|r| r.is_request_final).count(), 1);
}

#[test]
fn back_to_back_requests_are_not_mixed_up() {
    let (_dir, params) = params_with_engine();
    let executor = Executor::init(params, synthetic()).unwrap();

    let a = executor
        .enqueue(Request::new(vec![100], RequestParams::with_max_new_tokens(4), 7))
        .unwrap();
    let b = executor
        .enqueue(Request::new(vec![900, 901], RequestParams::with_max_new_tokens(6), 8))
        .unwrap();
    assert_ne!(a, b);

    let by_id = collect_final(&executor, &[a, b]);
    assert_eq!(reconstruct(&by_id[&a]), vec![101, 102, 103, 104]);
    assert_eq!(reconstruct(&by_id[&b]), vec![902, 903, 904, 905, 906, 907]);
    assert!(by_id[&a].iter().all(|r| r.client_id == 7));
    assert!(by_id[&b].iter().all(|r| r.client_id == 8));
}

#[test]
fn out_of_vocab_prompt_token_is_served() {
    let (_dir, params) = params_with_engine();
    let executor = Executor::init(params, synthetic()).unwrap();

    let id = executor.enqueue(request(vec![u32::MAX], 2)).unwrap();
    let by_id = collect_final(&executor, &[id]);
    let last = by_id[&id].last().unwrap();
    assert_eq!(last.finish_reason, Some(FinishReason::Length));
    assert!(last.error().is_none());
    assert_eq!(
        reconstruct(&by_id[&id]),
        SyntheticGenerator::expected_greedy(&[u32::MAX], 32_000, 2)
    );
    assert_eq!(executor.state(), ExecutorState::Initialized);
}

#[test]
fn request_ids_start_at_one_per_executor() {
    let (_dir, params) = params_with_engine();
    let first = Executor::init(params.clone(), synthetic()).unwrap();
    let second = Executor::init(params, synthetic()).unwrap();
    assert_ne!(first.id(), second.id());

    let ids: Vec<_> = (0..3)
        .map(|_| first.enqueue(request(vec![1], 1)).unwrap())
        .collect();
    assert_eq!(ids.iter().map(|id| id.0).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(second.enqueue(request(vec![1], 1)).unwrap().0, 1);
}

#[test]
fn end_token_stops_generation_and_is_not_emitted() {
    let (_dir, params) = params_with_engine();
    let executor = Executor::init(params, synthetic()).unwrap();

    let params = RequestParams {
        max_new_tokens: 50,
        end_id: Some(13),
        ..RequestParams::default()
    };
    let id = executor.enqueue(Request::new(vec![10], params, 0)).unwrap();
    let by_id = collect_final(&executor, &[id]);

    assert_eq!(reconstruct(&by_id[&id]), vec![11, 12]);
    assert_eq!(
        by_id[&id].last().unwrap().finish_reason,
        Some(FinishReason::EndOfSequence)
    );
}

#[test]
fn several_tokens_per_step_respect_budget() {
    let (_dir, params) = params_with_engine();
    let loader = SyntheticLoader::new(SyntheticConfig {
        tokens_per_step: 4,
        ..SyntheticConfig::default()
    });
    let executor = Executor::init(params, loader).unwrap();

    let id = executor.enqueue(request(vec![0], 6)).unwrap();
    let by_id = collect_final(&executor, &[id]);
    assert_eq!(reconstruct(&by_id[&id]), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(by_id[&id].len(), 2);
}

#[test]
fn sampled_requests_are_reproducible() {
    let (_dir, params) = params_with_engine();
    let sampled = RequestParams {
        max_new_tokens: 8,
        temperature: 0.8,
        ..RequestParams::default()
    };

    let run = || {
        let executor = Executor::init(params.clone(), synthetic()).unwrap();
        let id = executor
            .enqueue(Request::new(vec![5], sampled.clone(), 0))
            .unwrap();
        reconstruct(&collect_final(&executor, &[id])[&id])
    };
    let first = run();
    assert_eq!(first.len(), 8);
    assert!(first.iter().all(|t| *t < 32_000));
    assert_eq!(first, run());
}

#[test]
fn at_capacity_enqueue_is_refused() {
    let (_dir, params) = params_with_engine();
    let params = InitParams {
        max_concurrent_requests: 2,
        ..params
    };
    let executor = Executor::init(params, stalling).unwrap();

    let a = executor.enqueue(request(vec![1], 1_000)).unwrap();
    let _b = executor.enqueue(request(vec![2], 1_000)).unwrap();
    assert!(!executor.can_enqueue());
    assert_eq!(executor.live_requests(), 2);
    assert_eq!(
        executor.enqueue(request(vec![3], 1)),
        Err(ExecutorError::CapacityExceeded { live: 2, max: 2 })
    );

    // A slot frees up once a request is finalized.
    assert!(executor.cancel(a).unwrap());
    collect_final(&executor, &[a]);
    eventually(|| executor.can_enqueue());
    assert!(executor.enqueue(request(vec![3], 1)).is_ok());
}

#[test]
fn invalid_requests_are_rejected_without_side_effects() {
    let (_dir, params) = params_with_engine();
    let params = InitParams {
        max_input_len: 4,
        max_output_len: 8,
        ..params
    };
    let executor = Executor::init(params, synthetic()).unwrap();

    let bad = [
        request(vec![], 1),
        request(vec![1], 0),
        request(vec![1, 2, 3, 4, 5], 1),
        request(vec![1], 9),
    ];
    for req in bad {
        assert!(matches!(
            executor.enqueue(req),
            Err(ExecutorError::InvalidRequest(_))
        ));
    }
    assert_eq!(executor.live_requests(), 0);
    assert!(executor
        .await_responses(Some(Duration::ZERO))
        .unwrap()
        .is_empty());

    // Rejections do not consume ids.
    assert_eq!(executor.enqueue(request(vec![1], 1)).unwrap().0, 1);
}

#[test]
fn zero_timeout_never_blocks() {
    let (_dir, params) = params_with_engine();
    let executor = Executor::init(params, stalling).unwrap();
    executor.enqueue(request(vec![1], 1_000)).unwrap();

    for _ in 0..20 {
        let started = Instant::now();
        let _ = executor.await_responses(Some(Duration::ZERO)).unwrap();
        assert!(started.elapsed() < Duration::from_millis(50));
    }
}

#[test]
fn bounded_wait_times_out_when_idle() {
    let (_dir, params) = params_with_engine();
    let executor = Executor::init(params, synthetic()).unwrap();

    let started = Instant::now();
    let responses = executor
        .await_responses(Some(Duration::from_millis(30)))
        .unwrap();
    assert!(responses.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(25));
}

#[test]
fn priority_queue_order_is_respected() {
    let (_dir, params) = params_with_engine();
    let params = InitParams {
        max_batch_size: 1,
        queue_order: QueueOrder::Priority,
        ..params
    };
    let executor = Executor::init(params, stalling).unwrap();

    // Occupy the only batch slot until the rest are queued.
    let blocker = executor.enqueue(request(vec![1], 1_000)).unwrap();
    eventually(|| executor.queued_requests() == 0 && executor.live_requests() == 1);

    let prioritized = |priority: u8, client_id: u64| {
        let params = RequestParams {
            max_new_tokens: 1,
            priority,
            ..RequestParams::default()
        };
        executor
            .enqueue(Request::new(vec![client_id as u32], params, client_id))
            .unwrap()
    };
    let low = prioritized(9, 1);
    let high = prioritized(1, 2);
    let high_later = prioritized(1, 3);
    assert_eq!(executor.queued_requests(), 3);

    assert!(executor.cancel(blocker).unwrap());

    let mut order = Vec::new();
    let ids = [blocker, low, high, high_later];
    let deadline = Instant::now() + Duration::from_secs(10);
    while order.len() < ids.len() {
        assert!(Instant::now() < deadline);
        for r in executor
            .await_responses(Some(Duration::from_millis(50)))
            .unwrap()
        {
            if r.is_request_final {
                order.push(r.request_id);
            }
        }
    }
    assert_eq!(order, vec![blocker, high, high_later, low]);
}

#[test]
fn cancelling_a_queued_request_yields_empty_final() {
    let (_dir, params) = params_with_engine();
    let params = InitParams {
        max_batch_size: 1,
        ..params
    };
    let executor = Executor::init(params, stalling).unwrap();

    let running = executor.enqueue(request(vec![1], 1_000)).unwrap();
    let queued = executor.enqueue(request(vec![2], 1_000)).unwrap();
    assert!(executor.cancel(queued).unwrap());

    let by_id = collect_final(&executor, &[queued]);
    let responses = &by_id[&queued];
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].sequence_index, 0);
    assert!(responses[0].tokens().is_empty());
    assert_eq!(responses[0].finish_reason, Some(FinishReason::Cancelled));

    assert!(!executor.cancel(tlc_runtime::RequestId(999)).unwrap());
    assert!(executor.cancel(running).unwrap());
}

#[test]
fn cancelling_an_in_flight_request_keeps_its_tokens() {
    let (_dir, params) = params_with_engine();
    let executor = Executor::init(params, stalling).unwrap();
    let id = executor.enqueue(request(vec![1], 1_000)).unwrap();

    let mut by_id = std::collections::HashMap::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while by_id.get(&id).map_or(0, |rs: &Vec<_>| rs.len()) < 3 {
        assert!(Instant::now() < deadline);
        for r in executor
            .await_responses(Some(Duration::from_millis(50)))
            .unwrap()
        {
            by_id.entry(r.request_id).or_insert_with(Vec::new).push(r);
        }
    }
    assert!(executor.cancel(id).unwrap());
    collect_final_into(&executor, &[id], &mut by_id);

    let responses = &by_id[&id];
    let tokens = reconstruct(responses);
    assert_eq!(tokens, (2..2 + tokens.len() as u32).collect::<Vec<_>>());
    assert_eq!(
        responses.last().unwrap().finish_reason,
        Some(FinishReason::Cancelled)
    );
    assert_eq!(responses.iter().filter(|r| r.is_request_final).count(), 1);
}

#[test]
fn many_concurrent_clients_each_get_their_own_stream() {
    let (_dir, params) = params_with_engine();
    let executor = std::sync::Arc::new(Executor::init(params, synthetic()).unwrap());

    let handles: Vec<_> = (0..8u32)
        .map(|client| {
            let executor = std::sync::Arc::clone(&executor);
            std::thread::spawn(move || {
                let prompt = vec![client * 1_000];
                let req = Request::new(prompt, RequestParams::with_max_new_tokens(5), client as u64);
                executor.enqueue(req).unwrap()
            })
        })
        .collect();
    let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());

    let by_id = collect_final(&executor, &ids);
    for id in ids {
        let responses = &by_id[&id];
        let client = responses[0].client_id as u32;
        let expected: Vec<u32> = (1..=5).map(|i| client * 1_000 + i).collect();
        assert_eq!(reconstruct(responses), expected);
    }
}

struct FailsOnThirteen;

impl Generator for FailsOnThirteen {
    fn step(&mut self, batch: &[SequenceView<'_>]) -> Result<Vec<StepOutput>, FatalExecutorError> {
        Ok(batch
            .iter()
            .map(|s| {
                if s.prompt.first() == Some(&13) {
                    Err(GenerationError::Failed("unlucky prompt".into()))
                } else {
                    Ok(vec![s.last_token().unwrap_or(0) + 1])
                }
            })
            .collect())
    }
}

#[test]
fn generation_error_only_finalizes_its_request() {
    let (_dir, params) = params_with_engine();
    let executor =
        Executor::init(params, |_: &InitParams| Ok::<_, InitError>(FailsOnThirteen)).unwrap();

    let bad = executor.enqueue(request(vec![13], 4)).unwrap();
    let good = executor.enqueue(request(vec![20], 4)).unwrap();
    let by_id = collect_final(&executor, &[bad, good]);

    let failed = by_id[&bad].last().unwrap();
    assert_eq!(failed.finish_reason, Some(FinishReason::Error));
    assert_eq!(
        failed.error(),
        Some(&ResponseError::Generation(GenerationError::Failed(
            "unlucky prompt".into()
        )))
    );
    assert_eq!(reconstruct(&by_id[&good]), vec![21, 22, 23, 24]);
    assert_eq!(executor.state(), ExecutorState::Initialized);
    assert!(executor.can_enqueue());
}

struct LosesDevice;

impl Generator for LosesDevice {
    fn step(&mut self, _: &[SequenceView<'_>]) -> Result<Vec<StepOutput>, FatalExecutorError> {
        Err(FatalExecutorError::DeviceLost("gpu0 fell off the bus".into()))
    }
}

#[test]
fn fatal_error_fails_every_request_and_shuts_down() {
    let (_dir, params) = params_with_engine();
    let executor = Executor::init(params, |_: &InitParams| Ok::<_, InitError>(LosesDevice)).unwrap();

    let id = executor.enqueue(request(vec![1], 4)).unwrap();
    let by_id = collect_final(&executor, &[id]);
    let last = by_id[&id].last().unwrap();
    assert!(last.error().is_some_and(ResponseError::is_fatal));

    eventually(|| executor.state() == ExecutorState::Shutdown);
    assert!(!executor.can_enqueue());
    assert_eq!(
        executor.enqueue(request(vec![1], 1)),
        Err(ExecutorError::NotInitialized)
    );
    assert_eq!(
        executor.await_responses(Some(Duration::ZERO)),
        Err(ExecutorError::NotInitialized)
    );
}

#[test]
fn init_rejects_missing_artifact() {
    let params = InitParams {
        engine_path: "/definitely/not/here.engine".into(),
        ..InitParams::default()
    };
    assert!(matches!(
        Executor::init(params, synthetic()),
        Err(InitError::ArtifactNotFound(_))
    ));
}

#[test]
fn init_rejects_zero_limits() {
    let (_dir, params) = params_with_engine();
    let params = InitParams {
        max_concurrent_requests: 0,
        ..params
    };
    assert!(matches!(
        Executor::init(params, synthetic()),
        Err(InitError::InvalidConfig(_))
    ));
}

#[test]
fn init_surfaces_loader_failure() {
    let (_dir, params) = params_with_engine();
    let result = Executor::init(params, |_: &InitParams| {
        Err::<SyntheticGenerator, _>(InitError::ResourceAllocation("out of device memory".into()))
    });
    assert!(matches!(result, Err(InitError::ResourceAllocation(_))));

    let dir = tempfile::tempdir().unwrap();
    let params = InitParams {
        engine_path: dir.path().to_path_buf(),
        ..InitParams::default()
    };
    assert!(matches!(
        Executor::init(params, synthetic()),
        Err(InitError::ResourceAllocation(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_awaiters_receive_responses() {
    let (_dir, params) = params_with_engine();
    let executor = Executor::init(params, synthetic()).unwrap();
    let id = executor.enqueue(request(vec![41], 3)).unwrap();

    let mut responses = Vec::new();
    while !responses.iter().any(|r: &tlc_runtime::Response| r.is_request_final) {
        responses.extend(
            executor
                .await_responses_async(Some(Duration::from_secs(5)))
                .await
                .unwrap(),
        );
    }
    assert!(responses.iter().all(|r| r.request_id == id));
    assert_eq!(reconstruct(&responses), vec![42, 43, 44]);
    tokio::task::block_in_place(|| executor.shutdown());
}
