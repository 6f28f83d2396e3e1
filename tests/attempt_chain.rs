//! Async entry points: attempt chains, caller-side timeouts and batches

use async_trait::async_trait;
use offline_bgremove::{
    remove_background_batch, remove_background_with_timeout, AttemptChain, BgRemovalError,
    LocalPipelineAttempt, PipelineOptions, PipelinePath, PipelineResult, RasterBuffer,
    RemovalAttempt, Result,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Attempt that counts its invocations and answers with a fixed outcome
struct Scripted {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    outcome: fn() -> BgRemovalError,
    succeed: bool,
}

impl Scripted {
    fn failing(name: &'static str, outcome: fn() -> BgRemovalError) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name,
                calls: calls.clone(),
                outcome,
                succeed: false,
            },
            calls,
        )
    }

    fn succeeding(name: &'static str) -> (Self, Arc<AtomicUsize>) {
        let (mut attempt, calls) = Self::failing(name, || BgRemovalError::internal("unused"));
        attempt.succeed = true;
        (attempt, calls)
    }
}

#[async_trait]
impl RemovalAttempt for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    async fn attempt(
        &self,
        input: &RasterBuffer,
        options: &PipelineOptions,
    ) -> Result<PipelineResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            // stand-in for a remote service: run the local pipeline directly
            offline_bgremove::remove_background(input, options)
        } else {
            Err((self.outcome)())
        }
    }
}

fn square(size: u32) -> RasterBuffer {
    let mut buffer = RasterBuffer::filled(size, size, [245, 245, 245, 255]).unwrap();
    for y in size / 4..size * 3 / 4 {
        for x in size / 4..size * 3 / 4 {
            buffer.set_pixel(x, y, [40, 90, 200, 255]);
        }
    }
    buffer
}

fn seeded() -> PipelineOptions {
    PipelineOptions::builder().seed(21).build().unwrap()
}

#[tokio::test]
async fn test_first_success_wins() {
    let (remote, remote_calls) = Scripted::succeeding("remote");
    let (never, never_calls) = Scripted::failing("never", || BgRemovalError::internal("x"));

    let result = AttemptChain::new()
        .then(remote)
        .then(never)
        .run(&square(32), &seeded())
        .await
        .unwrap();

    assert_eq!(result.dimensions(), (32, 32));
    assert_eq!(remote_calls.load(Ordering::SeqCst), 1);
    assert_eq!(never_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_falls_through_to_local_pipeline() {
    let (a, a_calls) = Scripted::failing("service-a", || BgRemovalError::processing("HTTP 503"));
    let (b, b_calls) = Scripted::failing("service-b", || BgRemovalError::processing("quota"));

    let result = AttemptChain::new()
        .then(a)
        .then(b)
        .then(LocalPipelineAttempt::new())
        .run(&square(40), &seeded())
        .await
        .unwrap();

    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.dimensions(), (40, 40));
}

#[tokio::test]
async fn test_cancellation_short_circuits_chain() {
    let (cancelled, _) = Scripted::failing("cancelled", || BgRemovalError::cancelled("clustering"));
    let (after, after_calls) = Scripted::succeeding("after");

    let err = AttemptChain::new()
        .then(cancelled)
        .then(after)
        .run(&square(16), &seeded())
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_all_failures_are_reported() {
    let (a, _) = Scripted::failing("a", || BgRemovalError::processing("down"));
    let invalid = PipelineOptions {
        edge_smoothing: 9,
        ..PipelineOptions::default()
    };

    let err = AttemptChain::new()
        .then(a)
        .then(LocalPipelineAttempt::new())
        .run(&square(16), &invalid)
        .await
        .unwrap_err();

    match err {
        BgRemovalError::AllAttemptsFailed(failures) => {
            assert_eq!(failures.len(), 2);
            assert!(failures[0].starts_with("a: "));
            assert!(failures[1].starts_with("local-pipeline: "));
            assert!(failures[1].contains("edge smoothing"));
        },
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_local_attempt_observes_cancelled_token() {
    let token = CancellationToken::new();
    token.cancel();
    let err = LocalPipelineAttempt::new()
        .with_cancellation(token)
        .attempt(&square(16), &seeded())
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_timeout_reports_cancelled() {
    let err = remove_background_with_timeout(&square(1200), &seeded(), Duration::from_millis(1))
        .await
        .unwrap_err();
    assert!(err.is_cancelled(), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_generous_timeout_completes() {
    let result = remove_background_with_timeout(&square(24), &seeded(), Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(result.dimensions(), (24, 24));
}

#[tokio::test]
async fn test_batch_preserves_input_order() {
    let inputs = vec![
        square(20),
        RasterBuffer::filled(30, 10, [0, 0, 0, 255]).unwrap(),
        square(44),
        RasterBuffer::filled(5, 50, [128, 128, 128, 255]).unwrap(),
    ];
    let expected: Vec<(u32, u32)> = inputs.iter().map(RasterBuffer::dimensions).collect();

    let results = remove_background_batch(inputs, &seeded(), 3).await.unwrap();
    let dimensions: Vec<(u32, u32)> = results
        .iter()
        .map(|r| r.as_ref().unwrap().dimensions())
        .collect();
    assert_eq!(dimensions, expected);
    // uniform inputs have only one colour cluster
    assert_eq!(
        results[1].as_ref().unwrap().metadata.path,
        PipelinePath::Fallback
    );
}

#[tokio::test]
async fn test_batch_matches_sequential_results() {
    let inputs: Vec<RasterBuffer> = (0..4).map(|i| square(24 + i * 4)).collect();
    let options = seeded();

    let batched = remove_background_batch(inputs.clone(), &options, 0)
        .await
        .unwrap();
    for (input, result) in inputs.iter().zip(batched) {
        let sequential = offline_bgremove::remove_background(input, &options).unwrap();
        assert_eq!(result.unwrap().mask, sequential.mask);
    }
}

#[tokio::test]
async fn test_batch_rejects_invalid_options() {
    let invalid = PipelineOptions {
        edge_smoothing: 200,
        ..PipelineOptions::default()
    };
    let err = remove_background_batch(vec![square(8)], &invalid, 2)
        .await
        .unwrap_err();
    assert!(matches!(err, BgRemovalError::InvalidConfig(_)));
}
