//! Lifecycle and delivery tests for the sampling pipeline.

mod common;

use common::{sequence, FakeSource, RecordingSink};
use osark_agent::{
    EventKind, Pipeline, PipelineConfig, PipelineError, PipelineState, TrackingPolicy,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;

const HOUR: Duration = Duration::from_secs(3600);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

fn config(sample_ms: u64, flush_ms: u64, batch_size: usize) -> PipelineConfig {
    PipelineConfig {
        sample_interval: Duration::from_millis(sample_ms),
        flush_interval: Duration::from_millis(flush_ms),
        batch_size,
        tracking: TrackingPolicy::default(),
    }
}

fn pipeline(
    config: PipelineConfig,
    source: FakeSource,
    sink: &Arc<RecordingSink>,
) -> (Pipeline, Arc<FakeSource>) {
    let source = Arc::new(source);
    let pipeline = Pipeline::new(config, source.clone(), sink.clone()).unwrap();
    (pipeline, source)
}

#[tokio::test(start_paused = true)]
async fn test_init_then_process_samples() {
    let sink = Arc::new(RecordingSink::new());
    let (mut pipeline, source) = pipeline(config(1000, 60_000, 100), FakeSource::new(), &sink);

    pipeline.start().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Running);

    // Ticks at 0s, 1s, 2s, 3s
    sleep(Duration::from_millis(3500)).await;
    pipeline.stop(STOP_TIMEOUT).await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Stopped);

    // Nothing filled the batch and the flush timer never fired: one final batch.
    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    let events = &batches[0];
    assert_eq!(events.len(), 4);

    match &events[0].kind {
        EventKind::Init {
            app_info,
            system_info,
        } => {
            assert_eq!(app_info.len(), 3);
            assert_eq!(system_info.os_name, "macOS");
        }
        other => panic!("expected init event, got {other:?}"),
    }
    let seqs: Vec<u64> = events[1..].iter().filter_map(sequence).collect();
    assert_eq!(seqs, [0, 1, 2]);

    // Apps without a bundle id are not tracked
    let queried = source.queried_ids.lock().unwrap().clone();
    assert!(queried
        .iter()
        .all(|ids| ids == &["com.apple.Safari", "com.apple.Notes"]));

    let stats = pipeline.stats().snapshot();
    assert_eq!(stats.events_sampled, 4);
    assert_eq!(stats.events_delivered, 4);
    assert_eq!(stats.batches_delivered, 1);
}

#[tokio::test(start_paused = true)]
async fn test_capacity_flush() {
    let sink = Arc::new(RecordingSink::new());
    let (mut pipeline, _) = pipeline(config(1000, 60_000, 2), FakeSource::new(), &sink);

    pipeline.start().unwrap();
    sleep(Duration::from_millis(3500)).await;

    // Four events, two full batches, delivered before any stop
    let lengths: Vec<usize> = sink.batches().iter().map(Vec::len).collect();
    assert_eq!(lengths, [2, 2]);

    pipeline.stop(STOP_TIMEOUT).await.unwrap();

    // Empty final drain does not reach the sink
    assert_eq!(sink.batches().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timer_flush() {
    let sink = Arc::new(RecordingSink::new());
    let (mut pipeline, _) = pipeline(config(1000, 1500, 100), FakeSource::new(), &sink);

    pipeline.start().unwrap();

    // Samples at 0s and 1s, timer flush at 1.5s
    sleep(Duration::from_millis(1700)).await;
    let lengths: Vec<usize> = sink.batches().iter().map(Vec::len).collect();
    assert_eq!(lengths, [2]);

    // Sample at 2s, stop at 2.2s before the 3s flush
    sleep(Duration::from_millis(500)).await;
    pipeline.stop(STOP_TIMEOUT).await.unwrap();

    let lengths: Vec<usize> = sink.batches().iter().map(Vec::len).collect();
    assert_eq!(lengths, [2, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_any_tick_delivers_pending_once() {
    let sink = Arc::new(RecordingSink::new());
    let (mut pipeline, _) = pipeline(
        PipelineConfig {
            sample_interval: HOUR,
            flush_interval: HOUR,
            batch_size: 100,
            tracking: TrackingPolicy::default(),
        },
        FakeSource::new(),
        &sink,
    );

    pipeline.start().unwrap();
    // Let the immediate first sample reach the dispatcher
    sleep(Duration::from_millis(10)).await;
    pipeline.stop(STOP_TIMEOUT).await.unwrap();

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].intent(), "init");
}

#[tokio::test(start_paused = true)]
async fn test_no_loss_and_order_under_load() {
    let sink = Arc::new(RecordingSink::new());
    let (mut pipeline, _) = pipeline(config(10, 55, 7), FakeSource::new(), &sink);

    pipeline.start().unwrap();
    sleep(Duration::from_secs(2)).await;
    pipeline.stop(STOP_TIMEOUT).await.unwrap();

    let stats = pipeline.stats().snapshot();
    let events = sink.events();
    assert!(events.len() > 100);
    assert_eq!(events.len() as u64, stats.events_sampled);
    assert_eq!(stats.events_delivered, stats.events_sampled);

    // Every event exactly once
    let ids: HashSet<_> = events.iter().map(|e| e.id).collect();
    assert_eq!(ids.len(), events.len());

    // In sampling order
    let seqs: Vec<u64> = events.iter().filter_map(sequence).collect();
    assert_eq!(seqs.len(), events.len() - 1);
    assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1));

    assert!(sink.batches().iter().all(|b| b.len() <= 7));
}

#[tokio::test(start_paused = true)]
async fn test_sampling_errors_are_delivered() {
    let sink = Arc::new(RecordingSink::new());
    let (mut pipeline, _) = pipeline(
        config(1000, 60_000, 100),
        FakeSource::new().failing_inits(2),
        &sink,
    );

    pipeline.start().unwrap();
    sleep(Duration::from_millis(3500)).await;
    pipeline.stop(STOP_TIMEOUT).await.unwrap();

    let intents: Vec<&str> = sink.events().iter().map(|e| e.intent()).collect();
    assert_eq!(
        intents,
        ["error", "error", "init", "running_processes"]
    );

    let events = sink.events();
    match &events[0].kind {
        EventKind::Error { error } => assert!(error.contains("failed to get apps")),
        other => panic!("expected error event, got {other:?}"),
    }
    assert_eq!(pipeline.stats().snapshot().sample_errors, 2);
}

#[tokio::test(start_paused = true)]
async fn test_process_query_failure_becomes_error_event() {
    let sink = Arc::new(RecordingSink::new());
    let (mut pipeline, source) = pipeline(
        config(1000, 60_000, 100),
        FakeSource::new().failing_process_calls(&[0]),
        &sink,
    );

    pipeline.start().unwrap();
    sleep(Duration::from_millis(3500)).await;
    pipeline.stop(STOP_TIMEOUT).await.unwrap();

    let events = sink.events();
    let intents: Vec<&str> = events.iter().map(|e| e.intent()).collect();
    assert_eq!(
        intents,
        ["init", "error", "running_processes", "running_processes"]
    );
    match &events[1].kind {
        EventKind::Error { error } => {
            assert!(error.contains("failed to get current running processes"))
        }
        other => panic!("expected error event, got {other:?}"),
    }

    // No re-initialization after the failure; the tracked set is unchanged
    let queried = source.queried_ids.lock().unwrap().clone();
    assert_eq!(queried.len(), 3);
    assert!(queried.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(pipeline.stats().snapshot().sample_errors, 1);
}

#[tokio::test(start_paused = true)]
async fn test_sample_finishing_after_stop_is_discarded() {
    let sink = Arc::new(RecordingSink::new());
    let (mut pipeline, source) = pipeline(
        config(1000, 60_000, 100),
        FakeSource::new().slow_processes(Duration::from_secs(3)),
        &sink,
    );

    pipeline.start().unwrap();
    // Init at 0s, process query in flight from 1s to 4s
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(source.process_calls(), 1);

    pipeline.stop(STOP_TIMEOUT).await.unwrap();

    let intents: Vec<&str> = sink.events().iter().map(|e| e.intent()).collect();
    assert_eq!(intents, ["init"]);
    assert_eq!(source.process_calls(), 1);
    assert_eq!(pipeline.stats().snapshot().events_sampled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_delivery_failures_are_reported_not_retried() {
    let sink = Arc::new(RecordingSink::failing());
    let (mut pipeline, _) = pipeline(config(1000, 60_000, 1), FakeSource::new(), &sink);

    pipeline.start().unwrap();
    sleep(Duration::from_millis(2500)).await;
    pipeline.stop(STOP_TIMEOUT).await.unwrap();

    // Each event attempted once, each failure reported once
    let batches = sink.batches();
    assert_eq!(batches.len(), 3);
    let reports = sink.reports();
    assert_eq!(reports.len(), 3);
    assert!(reports[0].contains("failed to deliver batch of 1 events"));
    assert!(reports[0].contains("503"));

    let stats = pipeline.stats().snapshot();
    assert_eq!(stats.delivery_failures, 3);
    assert_eq!(stats.batches_delivered, 0);
    assert_eq!(stats.reports_failed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_reports_do_not_stop_dispatcher() {
    let sink = Arc::new(RecordingSink::failing_everything());
    let (mut pipeline, _) = pipeline(config(1000, 60_000, 1), FakeSource::new(), &sink);

    pipeline.start().unwrap();
    sleep(Duration::from_millis(2500)).await;
    pipeline.stop(STOP_TIMEOUT).await.unwrap();

    assert_eq!(sink.batches().len(), 3);
    assert_eq!(pipeline.stats().snapshot().reports_failed, 3);
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_stop_times_out_on_stuck_sink() {
    let gate = Arc::new(Notify::new());
    let sink = Arc::new(RecordingSink::gated(gate.clone()));
    let (mut pipeline, _) = pipeline(
        PipelineConfig {
            sample_interval: HOUR,
            flush_interval: HOUR,
            batch_size: 1,
            tracking: TrackingPolicy::default(),
        },
        FakeSource::new(),
        &sink,
    );

    pipeline.start().unwrap();
    sleep(Duration::from_millis(10)).await;

    let err = pipeline.stop(Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, PipelineError::ShutdownTimeout(_)));
    assert_eq!(pipeline.state(), PipelineState::Stopping);
    assert!(sink.batches().is_empty());

    // Once the sink recovers, a second stop completes the drain
    gate.notify_one();
    pipeline.stop(STOP_TIMEOUT).await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert_eq!(sink.batches().len(), 1);
}

#[tokio::test]
async fn test_lifecycle_errors() {
    let sink = Arc::new(RecordingSink::new());
    let (mut pipeline, _) = pipeline(config(1000, 1000, 10), FakeSource::new(), &sink);

    assert_eq!(pipeline.state(), PipelineState::Created);
    assert!(matches!(
        pipeline.stop(STOP_TIMEOUT).await,
        Err(PipelineError::NotRunning)
    ));

    // Never started: returns immediately
    pipeline.wait().await;
    assert_eq!(pipeline.state(), PipelineState::Created);

    pipeline.start().unwrap();
    assert!(matches!(pipeline.start(), Err(PipelineError::AlreadyStarted)));

    pipeline.stop(STOP_TIMEOUT).await.unwrap();
    pipeline.stop(STOP_TIMEOUT).await.unwrap();
    pipeline.wait().await;
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let sink = Arc::new(RecordingSink::new());
    let result = Pipeline::new(config(1000, 1000, 0), Arc::new(FakeSource::new()), sink);
    assert!(matches!(result, Err(PipelineError::InvalidBatchSize)));
}

#[tokio::test(start_paused = true)]
async fn test_wait_returns_when_sampler_dies() {
    let sink = Arc::new(RecordingSink::new());
    let (mut pipeline, _) = pipeline(
        config(1000, 60_000, 100),
        FakeSource::new().panicking(),
        &sink,
    );

    pipeline.start().unwrap();
    // Init succeeds on the first tick, the process query on the second panics.
    // The dispatcher sees the channel close and flushes what it has.
    tokio::time::timeout(Duration::from_secs(10), pipeline.wait())
        .await
        .expect("wait must not hang when a task dies");

    assert_eq!(pipeline.state(), PipelineState::Stopped);
    let intents: Vec<&str> = sink.events().iter().map(|e| e.intent()).collect();
    assert_eq!(intents, ["init"]);
}
