//! Integration tests for the serialized job scheduler.
//!
//! Covers the end-to-end scenarios: a full event flow for one message,
//! FIFO queueing behind an in-flight job, the single-flight guarantee,
//! session continuity across jobs and resets, the job timeout, and the
//! bounded transient-error retry.

use std::sync::Arc;
use std::time::Duration;

use super::test_helpers::{
    error_messages, harness, harness_with_bridge, init_line, message_texts_from, progress_kinds,
    queue_snapshots, retry_count, success_run, transient_failure_run, FakeBridge, FakeRun,
};
use agent_relay::bridge::WorkerEvent;

const WAIT: Duration = Duration::from_secs(5);
const LONG_WAIT: Duration = Duration::from_secs(10);

// ── Scenario A: one message, full event flow ─────────────────────────────────

#[tokio::test]
async fn single_message_produces_start_init_complete_and_answer() {
    let h = harness(vec![success_run("hello alice")], 30);

    Arc::clone(&h.scheduler).submit("alice", "hello").await;

    let frames = h
        .publisher
        .wait_for(WAIT, |frames| {
            !message_texts_from(frames, "Claude").is_empty()
        })
        .await;

    let kinds = progress_kinds(&frames);
    let position = |kind: &str| {
        kinds
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_else(|| panic!("missing {kind} event in {kinds:?}"))
    };
    let (start, init, complete) = (position("start"), position("init"), position("complete"));
    assert!(
        start < init && init < complete,
        "expected start before init before complete, got: {kinds:?}"
    );

    assert_eq!(message_texts_from(&frames, "Claude"), vec!["hello alice"]);
    assert!(error_messages(&frames).is_empty());

    let record = h.bridge.invocation(0).await;
    assert_eq!(record.prompt, "[alice]: hello");
}

// ── Scenario B: second job queues behind the in-flight one ───────────────────

#[tokio::test]
async fn second_job_waits_until_the_first_reaches_a_terminal_state() {
    let bridge = FakeBridge::with_event_delay(
        vec![success_run("answer-one"), success_run("answer-two")],
        Duration::from_millis(50),
    );
    let h = harness_with_bridge(bridge, 30);

    Arc::clone(&h.scheduler).submit("alice", "first question").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    Arc::clone(&h.scheduler).submit("bob", "second question").await;

    let frames = h
        .publisher
        .wait_for(LONG_WAIT, |frames| {
            message_texts_from(frames, "Claude").len() == 2
                && queue_snapshots(frames).last() == Some(&(0, Vec::new()))
        })
        .await;

    // While alice's job was in flight, bob's was the only pending entry.
    let snapshots = queue_snapshots(&frames);
    assert!(
        snapshots
            .iter()
            .any(|(count, senders)| *count == 1 && senders == &["bob".to_owned()]),
        "expected a snapshot listing only bob, got: {snapshots:?}"
    );
    // Terminal snapshot: queue fully drained.
    assert_eq!(snapshots.last(), Some(&(0, Vec::new())));

    assert_eq!(
        message_texts_from(&frames, "Claude"),
        vec!["answer-one", "answer-two"]
    );

    assert_eq!(h.bridge.invocation(0).await.prompt, "[alice]: first question");
    assert_eq!(h.bridge.invocation(1).await.prompt, "[bob]: second question");
    assert_eq!(h.bridge.max_active(), 1);
}

// ── Single-flight ────────────────────────────────────────────────────────────

#[tokio::test]
async fn sequential_submits_dispatch_in_fifo_order() {
    let runs = (0..5)
        .map(|i| success_run(&format!("answer-{i}")))
        .collect();
    let h = harness(runs, 30);

    for i in 0..5 {
        Arc::clone(&h.scheduler).submit(format!("user-{i}"), "ping").await;
    }

    let frames = h
        .publisher
        .wait_for(LONG_WAIT, |frames| {
            message_texts_from(frames, "Claude").len() == 5
        })
        .await;

    assert_eq!(
        message_texts_from(&frames, "Claude"),
        (0..5).map(|i| format!("answer-{i}")).collect::<Vec<_>>()
    );
    for i in 0..5 {
        assert_eq!(
            h.bridge.invocation(i).await.prompt,
            format!("[user-{i}]: ping")
        );
    }
    assert_eq!(h.bridge.max_active(), 1);
}

#[tokio::test]
async fn concurrent_submits_never_overlap_worker_invocations() {
    let runs = (0..5).map(|i| success_run(&format!("r{i}"))).collect();
    let h = harness(runs, 30);

    let submits = (0..5).map(|i| {
        let scheduler = Arc::clone(&h.scheduler);
        tokio::spawn(async move {
            scheduler.submit(format!("user-{i}"), "ping").await;
        })
    });
    for handle in submits {
        handle.await.expect("submit task");
    }

    h.publisher
        .wait_for(LONG_WAIT, |frames| {
            message_texts_from(frames, "Claude").len() == 5
        })
        .await;

    assert_eq!(h.bridge.invocation_count().await, 5);
    assert_eq!(h.bridge.max_active(), 1, "worker invocations overlapped");
}

// ── Session continuity ───────────────────────────────────────────────────────

#[tokio::test]
async fn first_job_is_fresh_and_subsequent_jobs_resume() {
    let h = harness(vec![success_run("a"), success_run("b")], 30);

    Arc::clone(&h.scheduler).submit("alice", "one").await;
    h.publisher
        .wait_for(WAIT, |frames| {
            message_texts_from(frames, "Claude").len() == 1
        })
        .await;

    Arc::clone(&h.scheduler).submit("alice", "two").await;
    h.publisher
        .wait_for(WAIT, |frames| {
            message_texts_from(frames, "Claude").len() == 2
        })
        .await;

    let first = h.bridge.invocation(0).await;
    let second = h.bridge.invocation(1).await;
    assert!(!first.resumed, "first job must start a fresh session");
    assert!(second.resumed, "second job must resume the session");
    assert_eq!(first.session_id, second.session_id);
}

#[tokio::test]
async fn reset_forces_the_next_job_onto_a_fresh_session() {
    let h = harness(vec![success_run("a"), success_run("b")], 30);

    Arc::clone(&h.scheduler).submit("alice", "one").await;
    h.publisher
        .wait_for(WAIT, |frames| {
            message_texts_from(frames, "Claude").len() == 1
        })
        .await;

    let fresh = h.scheduler.reset_session().await;
    assert!(!fresh.started);

    Arc::clone(&h.scheduler).submit("alice", "two").await;
    h.publisher
        .wait_for(WAIT, |frames| {
            message_texts_from(frames, "Claude").len() == 2
        })
        .await;

    let first = h.bridge.invocation(0).await;
    let second = h.bridge.invocation(1).await;
    assert!(!second.resumed, "post-reset job must start fresh");
    assert_ne!(first.session_id, second.session_id);
    assert_eq!(second.session_id, fresh.id);
}

#[tokio::test]
async fn explicit_resets_yield_distinct_identifiers() {
    let h = harness(Vec::new(), 30);

    let first = h.scheduler.reset_session().await;
    let second = h.scheduler.reset_session().await;

    assert_ne!(first.id, second.id);
    assert!(!first.started);
    assert!(!second.started);
}

#[tokio::test]
async fn losing_the_last_consumer_resets_the_session() {
    let h = harness(Vec::new(), 30);

    let before = h.scheduler.current_session().await;
    h.scheduler.on_consumers_gone().await;
    let after = h.scheduler.current_session().await;

    assert_ne!(before.id, after.id);
    assert!(!after.started);
}

// ── Scenario C: timeout ──────────────────────────────────────────────────────

#[tokio::test]
async fn hung_worker_times_out_and_the_next_job_starts_fresh() {
    let h = harness(vec![FakeRun::Hang, success_run("recovered")], 1);

    Arc::clone(&h.scheduler).submit("alice", "never returns").await;

    let frames = h
        .publisher
        .wait_for(LONG_WAIT, |frames| !error_messages(frames).is_empty())
        .await;
    let errors = error_messages(&frames);
    assert!(
        errors[0].contains("timeout"),
        "error must mention the timeout, got: {errors:?}"
    );
    assert_eq!(retry_count(&frames), 0, "timeouts are not retried");

    Arc::clone(&h.scheduler).submit("bob", "after the timeout").await;
    h.publisher
        .wait_for(LONG_WAIT, |frames| {
            message_texts_from(frames, "Claude").len() == 1
        })
        .await;

    let first = h.bridge.invocation(0).await;
    let second = h.bridge.invocation(1).await;
    assert!(!second.resumed, "post-timeout job must start fresh");
    assert_ne!(first.session_id, second.session_id);
}

// ── Scenario D: bounded transient retry ──────────────────────────────────────

#[tokio::test]
async fn transient_session_error_is_retried_exactly_once() {
    let h = harness(
        vec![transient_failure_run(), transient_failure_run()],
        30,
    );

    Arc::clone(&h.scheduler).submit("alice", "stale session").await;

    let frames = h
        .publisher
        .wait_for(WAIT, |frames| !error_messages(frames).is_empty())
        .await;

    assert_eq!(retry_count(&frames), 1, "exactly one retry is authorized");
    assert_eq!(h.bridge.invocation_count().await, 2);

    let first = h.bridge.invocation(0).await;
    let second = h.bridge.invocation(1).await;
    assert!(!second.resumed, "the retry must run under a fresh session");
    assert_ne!(first.session_id, second.session_id);

    let errors = error_messages(&frames);
    assert!(
        errors[0].contains("retry"),
        "terminal error must mention the exhausted retry, got: {errors:?}"
    );
}

#[tokio::test]
async fn retry_under_a_fresh_session_can_succeed() {
    let h = harness(vec![transient_failure_run(), success_run("recovered")], 30);

    Arc::clone(&h.scheduler).submit("alice", "stale once").await;

    let frames = h
        .publisher
        .wait_for(WAIT, |frames| {
            !message_texts_from(frames, "Claude").is_empty()
        })
        .await;

    assert_eq!(retry_count(&frames), 1);
    assert_eq!(message_texts_from(&frames, "Claude"), vec!["recovered"]);
    assert!(error_messages(&frames).is_empty());
    assert_eq!(h.bridge.invocation_count().await, 2);
}

// ── Failure taxonomy ─────────────────────────────────────────────────────────

#[tokio::test]
async fn clean_exit_without_text_is_an_empty_result_error() {
    let h = harness(
        vec![FakeRun::Events(vec![
            init_line("test-model", "sess"),
            WorkerEvent::Done(Some(0)),
        ])],
        30,
    );

    Arc::clone(&h.scheduler).submit("alice", "silent run").await;

    let frames = h
        .publisher
        .wait_for(WAIT, |frames| !error_messages(frames).is_empty())
        .await;

    let errors = error_messages(&frames);
    assert!(errors[0].contains("no response"), "got: {errors:?}");
    assert_eq!(retry_count(&frames), 0);
}

#[tokio::test]
async fn nonzero_exit_without_text_is_a_crash_error() {
    let h = harness(vec![FakeRun::Events(vec![WorkerEvent::Done(Some(3))])], 30);

    Arc::clone(&h.scheduler).submit("alice", "crashing run").await;

    let frames = h
        .publisher
        .wait_for(WAIT, |frames| !error_messages(frames).is_empty())
        .await;

    let errors = error_messages(&frames);
    assert!(errors[0].contains("exited with code 3"), "got: {errors:?}");
}

#[tokio::test]
async fn spawn_failure_does_not_block_subsequent_jobs() {
    let h = harness(vec![FakeRun::SpawnFail, success_run("still alive")], 30);

    Arc::clone(&h.scheduler).submit("alice", "unlaunchable").await;
    Arc::clone(&h.scheduler).submit("bob", "next in line").await;

    let frames = h
        .publisher
        .wait_for(WAIT, |frames| {
            !message_texts_from(frames, "Claude").is_empty()
        })
        .await;

    let errors = error_messages(&frames);
    assert!(
        errors.iter().any(|message| message.contains("spawn")),
        "spawn failure must surface as an error, got: {errors:?}"
    );
    assert_eq!(message_texts_from(&frames, "Claude"), vec!["still alive"]);
}

#[tokio::test]
async fn stream_fault_fails_the_job_without_retry() {
    let h = harness(
        vec![FakeRun::Events(vec![
            WorkerEvent::Fault("stream read failed: broken pipe".into()),
            WorkerEvent::Done(None),
        ])],
        30,
    );

    Arc::clone(&h.scheduler).submit("alice", "io failure").await;

    let frames = h
        .publisher
        .wait_for(WAIT, |frames| !error_messages(frames).is_empty())
        .await;

    let errors = error_messages(&frames);
    assert!(errors[0].contains("stream failure"), "got: {errors:?}");
    assert_eq!(retry_count(&frames), 0);
}

// ── Admin surface ────────────────────────────────────────────────────────────

#[tokio::test]
async fn status_request_republishes_the_queue_snapshot() {
    let h = harness(Vec::new(), 30);

    h.scheduler.publish_queue_status().await;

    let frames = h
        .publisher
        .wait_for(WAIT, |frames| !queue_snapshots(frames).is_empty())
        .await;

    assert_eq!(queue_snapshots(&frames), vec![(0, Vec::new())]);
}
