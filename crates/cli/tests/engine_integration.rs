//! End-to-end tests for the progress engine and viewer fan-out
//!
//! Each test starts a real engine on a temp directory with a real watcher,
//! connects viewers through the hub and drives it by writing files.

mod common;

use common::{assert_quiet, next_message, wait_for_update, write_frame_in, TestRender, T0};
use rendermon_core::{ServerMessage, TotalFramesInput};
use rendermon_lib::engine::{self, EngineError};
use rendermon_lib::hub::BroadcastHub;
use std::sync::Arc;
use std::time::Duration;

fn secs(d: Option<Duration>) -> Option<f64> {
    d.map(|d| d.as_secs_f64())
}

// ---------------------------------------------------------------------------
// Scenarios A-E: a render from the first frame through reset
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn render_lifecycle_scenarios() {
    let render = TestRender::new();
    let hub = Arc::new(BroadcastHub::new());
    let (engine, _task) = engine::start(render.engine_config(100), hub).await.unwrap();

    let mut viewer = engine.connect("viewer-1".into()).await.unwrap();
    let ServerMessage::InitialState(initial) = next_message(&mut viewer).await else {
        panic!("expected initialState first");
    };
    assert_eq!(initial.completed_frames, 0);
    assert_eq!(initial.total_frames, 100);

    // A: first frame in an empty directory
    render.write_frame("frame_0001.png", T0);
    let a = wait_for_update(&mut viewer, |s| s.completed_frames == 1).await;
    assert_eq!(a.first_frame_timestamp, Some(T0));
    assert!(a.stats().eta.is_none());
    assert!(a.stats().last_frame_time.is_none());

    // B: second frame ten seconds later
    render.write_frame("frame_0002.png", T0 + 10_000);
    let b = wait_for_update(&mut viewer, |s| s.completed_frames == 2).await;
    let stats = b.stats();
    assert_eq!(secs(stats.last_frame_time), Some(10.0));
    assert_eq!(secs(stats.avg_frame_time), Some(10.0));
    assert_eq!(secs(stats.eta), Some(980.0));

    // C: manual total
    let total = engine
        .set_total_frames(TotalFramesInput::Number(50), Some("viewer-1".into()))
        .await
        .unwrap();
    assert_eq!(total, 50);
    let c = wait_for_update(&mut viewer, |s| s.total_frames == 50).await;
    assert_eq!(secs(c.stats().eta), Some(480.0));
    assert!((c.percentage - 4.0).abs() < 1e-9);

    // D: reset recounts from disk and clears the override
    let completed = engine.reset().await.unwrap();
    assert_eq!(completed, 2);
    let d = wait_for_update(&mut viewer, |s| s.total_frames == 100).await;
    assert_eq!(d.completed_frames, 2);
    assert_eq!(d.total_frames, 100);
    assert_eq!(d.first_frame_timestamp, Some(T0));
    assert_eq!(d.last_frame_timestamp, Some(T0 + 10_000));
    assert_eq!(d.previous_frame_timestamp, Some(T0));

    // E: late joiner gets exactly one immediate snapshot
    let mut late = engine.connect("viewer-2".into()).await.unwrap();
    let ServerMessage::InitialState(e) = next_message(&mut late).await else {
        panic!("expected initialState for late viewer");
    };
    assert_eq!(e.completed_frames, 2);
    assert_quiet(&mut late, Duration::from_millis(300)).await;
}

// ---------------------------------------------------------------------------
// Pre-existing frames are reported at startup
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn startup_scan_reports_history() {
    let render = TestRender::new();
    render.write_frame("shot_0001.exr", T0);
    render.write_frame("shot_0002.exr", T0 + 4_000);
    render.write_frame("shot_0003.exr", T0 + 10_000);
    std::fs::write(render.path().join("notes.txt"), b"not a frame").unwrap();
    std::fs::write(render.path().join("preview.png"), b"no number").unwrap();

    let hub = Arc::new(BroadcastHub::new());
    let (engine, _task) = engine::start(render.engine_config(10), hub).await.unwrap();

    let snapshot = engine.snapshot().await.unwrap();
    assert_eq!(snapshot.completed_frames, 3);
    assert_eq!(snapshot.first_frame_timestamp, Some(T0));
    assert_eq!(snapshot.previous_frame_timestamp, Some(T0 + 4_000));
    assert_eq!(snapshot.last_frame_timestamp, Some(T0 + 10_000));
    assert!((snapshot.percentage - 30.0).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// Validation errors go to the requester only
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_total_is_reported_to_requester_only() {
    let render = TestRender::new();
    let hub = Arc::new(BroadcastHub::new());
    let (engine, _task) = engine::start(render.engine_config(100), hub).await.unwrap();

    let mut requester = engine.connect("requester".into()).await.unwrap();
    let mut bystander = engine.connect("bystander".into()).await.unwrap();
    next_message(&mut requester).await;
    next_message(&mut bystander).await;

    for bad in [
        TotalFramesInput::Number(0),
        TotalFramesInput::Number(-4),
        TotalFramesInput::Text("lots".into()),
    ] {
        let err = engine
            .set_total_frames(bad, Some("requester".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(_)));

        let ServerMessage::Error { message } = next_message(&mut requester).await else {
            panic!("expected error message");
        };
        assert!(message.starts_with("Invalid total frames value"));
    }

    assert_quiet(&mut bystander, Duration::from_millis(200)).await;
    assert_eq!(engine.snapshot().await.unwrap().total_frames, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_state_answers_only_the_requester() {
    let render = TestRender::new();
    let hub = Arc::new(BroadcastHub::new());
    let (engine, _task) = engine::start(render.engine_config(100), hub).await.unwrap();

    let mut a = engine.connect("a".into()).await.unwrap();
    let mut b = engine.connect("b".into()).await.unwrap();
    next_message(&mut a).await;
    next_message(&mut b).await;

    engine.request_state("a".into()).await.unwrap();

    assert!(matches!(next_message(&mut a).await, ServerMessage::InitialState(_)));
    assert_quiet(&mut b, Duration::from_millis(200)).await;
}

// ---------------------------------------------------------------------------
// Directory switch
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn switch_resets_rescans_and_ignores_old_directory() {
    let render = TestRender::new();
    let first = render.child("sh010");
    let second = render.child("sh020");
    std::fs::create_dir_all(&first).unwrap();
    std::fs::create_dir_all(&second).unwrap();
    write_frame_in(&second, "beauty_0001.tif", T0);
    write_frame_in(&second, "beauty_0002.tif", T0 + 6_000);

    let mut config = render.engine_config(100);
    config.watch_dir = first.clone();
    let hub = Arc::new(BroadcastHub::new());
    let (engine, _task) = engine::start(config, hub).await.unwrap();

    let mut viewer = engine.connect("v".into()).await.unwrap();
    next_message(&mut viewer).await;

    engine
        .set_total_frames(TotalFramesInput::Number(24), None)
        .await
        .unwrap();
    wait_for_update(&mut viewer, |s| s.total_frames == 24).await;

    let resolved = engine
        .switch_target(second.display().to_string())
        .await
        .unwrap();
    assert_eq!(resolved, second);

    let switched = wait_for_update(&mut viewer, |s| s.completed_frames == 2).await;
    assert_eq!(switched.total_frames, 100);
    assert_eq!(switched.first_frame_timestamp, Some(T0));
    assert_eq!(switched.last_frame_timestamp, Some(T0 + 6_000));

    // Frames landing in the old directory no longer count
    write_frame_in(&first, "beauty_0001.tif", T0 + 20_000);
    assert_quiet(&mut viewer, Duration::from_millis(600)).await;
    assert_eq!(engine.snapshot().await.unwrap().completed_frames, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn switch_creates_missing_directory() {
    let render = TestRender::new();
    let hub = Arc::new(BroadcastHub::new());
    let (engine, _task) = engine::start(render.engine_config(100), hub).await.unwrap();

    let target = render.child("new").join("nested");
    let resolved = engine
        .switch_target(target.display().to_string())
        .await
        .unwrap();

    assert!(resolved.is_dir());
    assert_eq!(engine.snapshot().await.unwrap().completed_frames, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn switch_to_file_is_rejected_and_state_kept() {
    let render = TestRender::new();
    render.write_frame("frame_0001.png", T0);
    let not_a_dir = render.child("plain.txt");
    std::fs::write(&not_a_dir, b"x").unwrap();

    let hub = Arc::new(BroadcastHub::new());
    let (engine, _task) = engine::start(render.engine_config(100), hub).await.unwrap();

    let err = engine
        .switch_target(not_a_dir.display().to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(ref e) if e.is_validation()));
    assert_eq!(engine.snapshot().await.unwrap().completed_frames, 1);
}

// ---------------------------------------------------------------------------
// Non-frame files and removals
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_frame_files_do_not_change_progress() {
    let render = TestRender::new();
    let hub = Arc::new(BroadcastHub::new());
    let (engine, _task) = engine::start(render.engine_config(100), hub).await.unwrap();

    let mut viewer = engine.connect("v".into()).await.unwrap();
    next_message(&mut viewer).await;

    std::fs::write(render.path().join("render.log"), b"log line").unwrap();
    std::fs::write(render.path().join("thumbnail.jpg"), b"no digits").unwrap();

    assert_quiet(&mut viewer, Duration::from_millis(600)).await;
    assert_eq!(engine.snapshot().await.unwrap().completed_frames, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removed_frame_triggers_recount() {
    let render = TestRender::new();
    render.write_frame("frame_0001.png", T0);
    let doomed = render.write_frame("frame_0002.png", T0 + 5_000);

    let hub = Arc::new(BroadcastHub::new());
    let (engine, _task) = engine::start(render.engine_config(100), hub).await.unwrap();
    let mut viewer = engine.connect("v".into()).await.unwrap();
    next_message(&mut viewer).await;

    std::fs::remove_file(doomed).unwrap();

    let after = wait_for_update(&mut viewer, |s| s.completed_frames == 1).await;
    assert_eq!(after.last_frame_timestamp, Some(T0));
}

// ---------------------------------------------------------------------------
// Periodic reconciliation catches frames the watcher never reported
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconciliation_picks_up_missed_frames() {
    let render = TestRender::new();
    let mut config = render.engine_config(100);
    // The watcher will not report anything within the test window
    config.watch.stability_threshold = Duration::from_secs(600);
    config.reconcile_interval = Duration::from_millis(250);

    let hub = Arc::new(BroadcastHub::new());
    let (engine, _task) = engine::start(config, hub).await.unwrap();
    let mut viewer = engine.connect("v".into()).await.unwrap();
    next_message(&mut viewer).await;

    render.write_frame("frame_0001.png", T0);
    render.write_frame("frame_0002.png", T0 + 8_000);

    let snapshot = wait_for_update(&mut viewer, |s| s.completed_frames == 2).await;
    assert_eq!(secs(snapshot.stats().last_frame_time), Some(8.0));
}

// ---------------------------------------------------------------------------
// Overshoot
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn percentage_is_not_clamped() {
    let render = TestRender::new();
    for i in 1..=5u64 {
        render.write_frame(&format!("frame_{i:04}.png"), T0 + i * 1_000);
    }

    let hub = Arc::new(BroadcastHub::new());
    let (engine, _task) = engine::start(render.engine_config(4), hub).await.unwrap();

    let snapshot = engine.snapshot().await.unwrap();
    assert_eq!(snapshot.completed_frames, 5);
    assert!((snapshot.percentage - 125.0).abs() < 1e-9);
    assert!(snapshot.stats().eta.is_none());
}
