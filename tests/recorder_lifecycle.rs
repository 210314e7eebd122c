#![cfg(target_os = "linux")]

mod support;

use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use support::{
    feed_path, read_feed, screen, DeafCapture, ExitingCapture, FeedCall, Fixture, ShellCapture,
    TailCapture, HEADER, TRAILER,
};
use tvmux::{paths, Recorder, RecorderError, RecorderState};

fn is_fifo(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_fifo())
        .unwrap_or(false)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_switch_stop_round_trip() {
    let mut fixture = Fixture::new();
    fixture.settings.trailer_pause = Duration::from_millis(200);
    let mut recorder = Recorder::new(
        fixture.ctx(ShellCapture::default()),
        "main",
        "@1",
        fixture.output_dir(),
    );

    recorder.start("%3").await.expect("recording starts");
    assert!(recorder.is_recording());

    let state = recorder.state().expect("live state");
    assert!(state.recording);
    assert_eq!(state.active_pane, "%3");
    assert_eq!(
        state.pipe_path,
        paths::pipe_path(
            &fixture.settings.runtime_dir,
            &fixture.identity,
            "main",
            "@1"
        )
    );
    assert!(is_fifo(&state.pipe_path));
    assert_eq!(state.output_path, fixture.expected_output());
    assert!(fixture.processes.is_managed(state.capture_pid));

    assert!(recorder.switch_pane("%7").await.expect("switch succeeds"));
    assert_eq!(recorder.active_pane(), Some("%7"));

    assert!(recorder.stop().await);
    assert_eq!(recorder.phase(), RecorderState::Idle);
    assert!(recorder.state().is_none());
    assert!(!is_fifo(&state.pipe_path));
    assert!(fixture.processes.managed_pids().is_empty());

    let summary = cast_store::validate(&state.output_path).expect("cast file parses");
    assert_eq!(summary.header.version, 2);
    assert_eq!(summary.events, 0);

    let expected = [screen("%3"), screen("%7"), TRAILER.to_vec()].concat();
    let feed = read_feed(&feed_path(&state.output_path), expected.len()).await;
    assert_eq!(String::from_utf8_lossy(&feed), String::from_utf8_lossy(&expected));

    assert_eq!(
        fixture.panes.calls(),
        vec![
            FeedCall::Attach("%3".to_string()),
            FeedCall::Detach("%3".to_string()),
            FeedCall::Attach("%7".to_string()),
            FeedCall::Detach("%7".to_string()),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tail_reader_streams_snapshots_while_recording() {
    let mut fixture = Fixture::new();
    fixture.settings.trailer_pause = Duration::from_millis(200);
    let mut recorder = Recorder::new(fixture.ctx(TailCapture), "main", "@1", fixture.output_dir());

    recorder.start("%3").await.expect("recording starts");
    let feed = feed_path(recorder.output_path().expect("output path"));

    let first = screen("%3");
    assert_eq!(
        String::from_utf8_lossy(&read_feed(&feed, first.len()).await),
        String::from_utf8_lossy(&first)
    );

    assert!(recorder.switch_pane("%7").await.expect("switch succeeds"));
    let both = [first, screen("%7")].concat();
    assert_eq!(
        String::from_utf8_lossy(&read_feed(&feed, both.len()).await),
        String::from_utf8_lossy(&both)
    );

    assert!(recorder.stop().await);
    assert!(fixture.processes.managed_pids().is_empty());
    let expected = [both, TRAILER.to_vec()].concat();
    assert_eq!(
        String::from_utf8_lossy(&read_feed(&feed, expected.len()).await),
        String::from_utf8_lossy(&expected)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_switch_to_same_pane_is_a_no_op() {
    let fixture = Fixture::new();
    let mut recorder = Recorder::new(
        fixture.ctx(ShellCapture::default()),
        "main",
        "@2",
        fixture.output_dir(),
    );
    recorder.start("%1").await.expect("recording starts");

    assert!(recorder.switch_pane("%5").await.expect("first switch"));
    assert!(!recorder.switch_pane("%5").await.expect("second switch"));
    assert!(!recorder.switch_pane("%5").await.expect("third switch"));

    assert_eq!(fixture.panes.attaches(), 2);
    assert_eq!(fixture.panes.detaches(), 1);

    assert!(recorder.stop().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_reader_fails_start_and_cleans_up() {
    let mut fixture = Fixture::new();
    fixture.settings.ready_attempts = 5;
    let mut recorder = Recorder::new(
        fixture.ctx(DeafCapture),
        "main",
        "@3",
        fixture.output_dir(),
    );
    let pipe = recorder.pipe_path();

    let started = Instant::now();
    let error = recorder.start("%1").await.expect_err("no reader ever attaches");
    assert!(started.elapsed() < Duration::from_secs(3));

    assert!(matches!(error, RecorderError::NoReader { attempts: 5, .. }));
    assert_eq!(recorder.phase(), RecorderState::Idle);
    assert!(!pipe.exists());
    assert!(fixture.processes.managed_pids().is_empty());
    assert_eq!(fixture.panes.attaches(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn capture_that_dies_fails_start() {
    let fixture = Fixture::new();
    let mut recorder = Recorder::new(
        fixture.ctx(ExitingCapture),
        "main",
        "@4",
        fixture.output_dir(),
    );
    let pipe = recorder.pipe_path();

    let error = recorder.start("%1").await.expect_err("capture exits");
    assert!(matches!(error, RecorderError::CaptureExited { .. }));
    assert!(!pipe.exists());
    assert!(fixture.processes.managed_pids().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn occupied_pipe_path_fails_before_spawning() {
    let fixture = Fixture::new();
    let mut recorder = Recorder::new(
        fixture.ctx(ShellCapture::default()),
        "main",
        "@5",
        fixture.output_dir(),
    );
    let pipe = recorder.pipe_path();
    fs::create_dir_all(pipe.parent().expect("session dir")).expect("mkdir");
    fs::write(&pipe, b"not a pipe").expect("occupy path");

    let error = recorder.start("%1").await.expect_err("path is taken");
    assert!(matches!(error, RecorderError::SetupPipe { .. }));
    assert!(fixture.processes.managed_pids().is_empty());
    assert_eq!(fs::read(&pipe).expect("file kept"), b"not a pipe");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_start_is_rejected_while_recording() {
    let fixture = Fixture::new();
    let mut recorder = Recorder::new(
        fixture.ctx(ShellCapture::default()),
        "main",
        "@6",
        fixture.output_dir(),
    );
    recorder.start("%1").await.expect("recording starts");

    let error = recorder.start("%2").await.expect_err("already recording");
    assert!(matches!(error, RecorderError::AlreadyRecording { .. }));
    assert_eq!(recorder.active_pane(), Some("%1"));
    assert_eq!(fixture.processes.managed_pids().len(), 1);

    assert!(recorder.stop().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_and_switch_without_recording_do_nothing() {
    let fixture = Fixture::new();
    let mut recorder = Recorder::new(
        fixture.ctx(ShellCapture::default()),
        "main",
        "@7",
        fixture.output_dir(),
    );

    assert!(!recorder.switch_pane("%2").await.expect("no-op"));
    assert!(!recorder.stop().await);
    assert!(fixture.panes.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_repairs_truncated_cast_tail() {
    let fixture = Fixture::new();
    let body = format!("{HEADER}\n[0.5, \"o\", \"hi\"]\n[1.0, \"o\", \"tru");
    let mut recorder = Recorder::new(
        fixture.ctx(ShellCapture { body: body.clone() }),
        "main",
        "@8",
        fixture.output_dir(),
    );
    recorder.start("%1").await.expect("recording starts");
    let output = recorder.output_path().expect("output path").to_path_buf();

    assert!(recorder.stop().await);

    let summary = cast_store::validate(&output).expect("repaired file parses");
    assert_eq!(summary.events, 1);
    let backup = cast_store::backup_path_for(&output);
    assert_eq!(fs::read_to_string(backup).expect("backup kept"), body);
}
