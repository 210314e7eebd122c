#![cfg(target_os = "linux")]

mod support;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use support::{DeafCapture, Fixture, ShellCapture};
use tvmux::{
    CreateRecording, HookAction, HookEvent, HookKind, RecorderError, RecordingRegistry,
    RecordingStatus,
};

fn request(window: &str, pane: &str) -> CreateRecording {
    CreateRecording {
        session_id: "main".to_string(),
        window_id: window.to_string(),
        active_pane: pane.to_string(),
        output_dir: None,
    }
}

fn focus(window: &str, pane: &str) -> HookEvent {
    HookEvent {
        pane_id: Some(pane.to_string()),
        session_name: Some("main".to_string()),
        window_id: Some(window.to_string()),
        ..HookEvent::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn create_list_stop() {
    let fixture = Fixture::new();
    let registry = RecordingRegistry::new(fixture.ctx(ShellCapture::default()), fixture.output_dir());

    let status = registry
        .create_recording(request("@1", "%3"))
        .await
        .expect("recording created");
    assert!(status.recording);
    assert_eq!(status.active_pane.as_deref(), Some("%3"));
    assert_eq!(status.output_path, Some(fixture.expected_output()));

    let listings = registry.list_recordings().await;
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].id, "main:@1");
    assert_eq!(listings[0].session_id, "main");
    assert_eq!(listings[0].window_id, "@1");

    let stopped = registry.stop_recording("main:@1").await.expect("stopped");
    assert!(!stopped.recording);
    assert!(registry.is_empty());
    assert!(registry.list_recordings().await.is_empty());
    assert!(fixture.processes.managed_pids().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn create_twice_returns_existing_recording() {
    let fixture = Fixture::new();
    let registry = RecordingRegistry::new(fixture.ctx(ShellCapture::default()), fixture.output_dir());

    let first = registry
        .create_recording(request("@1", "%3"))
        .await
        .expect("first create");
    let second = registry
        .create_recording(request("@1", "%9"))
        .await
        .expect("second create");

    assert_eq!(first, second);
    assert_eq!(fixture.processes.managed_pids().len(), 1);

    assert_eq!(registry.shutdown().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_create_leaves_no_entry() {
    let mut fixture = Fixture::new();
    fixture.settings.ready_attempts = 3;
    let registry = RecordingRegistry::new(fixture.ctx(DeafCapture), fixture.output_dir());

    let error = registry
        .create_recording(request("@1", "%3"))
        .await
        .expect_err("no reader");
    assert!(matches!(error, RecorderError::NoReader { .. }));
    assert!(registry.is_empty());
    assert_eq!(
        registry.recording_status("main", "@1").await,
        RecordingStatus::idle()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_rejects_unknown_and_malformed_keys() {
    let fixture = Fixture::new();
    let registry = RecordingRegistry::new(fixture.ctx(ShellCapture::default()), fixture.output_dir());

    let missing = registry.stop_recording("main:@9").await.expect_err("unknown");
    assert!(matches!(missing, RecorderError::NotFound { .. }));

    let malformed = registry.stop_recording("main").await.expect_err("no colon");
    assert!(matches!(malformed, RecorderError::InvalidKey { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn focus_hooks_follow_the_active_pane() {
    let fixture = Fixture::new();
    let registry = RecordingRegistry::new(fixture.ctx(ShellCapture::default()), fixture.output_dir());
    registry
        .create_recording(request("@1", "%3"))
        .await
        .expect("recording created");

    let action = registry
        .handle_hook(&HookKind::from_name("pane-focus-in"), &focus("@1", "%4"))
        .await;
    assert_eq!(action, HookAction::PaneFocused);
    assert_eq!(
        registry.recording_status("main", "@1").await.active_pane.as_deref(),
        Some("%4")
    );

    let action = registry
        .handle_hook(&HookKind::WindowPaneChanged, &focus("@1", "%4"))
        .await;
    assert_eq!(action, HookAction::PaneSwitched);
    assert_eq!(fixture.panes.attaches(), 2);

    // Windows that are not being recorded are acknowledged and left alone.
    let action = registry
        .handle_hook(&HookKind::PaneFocusIn, &focus("@2", "%8"))
        .await;
    assert_eq!(action, HookAction::PaneFocused);
    assert_eq!(fixture.panes.attaches(), 2);

    let action = registry
        .handle_hook(&HookKind::AfterResizePane, &focus("@1", "%4"))
        .await;
    assert_eq!(action, HookAction::PaneResized);

    registry.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn windows_record_concurrently_and_shutdown_stops_all() {
    let fixture = Fixture::new();
    let registry = Arc::new(RecordingRegistry::new(
        fixture.ctx(ShellCapture::default()),
        fixture.output_dir(),
    ));

    let a = tokio::spawn({
        let registry = Arc::clone(&registry);
        async move { registry.create_recording(request("@1", "%1")).await }
    });
    let b = tokio::spawn({
        let registry = Arc::clone(&registry);
        async move { registry.create_recording(request("@2", "%2")).await }
    });
    a.await.expect("task a").expect("window @1 records");
    b.await.expect("task b").expect("window @2 records");

    assert_eq!(registry.keys(), vec!["main:@1".to_string(), "main:@2".to_string()]);
    assert_eq!(fixture.processes.managed_pids().len(), 2);

    assert_eq!(registry.shutdown().await, 2);
    assert!(registry.is_empty());
    assert!(fixture.processes.managed_pids().is_empty());
}
