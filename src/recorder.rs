//! Per-window recorder: owns one pipe and one capture tree, follows the active pane.
//!
//! Lifecycle: `Idle -> Starting -> Recording -> Stopping -> Idle`.
//!
//! Invariants:
//! - The pipe exists on disk exactly while the recorder is `Recording`.
//! - Nothing is written into the pipe unless a reader was confirmed for that
//!   write (see [`OutputGate::flush`]).
//! - A failed `start` leaves no pipe and no capture tree behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cast_store::RepairOptions;
use proc_tree::ProcessTreeManager;
use time::OffsetDateTime;

use crate::capture::{AsciinemaCapture, CaptureLauncher, CapturePlan};
use crate::config::{self, EnvConfig};
use crate::core::output::{self, OutputGate};
use crate::error::RecorderError;
use crate::paths;
use crate::platform::{Fifo, FifoWriter, HostIdentity};
use crate::tmux::{PaneCursor, PaneSource, TmuxCli, FALLBACK_PANE_SIZE};

/// Longest a single pipe write may wait for the reader to drain.
const PIPE_WRITE_STALL: Duration = Duration::from_secs(1);

pub type Clock = fn() -> OffsetDateTime;

pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderSettings {
    pub runtime_dir: PathBuf,
    /// Reader probes after spawn before giving up.
    pub ready_attempts: u32,
    pub ready_delay: Duration,
    /// Wait before the first liveness check of a fresh capture tree.
    pub spawn_grace: Duration,
    /// Pause after the stop trailer so the reader can consume it.
    pub trailer_pause: Duration,
    pub terminate_timeout: Duration,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            runtime_dir: config::default_runtime_dir(),
            ready_attempts: config::DEFAULT_READY_ATTEMPTS,
            ready_delay: config::DEFAULT_READY_DELAY,
            spawn_grace: config::DEFAULT_SPAWN_GRACE,
            trailer_pause: config::DEFAULT_TRAILER_PAUSE,
            terminate_timeout: config::DEFAULT_TERMINATE_TIMEOUT,
        }
    }
}

/// Collaborators shared by every recorder of one registry.
#[derive(Clone)]
pub struct RecorderContext {
    pub panes: Arc<dyn PaneSource>,
    pub processes: Arc<ProcessTreeManager>,
    pub launcher: Arc<dyn CaptureLauncher>,
    pub settings: RecorderSettings,
    pub identity: HostIdentity,
    pub clock: Clock,
}

impl RecorderContext {
    pub fn new(
        panes: Arc<dyn PaneSource>,
        processes: Arc<ProcessTreeManager>,
        launcher: Arc<dyn CaptureLauncher>,
        settings: RecorderSettings,
        identity: HostIdentity,
    ) -> Self {
        Self {
            panes,
            processes,
            launcher,
            settings,
            identity,
            clock: local_now,
        }
    }

    /// tmux CLI, asciinema capture and the host we run on.
    pub fn from_env(config: &EnvConfig, processes: Arc<ProcessTreeManager>) -> Self {
        Self::new(
            Arc::new(TmuxCli::new()),
            processes,
            Arc::new(AsciinemaCapture),
            config.recorder_settings(),
            HostIdentity::detect(config.tmux_socket.clone()),
        )
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl std::fmt::Debug for RecorderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderContext")
            .field("settings", &self.settings)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Starting,
    Recording,
    Stopping,
}

/// Read-only view of a live recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingState {
    pub session_id: String,
    pub window_id: String,
    pub active_pane: String,
    pub capture_pid: u32,
    pub pipe_path: PathBuf,
    pub output_path: PathBuf,
    pub recording: bool,
}

struct Active {
    fifo: Fifo,
    /// Held so readers never see EOF between our short-lived writes.
    keepalive: FifoWriter,
    capture_pid: u32,
    output_path: PathBuf,
    active_pane: String,
}

pub struct Recorder {
    ctx: RecorderContext,
    session_id: String,
    window_id: String,
    output_dir: PathBuf,
    state: RecorderState,
    active: Option<Active>,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("session_id", &self.session_id)
            .field("window_id", &self.window_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Recorder {
    pub fn new(
        ctx: RecorderContext,
        session_id: impl Into<String>,
        window_id: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ctx,
            session_id: session_id.into(),
            window_id: window_id.into(),
            output_dir: output_dir.into(),
            state: RecorderState::Idle,
            active: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn window_id(&self) -> &str {
        &self.window_id
    }

    pub fn phase(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    pub fn active_pane(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.active_pane.as_str())
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|active| active.output_path.as_path())
    }

    /// Where this window's pipe lives while recording.
    pub fn pipe_path(&self) -> PathBuf {
        paths::pipe_path(
            &self.ctx.settings.runtime_dir,
            &self.ctx.identity,
            &self.session_id,
            &self.window_id,
        )
    }

    pub fn state(&self) -> Option<RecordingState> {
        self.active.as_ref().map(|active| RecordingState {
            session_id: self.session_id.clone(),
            window_id: self.window_id.clone(),
            active_pane: active.active_pane.clone(),
            capture_pid: active.capture_pid,
            pipe_path: active.fifo.path().to_path_buf(),
            output_path: active.output_path.clone(),
            recording: self.is_recording(),
        })
    }

    /// Start recording with `active_pane` as the first streamed pane.
    pub async fn start(&mut self, active_pane: &str) -> Result<(), RecorderError> {
        if self.state != RecorderState::Idle {
            return Err(RecorderError::AlreadyRecording {
                key: format!("{}:{}", self.session_id, self.window_id),
            });
        }

        self.state = RecorderState::Starting;
        tracing::debug!(session = %self.session_id, window = %self.window_id, "recorder starting");
        match self.launch(active_pane).await {
            Ok(active) => {
                tracing::info!(
                    session = %self.session_id,
                    window = %self.window_id,
                    pane = active_pane,
                    pid = active.capture_pid,
                    output = %active.output_path.display(),
                    "recording started"
                );
                self.active = Some(active);
                self.state = RecorderState::Recording;
                Ok(())
            }
            Err(error) => {
                tracing::error!(
                    session = %self.session_id,
                    window = %self.window_id,
                    %error,
                    "recording failed to start"
                );
                self.state = RecorderState::Idle;
                Err(error)
            }
        }
    }

    async fn launch(&self, pane: &str) -> Result<Active, RecorderError> {
        let ctx = &self.ctx;
        let pipe_path = self.pipe_path();
        let output_path = self.next_output_path();

        let fifo = Fifo::create(&pipe_path)
            .map_err(|source| RecorderError::setup_pipe(&pipe_path, source))?;
        if let Some(dir) = output_path.parent() {
            fs::create_dir_all(dir).map_err(|source| RecorderError::setup_output_dir(dir, source))?;
        }

        let size = ctx.panes.pane_size(pane).unwrap_or_else(|error| {
            tracing::debug!(pane, %error, "pane size unavailable, using fallback");
            FALLBACK_PANE_SIZE
        });
        let plan = CapturePlan {
            pipe_path: pipe_path.clone(),
            output_path: output_path.clone(),
            size,
        };
        let capture_pid = ctx.processes.spawn(ctx.launcher.command(&plan))?;

        let keepalive = match self.await_reader(&fifo, capture_pid).await {
            Ok(writer) => writer,
            Err(error) => {
                self.abandon(fifo, capture_pid).await;
                return Err(error);
            }
        };

        let streaming = dump_pane(ctx.panes.as_ref(), &fifo, pane)
            .and_then(|()| ctx.panes.attach_feed(pane, fifo.path()).map_err(Into::into));
        if let Err(error) = streaming {
            drop(keepalive);
            self.abandon(fifo, capture_pid).await;
            return Err(error);
        }

        Ok(Active {
            fifo,
            keepalive,
            capture_pid,
            output_path,
            active_pane: pane.to_string(),
        })
    }

    fn next_output_path(&self) -> PathBuf {
        let window_name = match self.ctx.panes.window_name(&self.window_id) {
            Ok(name) if !name.trim().is_empty() => name,
            Ok(_) => self.window_id.clone(),
            Err(error) => {
                tracing::debug!(window = %self.window_id, %error, "window name unavailable");
                self.window_id.clone()
            }
        };
        cast_store::cast_path(
            &self.output_dir,
            (self.ctx.clock)(),
            &self.ctx.identity.host,
            &self.session_id,
            &window_name,
        )
    }

    /// Poll until the capture tree has the pipe open for reading.
    async fn await_reader(&self, fifo: &Fifo, pid: u32) -> Result<FifoWriter, RecorderError> {
        let settings = &self.ctx.settings;
        tokio::time::sleep(settings.spawn_grace).await;

        for attempt in 1..=settings.ready_attempts {
            if !self.ctx.processes.is_alive(pid) {
                return Err(RecorderError::CaptureExited { pid });
            }
            let probe = fifo
                .open_writer()
                .map_err(|source| RecorderError::pipe_write(fifo.path(), source))?;
            if let Some(writer) = probe {
                tracing::debug!(pid, attempt, "pipe reader confirmed");
                return Ok(writer);
            }
            tokio::time::sleep(settings.ready_delay).await;
        }

        Err(RecorderError::NoReader {
            path: fifo.path().to_path_buf(),
            attempts: settings.ready_attempts,
        })
    }

    /// Tear down a start that failed after the capture tree was spawned.
    async fn abandon(&self, fifo: Fifo, pid: u32) {
        terminate_capture(&self.ctx, pid).await;
        let path = fifo.path().to_path_buf();
        if let Err(error) = fifo.remove() {
            tracing::warn!(path = %path.display(), %error, "failed to remove pipe");
        }
    }

    /// Follow focus to `pane`. Returns `Ok(false)` when nothing had to change.
    pub async fn switch_pane(&mut self, pane: &str) -> Result<bool, RecorderError> {
        if self.state != RecorderState::Recording {
            return Ok(false);
        }
        let Some(active) = self.active.as_mut() else {
            return Ok(false);
        };
        if active.active_pane == pane {
            return Ok(false);
        }

        let panes = self.ctx.panes.as_ref();
        let previous = active.active_pane.clone();
        if let Err(error) = panes.detach_feed(&previous) {
            tracing::warn!(pane = %previous, %error, "failed to detach pane feed");
        }

        let switched = dump_pane(panes, &active.fifo, pane)
            .and_then(|()| panes.attach_feed(pane, active.fifo.path()).map_err(Into::into));
        if let Err(error) = switched {
            if let Err(reattach) = panes.attach_feed(&previous, active.fifo.path()) {
                tracing::warn!(pane = %previous, error = %reattach, "failed to restore pane feed");
            }
            return Err(error);
        }

        active.active_pane = pane.to_string();
        tracing::info!(window = %self.window_id, from = %previous, to = pane, "switched pane");
        Ok(true)
    }

    /// Finish the recording. Returns `false` when there was nothing to stop.
    ///
    /// Cleanup problems are logged, never returned: once this runs the
    /// recording is over and the recorder is `Idle` again.
    pub async fn stop(&mut self) -> bool {
        if self.state != RecorderState::Recording {
            return false;
        }
        let Some(active) = self.active.take() else {
            self.state = RecorderState::Idle;
            return false;
        };
        self.state = RecorderState::Stopping;

        let Active {
            fifo,
            keepalive,
            capture_pid,
            output_path,
            active_pane,
        } = active;

        if let Err(error) = self.ctx.panes.detach_feed(&active_pane) {
            tracing::warn!(pane = %active_pane, %error, "failed to detach pane feed");
        }

        let mut gate = OutputGate::new();
        gate.extend(output::stop_trailer());
        if let Err(error) = gate.flush(&fifo, PIPE_WRITE_STALL) {
            tracing::warn!(%error, "stop trailer not written");
        }
        tokio::time::sleep(self.ctx.settings.trailer_pause).await;
        drop(keepalive);

        terminate_capture(&self.ctx, capture_pid).await;

        let pipe_path = fifo.path().to_path_buf();
        if let Err(error) = fifo.remove() {
            tracing::warn!(path = %pipe_path.display(), %error, "failed to remove pipe");
        }

        repair_output(output_path.clone()).await;

        self.state = RecorderState::Idle;
        tracing::info!(
            session = %self.session_id,
            window = %self.window_id,
            output = %output_path.display(),
            "recording stopped"
        );
        true
    }
}

/// Clear the screen and redraw `pane` into the pipe.
fn dump_pane(panes: &dyn PaneSource, fifo: &Fifo, pane: &str) -> Result<(), RecorderError> {
    let content = panes.capture_pane(pane)?;
    let cursor = panes.cursor(pane).unwrap_or_else(|error| {
        tracing::debug!(pane, %error, "cursor unavailable, homing");
        PaneCursor::default()
    });

    let mut gate = OutputGate::new();
    gate.extend(output::snapshot(&content, cursor));
    gate.flush(fifo, PIPE_WRITE_STALL)
}

async fn terminate_capture(ctx: &RecorderContext, pid: u32) {
    let processes = Arc::clone(&ctx.processes);
    let timeout = ctx.settings.terminate_timeout;
    match tokio::task::spawn_blocking(move || processes.terminate(pid, timeout)).await {
        Ok(true) => tracing::debug!(pid, "capture tree terminated"),
        Ok(false) => tracing::warn!(pid, "capture tree may have survived termination"),
        Err(error) => tracing::warn!(pid, %error, "capture termination task failed"),
    }
}

async fn repair_output(path: PathBuf) {
    let target = path.clone();
    let repaired = tokio::task::spawn_blocking(move || {
        cast_store::repair(&target, RepairOptions::with_backup())
    })
    .await;

    match repaired {
        Ok(Ok(outcome)) if outcome.was_rewritten() => {
            tracing::warn!(path = %path.display(), ?outcome, "truncated corrupt cast tail");
        }
        Ok(Ok(outcome)) => {
            tracing::debug!(path = %path.display(), events = outcome.events(), "cast file intact");
        }
        Ok(Err(error)) => tracing::warn!(path = %path.display(), %error, "cast repair failed"),
        Err(error) => tracing::warn!(path = %path.display(), %error, "cast repair task failed"),
    }
}
