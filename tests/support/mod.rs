#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use proc_tree::ProcessTreeManager;
use time::macros::datetime;
use time::OffsetDateTime;
use tvmux::{
    AsciinemaCapture, CaptureLauncher, CapturePlan, HostIdentity, PaneCursor, PaneSize, PaneSource,
    RecorderContext, RecorderSettings, TmuxError,
};

pub const HEADER: &str = r#"{"version": 2, "width": 100, "height": 30}"#;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn fixed_clock() -> OffsetDateTime {
    datetime!(2024-01-15 09:05 UTC)
}

/// Bytes `FakePanes` snapshots produce for `pane`, as they arrive in the pipe.
pub fn screen(pane: &str) -> Vec<u8> {
    format!("\x1b[0m\x1b[2J\x1b[H$ echo {pane}  \r\n{pane}\x1b[2;3H\x1b[?25h").into_bytes()
}

pub const TRAILER: &[u8] = b"\x1b[0m\x1b[?25h\x1b[2J\x1b[H\x1b(B\x1b[r\n";

/// Where the fake capture processes copy what they read from the pipe.
pub fn feed_path(output: &Path) -> PathBuf {
    output.with_extension("feed")
}

/// Read the feed copy once it holds at least `len` bytes, or give up after 3 s.
pub async fn read_feed(path: &Path, len: usize) -> Vec<u8> {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let bytes = std::fs::read(path).unwrap_or_default();
        if bytes.len() >= len || Instant::now() >= deadline {
            return bytes;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCall {
    Attach(String),
    Detach(String),
}

/// Pane source that records feed changes instead of talking to tmux.
#[derive(Debug, Default)]
pub struct FakePanes {
    calls: Mutex<Vec<FeedCall>>,
}

impl FakePanes {
    pub fn calls(&self) -> Vec<FeedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn attaches(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, FeedCall::Attach(_)))
            .count()
    }

    pub fn detaches(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, FeedCall::Detach(_)))
            .count()
    }
}

impl PaneSource for FakePanes {
    fn pane_size(&self, _pane: &str) -> Result<PaneSize, TmuxError> {
        Ok(PaneSize { cols: 100, rows: 30 })
    }

    fn capture_pane(&self, pane: &str) -> Result<Vec<u8>, TmuxError> {
        Ok(format!("$ echo {pane}  \n{pane}\n").into_bytes())
    }

    fn cursor(&self, _pane: &str) -> Result<PaneCursor, TmuxError> {
        Ok(PaneCursor {
            x: 2,
            y: 1,
            visible: true,
        })
    }

    fn window_name(&self, window: &str) -> Result<String, TmuxError> {
        if window == "@1" {
            Ok("vim /etc/hosts".to_string())
        } else {
            Ok(format!("shell {}", window.trim_start_matches('@')))
        }
    }

    fn attach_feed(&self, pane: &str, _pipe: &Path) -> Result<(), TmuxError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(FeedCall::Attach(pane.to_string()));
        Ok(())
    }

    fn detach_feed(&self, pane: &str) -> Result<(), TmuxError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(FeedCall::Detach(pane.to_string()));
        Ok(())
    }
}

/// Writes `body` as the cast file, then copies the pipe into the feed file
/// until every writer is gone.
#[derive(Debug, Clone)]
pub struct ShellCapture {
    pub body: String,
}

impl Default for ShellCapture {
    fn default() -> Self {
        Self {
            body: format!("{HEADER}\n"),
        }
    }
}

impl CaptureLauncher for ShellCapture {
    fn command(&self, plan: &CapturePlan) -> Command {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(r#"printf '%s' "$1" > "$2"; exec cat "$3" > "$4""#)
            .arg("sh")
            .arg(&self.body)
            .arg(&plan.output_path)
            .arg(&plan.pipe_path)
            .arg(feed_path(&plan.output_path));
        command
    }
}

/// Runs the production pipe reader, with the feed file standing in for asciinema.
#[derive(Debug, Clone, Default)]
pub struct TailCapture;

impl CaptureLauncher for TailCapture {
    fn command(&self, plan: &CapturePlan) -> Command {
        let script = format!(
            r#"printf '%s\n' "$1" > "$2"; exec {} > "$3""#,
            AsciinemaCapture::feed_command(&plan.pipe_path)
        );
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(script)
            .arg("sh")
            .arg(HEADER)
            .arg(&plan.output_path)
            .arg(feed_path(&plan.output_path));
        command
    }
}

/// Stays alive but never opens the pipe.
#[derive(Debug, Clone, Default)]
pub struct DeafCapture;

impl CaptureLauncher for DeafCapture {
    fn command(&self, _plan: &CapturePlan) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg("exec sleep 30");
        command
    }
}

/// Exits immediately.
#[derive(Debug, Clone, Default)]
pub struct ExitingCapture;

impl CaptureLauncher for ExitingCapture {
    fn command(&self, _plan: &CapturePlan) -> Command {
        Command::new("true")
    }
}

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub panes: Arc<FakePanes>,
    pub processes: Arc<ProcessTreeManager>,
    pub identity: HostIdentity,
    pub settings: RecorderSettings,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = RecorderSettings {
            runtime_dir: dir.path().join("run"),
            ready_attempts: 50,
            ready_delay: Duration::from_millis(20),
            spawn_grace: Duration::from_millis(20),
            trailer_pause: Duration::from_millis(10),
            terminate_timeout: Duration::from_millis(500),
        };
        Self {
            dir,
            panes: Arc::new(FakePanes::default()),
            processes: Arc::new(ProcessTreeManager::new()),
            identity: HostIdentity::new("testhost", "/tmp/tmux-1000/default,1,0"),
            settings,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("casts")
    }

    pub fn ctx(&self, launcher: impl CaptureLauncher + 'static) -> RecorderContext {
        RecorderContext::new(
            self.panes.clone(),
            Arc::clone(&self.processes),
            Arc::new(launcher),
            self.settings.clone(),
            self.identity.clone(),
        )
        .with_clock(fixed_clock)
    }

    pub fn expected_output(&self) -> PathBuf {
        self.output_dir()
            .join("2024-01")
            .join("2024-01-15_0905_testhost_main_vim _etc_hosts.cast")
    }
}
