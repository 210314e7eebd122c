//! Pane metadata and live output feeds.
//!
//! [`PaneSource`] is everything the recorder needs from tmux. [`TmuxCli`]
//! implements it by shelling out to the `tmux` binary.

use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use crate::error::TmuxError;

/// Dimensions used when tmux cannot report a pane's size.
pub const FALLBACK_PANE_SIZE: PaneSize = PaneSize { cols: 80, rows: 24 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for PaneSize {
    fn default() -> Self {
        FALLBACK_PANE_SIZE
    }
}

/// Zero-based cursor position as tmux reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneCursor {
    pub x: u32,
    pub y: u32,
    pub visible: bool,
}

impl Default for PaneCursor {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            visible: true,
        }
    }
}

pub trait PaneSource: Send + Sync {
    fn pane_size(&self, pane: &str) -> Result<PaneSize, TmuxError>;

    /// Visible pane content with escape sequences and trailing spaces kept.
    fn capture_pane(&self, pane: &str) -> Result<Vec<u8>, TmuxError>;

    fn cursor(&self, pane: &str) -> Result<PaneCursor, TmuxError>;

    fn window_name(&self, window: &str) -> Result<String, TmuxError>;

    /// Start appending the pane's live output to `pipe`.
    fn attach_feed(&self, pane: &str, pipe: &Path) -> Result<(), TmuxError>;

    /// Stop whatever feed the pane currently has.
    fn detach_feed(&self, pane: &str) -> Result<(), TmuxError>;
}

#[derive(Debug, Clone)]
pub struct TmuxCli {
    program: OsString,
}

impl Default for TmuxCli {
    fn default() -> Self {
        Self::new()
    }
}

impl TmuxCli {
    pub fn new() -> Self {
        Self::with_program("tmux")
    }

    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>, TmuxError> {
        let command = args.first().copied().unwrap_or_default().to_string();
        tracing::debug!(?args, "running tmux");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| TmuxError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TmuxError::Failed {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    fn display(&self, target: &str, format: &str) -> Result<String, TmuxError> {
        let stdout = self.run(&["display-message", "-p", "-t", target, format])?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }
}

impl PaneSource for TmuxCli {
    fn pane_size(&self, pane: &str) -> Result<PaneSize, TmuxError> {
        let reply = self.display(pane, "#{pane_width} #{pane_height}")?;
        parse_size(&reply).ok_or_else(|| TmuxError::parse("display-message", reply))
    }

    fn capture_pane(&self, pane: &str) -> Result<Vec<u8>, TmuxError> {
        self.run(&["capture-pane", "-e", "-p", "-N", "-t", pane])
    }

    fn cursor(&self, pane: &str) -> Result<PaneCursor, TmuxError> {
        let reply = self.display(pane, "#{cursor_x} #{cursor_y} #{cursor_flag}")?;
        parse_cursor(&reply).ok_or_else(|| TmuxError::parse("display-message", reply))
    }

    fn window_name(&self, window: &str) -> Result<String, TmuxError> {
        self.display(window, "#{window_name}")
    }

    fn attach_feed(&self, pane: &str, pipe: &Path) -> Result<(), TmuxError> {
        let feed = format!("cat >> {}", shell_words::quote(&pipe.to_string_lossy()));
        self.run(&["pipe-pane", "-t", pane, &feed])?;
        tracing::debug!(pane, pipe = %pipe.display(), "pane feed attached");
        Ok(())
    }

    fn detach_feed(&self, pane: &str) -> Result<(), TmuxError> {
        // pipe-pane with no command closes the pane's current pipe.
        self.run(&["pipe-pane", "-t", pane])?;
        tracing::debug!(pane, "pane feed detached");
        Ok(())
    }
}

fn parse_size(reply: &str) -> Option<PaneSize> {
    let mut parts = reply.split_whitespace();
    let cols = parts.next()?.parse().ok()?;
    let rows = parts.next()?.parse().ok()?;
    if cols == 0 || rows == 0 {
        return None;
    }
    Some(PaneSize { cols, rows })
}

fn parse_cursor(reply: &str) -> Option<PaneCursor> {
    let mut parts = reply.split_whitespace();
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    let visible = parts.next().map_or(true, |flag| flag != "0");
    Some(PaneCursor { x, y, visible })
}
