//! The capture process tree that turns pipe bytes into a cast file.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::tmux::PaneSize;

/// Everything a launcher needs to build one capture tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePlan {
    pub pipe_path: PathBuf,
    pub output_path: PathBuf,
    pub size: PaneSize,
}

/// Builds the root command of a capture tree.
///
/// The tree must keep the pipe open for reading for as long as it runs and
/// write a cast file at `plan.output_path`. The recorder spawns and reaps it.
pub trait CaptureLauncher: Send + Sync {
    fn command(&self, plan: &CapturePlan) -> Command;
}

/// `asciinema rec` inside a `script` pty sized like the pane, fed by `tail`.
#[derive(Debug, Clone, Default)]
pub struct AsciinemaCapture;

impl AsciinemaCapture {
    /// Reader that copies the pipe to stdout from its first byte on.
    ///
    /// Without `-n +1`, `tail` holds FIFO input back until end-of-file, which
    /// never comes while the recorder keeps its writer open.
    pub fn feed_command(pipe_path: &Path) -> String {
        format!(
            "stdbuf -o0 tail -n +1 -F {} 2>&1",
            shell_words::quote(&pipe_path.to_string_lossy())
        )
    }

    fn inner_script(plan: &CapturePlan) -> String {
        let feed = Self::feed_command(&plan.pipe_path);
        format!(
            "stty rows {} cols {} 2>/dev/null; asciinema rec {} -c {}",
            plan.size.rows,
            plan.size.cols,
            shell_words::quote(&plan.output_path.to_string_lossy()),
            shell_words::quote(&feed)
        )
    }
}

impl CaptureLauncher for AsciinemaCapture {
    fn command(&self, plan: &CapturePlan) -> Command {
        let mut command = Command::new("script");
        command
            .arg("-qfc")
            .arg(Self::inner_script(plan))
            .arg("/dev/null");
        command
    }
}
