use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("window {key} is already being recorded")]
    AlreadyRecording { key: String },

    #[error("no recording for {key}")]
    NotFound { key: String },

    #[error("'{key}' is not a session:window recording key")]
    InvalidKey { key: String },

    #[error("failed to create pipe at {path}: {source}")]
    SetupPipe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create output directory {path}: {source}")]
    SetupOutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Spawn(#[from] proc_tree::ProcTreeError),

    #[error("capture process {pid} exited right after spawn")]
    CaptureExited { pid: u32 },

    #[error("no reader attached to {path} after {attempts} attempts")]
    NoReader { path: PathBuf, attempts: u32 },

    #[error("failed to write into pipe {path}: {source}")]
    PipeWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Tmux(#[from] TmuxError),
}

impl RecorderError {
    #[must_use]
    pub fn setup_pipe(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SetupPipe {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn setup_output_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SetupOutputDir {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn pipe_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PipeWrite {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum TmuxError {
    #[error("failed to run tmux {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tmux {command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("unexpected output from tmux {command}: {output:?}")]
    Parse { command: String, output: String },
}

impl TmuxError {
    #[must_use]
    pub fn parse(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Parse {
            command: command.into(),
            output: output.into(),
        }
    }
}
