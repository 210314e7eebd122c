//! Continuous tmux window recording.
//!
//! Invariant: single output gate. Only `core::output::OutputGate::flush(..)`
//! writes into a recording pipe, and only after confirming a reader.
//!
//! # Public API Overview
//! - [`RecordingRegistry`] is the control surface: create, stop, list and
//!   status of recordings keyed by `session:window`, plus tmux hook dispatch.
//! - [`Recorder`] is the per-window state machine behind it.
//! - [`PaneSource`] and [`CaptureLauncher`] are the seams to tmux and to the
//!   capture process tree.
//! - Process-tree ownership comes from the `proc_tree` crate, cast file
//!   repair from `cast_store`.

pub mod capture;
pub mod config;
pub mod core;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod paths;
pub mod platform;
pub mod recorder;
pub mod registry;
pub mod tmux;

pub use crate::capture::{AsciinemaCapture, CaptureLauncher, CapturePlan};
pub use crate::config::EnvConfig;
pub use crate::error::{RecorderError, TmuxError};
pub use crate::hooks::{HookAction, HookEvent, HookKind};
pub use crate::platform::HostIdentity;
pub use crate::recorder::{
    local_now, Clock, Recorder, RecorderContext, RecorderSettings, RecorderState, RecordingState,
};
pub use crate::registry::{
    parse_recording_key, recording_key, CreateRecording, RecordingListing, RecordingRegistry,
    RecordingStatus,
};
pub use crate::tmux::{PaneCursor, PaneSize, PaneSource, TmuxCli};
