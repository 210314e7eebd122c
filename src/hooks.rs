//! tmux hook callbacks.
//!
//! Each hook the server subscribes to maps to one [`HookKind`]; only focus
//! changes touch recorders, everything else is acknowledged.

use serde::Deserialize;

use crate::error::RecorderError;
use crate::registry::{recording_key, RecordingRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookKind {
    AfterNewSession,
    AfterNewWindow,
    AfterSplitWindow,
    PaneDied,
    WindowPaneChanged,
    PaneFocusIn,
    AfterResizePane,
    WindowRenamed,
    SessionRenamed,
    Unknown(String),
}

impl HookKind {
    /// Every hook tmux should be told to call back for.
    pub const SUBSCRIBED: [HookKind; 9] = [
        HookKind::AfterNewSession,
        HookKind::AfterNewWindow,
        HookKind::AfterSplitWindow,
        HookKind::PaneDied,
        HookKind::AfterResizePane,
        HookKind::WindowRenamed,
        HookKind::SessionRenamed,
        HookKind::WindowPaneChanged,
        HookKind::PaneFocusIn,
    ];

    pub fn from_name(name: &str) -> Self {
        match name {
            "after-new-session" => Self::AfterNewSession,
            "after-new-window" => Self::AfterNewWindow,
            "after-split-window" => Self::AfterSplitWindow,
            "pane-died" => Self::PaneDied,
            "window-pane-changed" => Self::WindowPaneChanged,
            "pane-focus-in" => Self::PaneFocusIn,
            "after-resize-pane" => Self::AfterResizePane,
            "window-renamed" => Self::WindowRenamed,
            "session-renamed" => Self::SessionRenamed,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::AfterNewSession => "after-new-session",
            Self::AfterNewWindow => "after-new-window",
            Self::AfterSplitWindow => "after-split-window",
            Self::PaneDied => "pane-died",
            Self::WindowPaneChanged => "window-pane-changed",
            Self::PaneFocusIn => "pane-focus-in",
            Self::AfterResizePane => "after-resize-pane",
            Self::WindowRenamed => "window-renamed",
            Self::SessionRenamed => "session-renamed",
            Self::Unknown(name) => name,
        }
    }
}

/// Format variables tmux expands into the callback body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HookEvent {
    pub pane_id: Option<String>,
    pub session_name: Option<String>,
    pub window_id: Option<String>,
    pub window_index: Option<u32>,
    pub pane_index: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    SessionCreated,
    WindowCreated,
    PaneCreated,
    PaneClosed,
    PaneSwitched,
    PaneFocused,
    PaneResized,
    WindowRenamed,
    SessionRenamed,
    Unknown,
}

impl HookAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionCreated => "session_created",
            Self::WindowCreated => "window_created",
            Self::PaneCreated => "pane_created",
            Self::PaneClosed => "pane_closed",
            Self::PaneSwitched => "pane_switched",
            Self::PaneFocused => "pane_focused",
            Self::PaneResized => "pane_resized",
            Self::WindowRenamed => "window_renamed",
            Self::SessionRenamed => "session_renamed",
            Self::Unknown => "unknown",
        }
    }
}

impl RecordingRegistry {
    pub async fn handle_hook(&self, kind: &HookKind, event: &HookEvent) -> HookAction {
        match kind {
            HookKind::AfterNewSession => HookAction::SessionCreated,
            HookKind::AfterNewWindow => HookAction::WindowCreated,
            HookKind::AfterSplitWindow => HookAction::PaneCreated,
            HookKind::PaneDied => HookAction::PaneClosed,
            HookKind::WindowPaneChanged => {
                self.follow_focus(event).await;
                HookAction::PaneSwitched
            }
            HookKind::PaneFocusIn => {
                self.follow_focus(event).await;
                HookAction::PaneFocused
            }
            // Recordings keep the size they started with.
            HookKind::AfterResizePane => HookAction::PaneResized,
            HookKind::WindowRenamed => HookAction::WindowRenamed,
            HookKind::SessionRenamed => HookAction::SessionRenamed,
            HookKind::Unknown(name) => {
                tracing::debug!(hook = %name, "ignoring unknown hook");
                HookAction::Unknown
            }
        }
    }

    async fn follow_focus(&self, event: &HookEvent) {
        let (Some(session), Some(window), Some(pane)) = (
            event.session_name.as_deref(),
            event.window_id.as_deref(),
            event.pane_id.as_deref(),
        ) else {
            return;
        };

        match self.switch_pane(session, window, pane).await {
            Ok(_) | Err(RecorderError::NotFound { .. }) => {}
            Err(error) => tracing::warn!(
                key = %recording_key(session, window),
                pane,
                %error,
                "failed to follow pane focus"
            ),
        }
    }
}
