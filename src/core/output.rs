//! Typed terminal output commands and a single output gate.
//!
//! Invariant: every byte the recorder puts into a pipe goes through
//! `OutputGate::flush(..)`, which re-checks for a reader first.

use std::time::Duration;

use crate::error::RecorderError;
use crate::platform::fifo::Fifo;
use crate::tmux::PaneCursor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCmd {
    /// Raw bytes, typically captured pane content.
    Bytes(Vec<u8>),
    /// Static raw bytes/control sequences.
    BytesStatic(&'static str),

    ResetAttributes,
    ClearScreen,
    CursorHome,
    /// One-based cursor position.
    MoveCursor {
        row: u32,
        col: u32,
    },
    HideCursor,
    ShowCursor,
    /// Select US-ASCII into G0.
    ResetCharset,
    ResetScrollRegion,
}

impl TerminalCmd {
    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Bytes(data) => out.extend_from_slice(data),
            Self::BytesStatic(data) => out.extend_from_slice(data.as_bytes()),
            Self::ResetAttributes => out.extend_from_slice(b"\x1b[0m"),
            Self::ClearScreen => out.extend_from_slice(b"\x1b[2J"),
            Self::CursorHome => out.extend_from_slice(b"\x1b[H"),
            Self::MoveCursor { row, col } => {
                out.extend_from_slice(format!("\x1b[{row};{col}H").as_bytes());
            }
            Self::HideCursor => out.extend_from_slice(b"\x1b[?25l"),
            Self::ShowCursor => out.extend_from_slice(b"\x1b[?25h"),
            Self::ResetCharset => out.extend_from_slice(b"\x1b(B"),
            Self::ResetScrollRegion => out.extend_from_slice(b"\x1b[r"),
        }
    }
}

#[derive(Debug, Default)]
pub struct OutputGate {
    cmds: Vec<TerminalCmd>,
}

impl OutputGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cmd: TerminalCmd) {
        self.cmds.push(cmd);
    }

    pub fn extend<I>(&mut self, cmds: I)
    where
        I: IntoIterator<Item = TerminalCmd>,
    {
        self.cmds.extend(cmds);
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    /// Encoded bytes of everything buffered, without consuming it.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for cmd in &self.cmds {
            cmd.encode_into(&mut out);
        }
        out
    }

    /// Write buffered commands into `fifo` as one block.
    ///
    /// This is the single write gate. The reader is probed right before the
    /// write; with no reader nothing is written and the buffer is kept.
    pub fn flush(&mut self, fifo: &Fifo, stall: Duration) -> Result<(), RecorderError> {
        if self.cmds.is_empty() {
            return Ok(());
        }
        let mut writer = fifo
            .open_writer()
            .map_err(|source| RecorderError::pipe_write(fifo.path(), source))?
            .ok_or_else(|| RecorderError::NoReader {
                path: fifo.path().to_path_buf(),
                attempts: 1,
            })?;

        let bytes = self.encode();
        self.cmds.clear();
        writer
            .write_all(&bytes, stall)
            .map_err(|source| RecorderError::pipe_write(fifo.path(), source))
    }
}

/// Full-screen redraw of a pane: clear, content, then cursor restore.
///
/// The final newline of the capture is dropped and line breaks become CR LF
/// so the restored screen never scrolls.
pub fn snapshot(content: &[u8], cursor: PaneCursor) -> Vec<TerminalCmd> {
    vec![
        TerminalCmd::ResetAttributes,
        TerminalCmd::ClearScreen,
        TerminalCmd::CursorHome,
        TerminalCmd::Bytes(crlf_lines(content)),
        TerminalCmd::MoveCursor {
            row: cursor.y.saturating_add(1),
            col: cursor.x.saturating_add(1),
        },
        if cursor.visible {
            TerminalCmd::ShowCursor
        } else {
            TerminalCmd::HideCursor
        },
    ]
}

/// Leaves a downstream viewer in a sane state after the last frame.
pub fn stop_trailer() -> Vec<TerminalCmd> {
    vec![
        TerminalCmd::ResetAttributes,
        TerminalCmd::ShowCursor,
        TerminalCmd::ClearScreen,
        TerminalCmd::CursorHome,
        TerminalCmd::ResetCharset,
        TerminalCmd::ResetScrollRegion,
        TerminalCmd::BytesStatic("\n"),
    ]
}

fn crlf_lines(content: &[u8]) -> Vec<u8> {
    let body = content.strip_suffix(b"\n").unwrap_or(content);
    let mut out = Vec::with_capacity(body.len() + body.len() / 40);
    for (index, line) in body.split(|b| *b == b'\n').enumerate() {
        if index > 0 {
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(line.strip_suffix(b"\r").unwrap_or(line));
    }
    out
}
