//! Bytes the recorder injects into a recording.

pub mod output;
