use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// First line of a cast file.
///
/// Version 2 headers carry `width`/`height`, version 3 headers carry a `term`
/// object. Everything else the recorder wrote (env, title, theme, ...) is kept
/// in `extra` so a parsed header can be written back without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastHeader {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<TermInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermInfo {
    pub cols: u32,
    pub rows: u32,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub term_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub const SUPPORTED_VERSIONS: [u32; 2] = [2, 3];

impl CastHeader {
    #[must_use]
    pub fn v2(width: u32, height: u32, timestamp: Option<u64>) -> Self {
        Self {
            version: 2,
            width: Some(width),
            height: Some(height),
            term: None,
            timestamp,
            extra: Map::new(),
        }
    }

    /// Terminal size as `(cols, rows)`, whichever header version declared it.
    #[must_use]
    pub fn size(&self) -> Option<(u32, u32)> {
        if let (Some(width), Some(height)) = (self.width, self.height) {
            return Some((width, height));
        }
        self.term.as_ref().map(|term| (term.cols, term.rows))
    }

    #[must_use]
    pub fn is_supported_version(&self) -> bool {
        SUPPORTED_VERSIONS.contains(&self.version)
    }
}

/// One `[time, code, data]` event line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastEvent(pub f64, pub String, pub String);

impl CastEvent {
    #[must_use]
    pub fn output(time: f64, data: impl Into<String>) -> Self {
        Self(time, "o".to_string(), data.into())
    }

    #[must_use]
    pub fn time(&self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn code(&self) -> EventCode {
        EventCode::from_code(&self.1)
    }

    #[must_use]
    pub fn data(&self) -> &str {
        &self.2
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventCode {
    Output,
    Input,
    Marker,
    Resize,
    Exit,
    Other(String),
}

impl EventCode {
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "o" => Self::Output,
            "i" => Self::Input,
            "m" => Self::Marker,
            "r" => Self::Resize,
            "x" => Self::Exit,
            other => Self::Other(other.to_string()),
        }
    }
}
