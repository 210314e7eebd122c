use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::CastStoreError;
use crate::schema::{CastEvent, CastHeader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepairOptions {
    /// Copy the original bytes to `<file>.bak` before rewriting.
    pub backup: bool,
}

impl RepairOptions {
    #[must_use]
    pub fn with_backup() -> Self {
        Self { backup: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Every record parsed; the file was not touched.
    Intact { events: usize },
    /// Records from the first unparseable one onward were dropped.
    Truncated {
        kept_events: usize,
        dropped_lines: usize,
        backup_path: Option<PathBuf>,
    },
}

impl RepairOutcome {
    #[must_use]
    pub fn was_rewritten(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }

    #[must_use]
    pub fn events(&self) -> usize {
        match self {
            Self::Intact { events } => *events,
            Self::Truncated { kept_events, .. } => *kept_events,
        }
    }
}

/// Make `path` a fully parseable cast file.
///
/// The header must parse or there is nothing to recover. Events are parsed in
/// order and the first one that fails marks the truncation point: everything
/// before it is kept byte-for-byte, everything from it onward is dropped. A
/// file with no bad records is left untouched.
pub fn repair(path: &Path, options: RepairOptions) -> Result<RepairOutcome, CastStoreError> {
    let bytes = fs::read(path).map_err(|source| CastStoreError::io("reading cast file", path, source))?;
    let records = split_records(&bytes);

    let header = records
        .first()
        .ok_or_else(|| CastStoreError::MissingHeader {
            path: path.to_path_buf(),
        })?;
    parse_header(path, header)?;

    let kept = 1 + records[1..]
        .iter()
        .take_while(|record| parse_event_record(record).is_ok())
        .count();

    if kept == records.len() {
        tracing::debug!(path = %path.display(), events = kept - 1, "cast file intact");
        return Ok(RepairOutcome::Intact { events: kept - 1 });
    }

    let dropped_lines = records.len() - kept;
    let backup_path = if options.backup {
        let backup_path = backup_path_for(path);
        fs::write(&backup_path, &bytes)
            .map_err(|source| CastStoreError::io("writing cast backup", &backup_path, source))?;
        Some(backup_path)
    } else {
        None
    };

    let mut repaired = Vec::with_capacity(bytes.len());
    for record in &records[..kept] {
        repaired.extend_from_slice(record);
        repaired.push(b'\n');
    }
    replace_file(path, &repaired)?;

    tracing::info!(
        path = %path.display(),
        kept_events = kept - 1,
        dropped_lines,
        "repaired truncated cast file"
    );

    Ok(RepairOutcome::Truncated {
        kept_events: kept - 1,
        dropped_lines,
        backup_path,
    })
}

/// `<file>.bak` next to the cast file.
#[must_use]
pub fn backup_path_for(path: &Path) -> PathBuf {
    sibling_with_suffix(path, ".bak")
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("recording.cast"));
    name.push(suffix);
    path.with_file_name(name)
}

fn replace_file(path: &Path, contents: &[u8]) -> Result<(), CastStoreError> {
    let temp_path = sibling_with_suffix(path, ".repair-tmp");
    let mut file = File::create(&temp_path)
        .map_err(|source| CastStoreError::io("creating repaired cast file", &temp_path, source))?;
    file.write_all(contents)
        .and_then(|()| file.sync_all())
        .map_err(|source| CastStoreError::io("writing repaired cast file", &temp_path, source))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|source| {
        let _ = fs::remove_file(&temp_path);
        CastStoreError::io("replacing cast file", path, source)
    })
}

/// Newline-delimited records; the empty tail after a final newline is not a record.
pub(crate) fn split_records(bytes: &[u8]) -> Vec<&[u8]> {
    if bytes.is_empty() {
        return Vec::new();
    }

    let mut records = bytes.split(|byte| *byte == b'\n').collect::<Vec<_>>();
    if bytes.ends_with(b"\n") {
        records.pop();
    }
    records
}

pub(crate) fn parse_header(path: &Path, record: &[u8]) -> Result<CastHeader, CastStoreError> {
    let header = serde_json::from_slice::<CastHeader>(record)
        .map_err(|source| CastStoreError::invalid_header(path, 1, source))?;

    if !header.is_supported_version() {
        return Err(CastStoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            line: 1,
            found: header.version,
        });
    }

    Ok(header)
}

pub(crate) fn parse_event_record(record: &[u8]) -> Result<CastEvent, serde_json::Error> {
    serde_json::from_slice::<CastEvent>(record)
}
