use std::fs;
use std::path::Path;

use crate::error::CastStoreError;
use crate::repair::{parse_event_record, parse_header, split_records};
use crate::schema::CastHeader;

#[derive(Debug, Clone, PartialEq)]
pub struct CastSummary {
    pub header: CastHeader,
    pub events: usize,
    /// Timestamp of the last event, in seconds.
    pub duration: f64,
}

/// Strictly read a cast file: the header and every event must parse.
pub fn validate(path: &Path) -> Result<CastSummary, CastStoreError> {
    let bytes = fs::read(path).map_err(|source| CastStoreError::io("reading cast file", path, source))?;
    let records = split_records(&bytes);

    let header_record = records
        .first()
        .ok_or_else(|| CastStoreError::MissingHeader {
            path: path.to_path_buf(),
        })?;
    let header = parse_header(path, header_record)?;

    let mut duration = 0.0;
    for (index, record) in records.iter().enumerate().skip(1) {
        let event = parse_event_record(record)
            .map_err(|source| CastStoreError::invalid_event(path, index + 1, source))?;
        duration = event.time();
    }

    Ok(CastSummary {
        header,
        events: records.len() - 1,
        duration,
    })
}
