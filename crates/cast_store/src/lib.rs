//! Cast recording files: schema, on-disk layout and truncation repair.
//!
//! A cast file is one JSON header line followed by one JSON event line per
//! record. The writer flushes whole lines, so an abrupt stop can only leave
//! the final line incomplete; [`repair`] relies on that.

mod error;
pub mod paths;
mod repair;
mod schema;
mod validate;

pub use error::CastStoreError;
pub use paths::{cast_file_name, cast_path, month_dir, safe_filename};
pub use repair::{backup_path_for, repair, RepairOptions, RepairOutcome};
pub use schema::{CastEvent, CastHeader, EventCode, TermInfo};
pub use validate::{validate, CastSummary};
