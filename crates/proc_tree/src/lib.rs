//! Background process trees: spawn, track, and forcibly reap.
//!
//! [`ProcessTreeManager`] owns every process it spawns until the tree is
//! confirmed gone. Termination is two-phase (SIGTERM, then SIGKILL for
//! survivors) over the root and all of its descendants.

mod cleanup;
mod error;
mod manager;
mod table;

pub use cleanup::{install_cleanup_handlers, CleanupGuard};
pub use error::ProcTreeError;
pub use manager::{ProcessTreeManager, DEFAULT_TERMINATE_TIMEOUT};
pub use table::{ProcFs, ProcessTable, Signal, SignalOutcome};
