//! Process-wide shutdown hook: reap every managed tree before the program dies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};

use crate::error::ProcTreeError;
use crate::manager::ProcessTreeManager;

/// Keeps the cleanup signal thread registered. Dropping it unregisters.
pub struct CleanupGuard {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// On SIGINT/SIGTERM/SIGHUP, terminate every managed tree once, then let the
/// signal's default action run so the program still exits.
pub fn install_cleanup_handlers(
    manager: Arc<ProcessTreeManager>,
    timeout: Duration,
) -> Result<CleanupGuard, ProcTreeError> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM, SIGHUP]).map_err(ProcTreeError::SignalRegistration)?;
    let handle = signals.handle();
    let ran = AtomicBool::new(false);

    let thread = thread::Builder::new()
        .name("proc-tree-cleanup".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                if !ran.swap(true, Ordering::SeqCst) {
                    tracing::info!(signal, "terminating managed process trees before exit");
                    manager.terminate_all(timeout);
                }
                if let Err(error) = signal_hook::low_level::emulate_default_handler(signal) {
                    tracing::warn!(signal, %error, "failed to run default signal action");
                }
            }
        })
        .map_err(ProcTreeError::CleanupThread)?;

    Ok(CleanupGuard {
        handle,
        thread: Some(thread),
    })
}
