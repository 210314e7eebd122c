use std::collections::{HashMap, HashSet, VecDeque};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::error::ProcTreeError;
use crate::table::{ProcFs, ProcessTable, Signal, SignalOutcome};

pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(1);
/// Upper bound on the wait between the graceful signal and the first liveness check.
const MAX_GRACE: Duration = Duration::from_millis(100);
/// Wait after the forceful signal before the final liveness pass.
const FINAL_SETTLE: Duration = Duration::from_millis(100);

/// Spawns background process trees and is responsible for reaping them.
///
/// The managed set only ever holds pids returned by [`ProcessTreeManager::spawn`].
/// It is bookkeeping, not a liveness oracle: every decision re-probes the OS.
pub struct ProcessTreeManager {
    table: Arc<dyn ProcessTable>,
    managed: Mutex<HashSet<u32>>,
    children: Mutex<HashMap<u32, Child>>,
}

impl Default for ProcessTreeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProcessTreeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTreeManager")
            .field("managed", &self.managed_pids())
            .finish()
    }
}

impl ProcessTreeManager {
    #[must_use]
    pub fn new() -> Self {
        Self::with_table(Arc::new(ProcFs))
    }

    #[must_use]
    pub fn with_table(table: Arc<dyn ProcessTable>) -> Self {
        Self {
            table,
            managed: Mutex::new(HashSet::new()),
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Launch `command` detached from our stdio, as the root of its own process group.
    pub fn spawn(&self, mut command: Command) -> Result<u32, ProcTreeError> {
        let program = command.get_program().to_string_lossy().into_owned();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command
            .spawn()
            .map_err(|source| ProcTreeError::spawn(&program, source))?;
        let pid = child.id();

        lock_unpoisoned(&self.children).insert(pid, child);
        lock_unpoisoned(&self.managed).insert(pid);
        tracing::debug!(pid, program = %program, "spawned managed process");
        Ok(pid)
    }

    #[must_use]
    pub fn is_managed(&self, pid: u32) -> bool {
        lock_unpoisoned(&self.managed).contains(&pid)
    }

    #[must_use]
    pub fn managed_pids(&self) -> Vec<u32> {
        let mut pids = lock_unpoisoned(&self.managed)
            .iter()
            .copied()
            .collect::<Vec<_>>();
        pids.sort_unstable();
        pids
    }

    #[must_use]
    pub fn is_alive(&self, pid: u32) -> bool {
        self.probe(pid).is_alive()
    }

    /// `pid` plus every process whose parent chain leads back to it.
    #[must_use]
    pub fn descendants(&self, pid: u32) -> HashSet<u32> {
        let mut tree = HashSet::from([pid]);
        let mut queue = VecDeque::from([pid]);

        while let Some(current) = queue.pop_front() {
            for child in self.table.children(current) {
                if tree.insert(child) {
                    queue.push_back(child);
                }
            }
        }

        tree
    }

    /// Terminate the tree rooted at a managed `pid`.
    ///
    /// Returns false without signaling anything if `pid` was not spawned here.
    /// The pid leaves the managed set whatever the outcome.
    pub fn terminate(&self, pid: u32, timeout: Duration) -> bool {
        if !self.is_managed(pid) {
            tracing::warn!(pid, "refusing to terminate unmanaged process");
            return false;
        }

        let terminated = self.terminate_tree(pid, timeout);
        self.forget(pid);
        terminated
    }

    /// Best-effort termination of every managed tree. True only if all succeeded.
    pub fn terminate_all(&self, timeout: Duration) -> bool {
        let mut all_terminated = true;
        for pid in self.managed_pids() {
            all_terminated &= self.terminate(pid, timeout);
        }
        all_terminated
    }

    /// Drop managed pids whose process has already exited. Returns the dropped pids.
    pub fn reap(&self) -> Vec<u32> {
        let reaped = self
            .managed_pids()
            .into_iter()
            .filter(|pid| !self.is_alive(*pid))
            .collect::<Vec<_>>();

        for pid in &reaped {
            self.forget(*pid);
        }
        if !reaped.is_empty() {
            tracing::debug!(?reaped, "reaped exited processes");
        }
        reaped
    }

    fn terminate_tree(&self, root: u32, timeout: Duration) -> bool {
        match self.probe(root) {
            SignalOutcome::NoSuchProcess => return true,
            SignalOutcome::PermissionDenied => {
                tracing::warn!(pid = root, "no permission to signal process");
                return false;
            }
            SignalOutcome::Delivered => {}
        }

        let tree = self.descendants(root);
        tracing::debug!(pid = root, tree = ?sorted(&tree), "terminating process tree");

        let mut signaled = Vec::with_capacity(tree.len());
        for pid in sorted(&tree) {
            match self.table.signal(pid, Signal::Terminate) {
                SignalOutcome::NoSuchProcess => {}
                SignalOutcome::PermissionDenied => {
                    tracing::warn!(pid, "no permission to signal process");
                    signaled.push(pid);
                }
                SignalOutcome::Delivered => signaled.push(pid),
            }
        }
        if signaled.is_empty() {
            return true;
        }

        let grace = MAX_GRACE.min(timeout / 10);
        thread::sleep(grace);

        let survivors = self.still_alive(&signaled);
        if survivors.is_empty() {
            return true;
        }

        let remainder = timeout.saturating_sub(grace);
        if !remainder.is_zero() {
            thread::sleep(remainder);
        }

        tracing::debug!(?survivors, "escalating to forceful termination");
        for pid in &survivors {
            self.table.signal(*pid, Signal::Kill);
        }

        thread::sleep(FINAL_SETTLE);
        let remaining = self.still_alive(&survivors);
        if remaining.is_empty() {
            true
        } else {
            tracing::warn!(pids = ?remaining, "failed to kill processes");
            false
        }
    }

    fn still_alive(&self, pids: &[u32]) -> Vec<u32> {
        pids.iter()
            .copied()
            .filter(|pid| self.is_alive(*pid))
            .collect()
    }

    /// Probe liveness, reaping our own exited child first so it never reads as alive.
    fn probe(&self, pid: u32) -> SignalOutcome {
        let mut children = lock_unpoisoned(&self.children);
        if let Some(child) = children.get_mut(&pid) {
            if let Ok(Some(status)) = child.try_wait() {
                tracing::debug!(pid, %status, "managed process exited");
                children.remove(&pid);
                return SignalOutcome::NoSuchProcess;
            }
        }
        drop(children);

        self.table.probe(pid)
    }

    fn forget(&self, pid: u32) {
        lock_unpoisoned(&self.managed).remove(&pid);

        let child = lock_unpoisoned(&self.children).remove(&pid);
        if let Some(mut child) = child {
            match child.wait_timeout(FINAL_SETTLE) {
                Ok(Some(_)) => {}
                Ok(None) => tracing::debug!(pid, "forgetting a process that is still running"),
                Err(error) => tracing::debug!(pid, %error, "failed to wait on process"),
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn adopt_for_test(&self, pid: u32) {
        lock_unpoisoned(&self.managed).insert(pid);
    }
}

fn sorted(pids: &HashSet<u32>) -> Vec<u32> {
    let mut pids = pids.iter().copied().collect::<Vec<_>>();
    pids.sort_unstable();
    pids
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
