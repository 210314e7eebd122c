//! OS process metadata and signal delivery.
//!
//! Everything the manager needs from the OS goes through [`ProcessTable`], so the
//! tree walk and the escalation logic can be exercised against a fake table.

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Null signal: existence/permission check only.
    Probe,
    /// Polite request to exit (SIGTERM).
    Terminate,
    /// Non-ignorable kill (SIGKILL).
    Kill,
}

impl Signal {
    #[cfg(unix)]
    fn as_raw(self) -> libc::c_int {
        match self {
            Self::Probe => 0,
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Delivered,
    NoSuchProcess,
    /// The process exists but we may not signal it. Counts as alive.
    PermissionDenied,
}

impl SignalOutcome {
    #[must_use]
    pub fn is_alive(self) -> bool {
        !matches!(self, Self::NoSuchProcess)
    }
}

pub trait ProcessTable: Send + Sync {
    /// Direct children of `pid`, by recorded parent id.
    fn children(&self, pid: u32) -> HashSet<u32>;

    fn signal(&self, pid: u32, signal: Signal) -> SignalOutcome;

    fn probe(&self, pid: u32) -> SignalOutcome {
        self.signal(pid, Signal::Probe)
    }
}

/// The real process table: `/proc` on Linux, `ps` elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcFs;

impl ProcessTable for ProcFs {
    fn children(&self, pid: u32) -> HashSet<u32> {
        list_parent_links()
            .into_iter()
            .filter(|(_, ppid)| *ppid == pid)
            .map(|(child, _)| child)
            .collect()
    }

    #[cfg(unix)]
    fn signal(&self, pid: u32, signal: Signal) -> SignalOutcome {
        // pid 0 and negative pids address process groups; never send those.
        let Ok(raw_pid) = libc::pid_t::try_from(pid) else {
            return SignalOutcome::NoSuchProcess;
        };
        if raw_pid <= 0 {
            return SignalOutcome::NoSuchProcess;
        }

        // SAFETY: `kill` has no memory-safety preconditions; the pid is a positive single process.
        let rc = unsafe { libc::kill(raw_pid, signal.as_raw()) };
        if rc == 0 {
            if signal == Signal::Probe && is_zombie(pid) {
                return SignalOutcome::NoSuchProcess;
            }
            return SignalOutcome::Delivered;
        }

        match std::io::Error::last_os_error().raw_os_error() {
            Some(libc::ESRCH) => SignalOutcome::NoSuchProcess,
            _ => SignalOutcome::PermissionDenied,
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, _pid: u32, _signal: Signal) -> SignalOutcome {
        SignalOutcome::NoSuchProcess
    }
}

/// Parse `(ppid, state)` out of a `/proc/<pid>/stat` line.
///
/// The command name sits in parentheses and may itself contain spaces or `)`,
/// so fields are read after the last closing parenthesis.
pub(crate) fn parse_stat(contents: &str) -> Option<(u32, char)> {
    let after_name = &contents[contents.rfind(')')? + 1..];
    let mut fields = after_name.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let ppid = fields.next()?.parse().ok()?;
    Some((ppid, state))
}

#[cfg(target_os = "linux")]
fn list_parent_links() -> Vec<(u32, u32)> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };

    entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter_map(|pid| {
            let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
            let (ppid, _) = parse_stat(&stat)?;
            Some((pid, ppid))
        })
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn list_parent_links() -> Vec<(u32, u32)> {
    let Ok(output) = std::process::Command::new("ps")
        .args(["-A", "-o", "pid=,ppid="])
        .output()
    else {
        return Vec::new();
    };

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?.parse().ok()?;
            let ppid = fields.next()?.parse().ok()?;
            Some((pid, ppid))
        })
        .collect()
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| parse_stat(&stat))
        .is_some_and(|(_, state)| state == 'Z' || state == 'X')
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(_pid: u32) -> bool {
    false
}
