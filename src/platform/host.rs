//! Host identity used in pipe and recording paths.

#[cfg(unix)]
use std::ffi::CStr;

const FALLBACK_HOST: &str = "localhost";

/// Who is recording: the node name plus the tmux server we are attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub host: String,
    /// Raw `$TMUX` value. Two tmux servers on one host get distinct session dirs.
    pub tmux_socket: String,
}

impl HostIdentity {
    pub fn new(host: impl Into<String>, tmux_socket: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            tmux_socket: tmux_socket.into(),
        }
    }

    pub fn detect(tmux_socket: impl Into<String>) -> Self {
        let host = node_name().unwrap_or_else(|| FALLBACK_HOST.to_string());
        Self::new(host, tmux_socket)
    }
}

#[cfg(unix)]
fn node_name() -> Option<String> {
    let mut raw = std::mem::MaybeUninit::<libc::utsname>::uninit();
    // SAFETY: `uname` initializes the provided `utsname` struct on success.
    let rc = unsafe { libc::uname(raw.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }

    // SAFETY: We checked `uname` returned success, so `raw` is initialized.
    let raw = unsafe { raw.assume_init() };
    // SAFETY: `uname` provides NUL-terminated fixed-size C strings.
    let name = unsafe { CStr::from_ptr(raw.nodename.as_ptr()) }
        .to_string_lossy()
        .trim()
        .to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(not(unix))]
fn node_name() -> Option<String> {
    None
}
