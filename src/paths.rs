//! Where pipes live.
//!
//! Each tmux session gets its own directory under the runtime dir, named
//! after the host and session plus a short hash so that similarly named
//! sessions, or the same name on another tmux server, never share a pipe.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::platform::HostIdentity;

const SESSION_SEGMENT_LEN: usize = 20;
const HASH_SUFFIX_LEN: usize = 6;

/// Keep `[A-Za-z0-9_-]`, replace everything else with `_`.
pub fn clean_identifier(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn session_dir(runtime_dir: &Path, identity: &HostIdentity, session: &str) -> PathBuf {
    let clean_session: String = clean_identifier(session)
        .chars()
        .take(SESSION_SEGMENT_LEN)
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(format!("{}_{}_{}", identity.host, session, identity.tmux_socket).as_bytes());
    let digest = hex::encode(hasher.finalize());

    runtime_dir.join(format!(
        "session_{}_{}_{}",
        clean_identifier(&identity.host),
        clean_session,
        &digest[..HASH_SUFFIX_LEN]
    ))
}

/// `<runtime>/session_.../window_<id>.fifo`; the window's leading `@` is dropped.
pub fn pipe_path(
    runtime_dir: &Path,
    identity: &HostIdentity,
    session: &str,
    window: &str,
) -> PathBuf {
    let window = clean_identifier(window.trim_start_matches('@'));
    session_dir(runtime_dir, identity, session).join(format!("window_{window}.fifo"))
}
