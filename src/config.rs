//! Environment configuration.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::recorder::RecorderSettings;

pub const DEFAULT_READY_ATTEMPTS: u32 = 30;
pub const DEFAULT_READY_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_SPAWN_GRACE: Duration = Duration::from_millis(100);
pub const DEFAULT_TRAILER_PAUSE: Duration = Duration::from_millis(100);
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Root of the `YYYY-MM/` recording buckets.
    pub output_dir: PathBuf,
    /// Parent of the per-session FIFO directories.
    pub runtime_dir: PathBuf,
    pub ready_attempts: u32,
    pub ready_delay: Duration,
    pub spawn_grace: Duration,
    pub trailer_pause: Duration,
    pub terminate_timeout: Duration,
    pub log_filter: String,
    pub log_file: Option<PathBuf>,
    /// Value of `$TMUX`; only mixed into the session directory hash.
    pub tmux_socket: String,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            output_dir: env_string_opt("TVMUX_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_output_dir),
            runtime_dir: env_string_opt("TVMUX_RUNTIME_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_runtime_dir),
            ready_attempts: env_parse("TVMUX_READY_ATTEMPTS").unwrap_or(DEFAULT_READY_ATTEMPTS),
            ready_delay: env_millis("TVMUX_READY_DELAY_MS").unwrap_or(DEFAULT_READY_DELAY),
            spawn_grace: env_millis("TVMUX_SPAWN_GRACE_MS").unwrap_or(DEFAULT_SPAWN_GRACE),
            trailer_pause: env_millis("TVMUX_TRAILER_PAUSE_MS").unwrap_or(DEFAULT_TRAILER_PAUSE),
            terminate_timeout: env_millis("TVMUX_TERMINATE_TIMEOUT_MS")
                .unwrap_or(DEFAULT_TERMINATE_TIMEOUT),
            log_filter: env_string_opt("TVMUX_LOG")
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            log_file: env_string_opt("TVMUX_LOG_FILE").map(PathBuf::from),
            tmux_socket: env_string_opt("TMUX").unwrap_or_default(),
        }
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            runtime_dir: self.runtime_dir.clone(),
            ready_attempts: self.ready_attempts,
            ready_delay: self.ready_delay,
            spawn_grace: self.spawn_grace,
            trailer_pause: self.trailer_pause,
            terminate_timeout: self.terminate_timeout,
        }
    }
}

pub fn default_output_dir() -> PathBuf {
    let home = env_string_opt("HOME").unwrap_or_else(|| ".".to_string());
    PathBuf::from(home).join("Videos").join("tmux")
}

pub fn default_runtime_dir() -> PathBuf {
    if let Some(xdg) = env_string_opt("XDG_RUNTIME_DIR") {
        return PathBuf::from(xdg).join("tvmux");
    }
    let user = env_string_opt("USER").unwrap_or_else(|| "unknown".to_string());
    env::temp_dir().join(format!("tvmux-{user}"))
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string_opt(key).and_then(|value| value.trim().parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}
