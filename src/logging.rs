//! Tracing subscriber bootstrap.

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::{EnvConfig, DEFAULT_LOG_FILTER};

/// Install the global fmt subscriber filtered by `TVMUX_LOG`.
///
/// Writes to `TVMUX_LOG_FILE` (appending) when set, otherwise to stderr.
/// Returns `Ok(false)` when a global subscriber was already installed, so
/// repeated calls are harmless.
pub fn init(config: &EnvConfig) -> io::Result<bool> {
    let filter = EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let writer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(io::stderr),
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(config.log_file.is_none())
        .try_init()
        .is_ok();
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn second_init_is_a_no_op_and_file_sink_receives_events() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_file = dir.path().join("tvmux.log");
        let config = EnvConfig {
            output_dir: dir.path().join("casts"),
            runtime_dir: dir.path().join("run"),
            ready_attempts: 1,
            ready_delay: Duration::ZERO,
            spawn_grace: Duration::ZERO,
            trailer_pause: Duration::ZERO,
            terminate_timeout: Duration::ZERO,
            log_filter: "info".to_string(),
            log_file: Some(log_file.clone()),
            tmux_socket: String::new(),
        };

        assert!(init(&config).expect("first init"));
        tracing::info!(window = "@1", "recording started");
        assert!(!init(&config).expect("second init"));

        let written = std::fs::read_to_string(&log_file).expect("log file");
        assert!(written.contains("recording started"), "log file was: {written:?}");
        assert!(written.contains("window=\"@1\""), "log file was: {written:?}");
    }
}
