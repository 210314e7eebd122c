use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcTreeError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to register cleanup signal handlers: {0}")]
    SignalRegistration(#[source] std::io::Error),

    #[error("failed to start cleanup signal thread: {0}")]
    CleanupThread(#[source] std::io::Error),
}

impl ProcTreeError {
    #[must_use]
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }
}
