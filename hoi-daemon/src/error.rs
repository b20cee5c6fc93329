//! Error types for hoi-daemon.

use std::path::PathBuf;

use thiserror::Error;

/// All errors the daemon surfaces to clients or its own runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] hoi_core::ConfigError),

    #[error(transparent)]
    Store(#[from] hoi_store::StoreError),

    #[error(transparent)]
    System(#[from] hoi_system::SystemError),

    #[error(transparent)]
    Runner(#[from] hoi_runner::RunnerError),

    /// A runner step failed; the step and runner names travel with it.
    #[error(transparent)]
    Step(#[from] hoi_runner::StepError),

    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A protocol-level problem: malformed frame, unknown command, or a
    /// textual error relayed from the daemon.
    #[error("{0}")]
    Protocol(String),

    /// A required request field was missing.
    #[error("request is missing required field '{0}'")]
    MissingField(&'static str),

    /// An internal channel closed unexpectedly.
    #[error("internal channel closed: {0}")]
    ChannelClosed(&'static str),

    /// The daemon socket is absent or refuses connections.
    #[error("hoid does not appear to be running (socket {socket})")]
    DaemonNotRunning { socket: PathBuf },

    /// One or more projects failed during a batch operation.
    #[error("{failed} of {total} project/s failed: {details}")]
    Batch {
        failed: usize,
        total: usize,
        details: String,
    },
}

/// Convenience constructor for [`DaemonError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
