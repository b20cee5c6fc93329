//! Error types for hoi-system.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from subsystem primitives.
#[derive(Debug, Error)]
pub enum SystemError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A subprocess could not be spawned or exited unsuccessfully.
    #[error("command `{command}` failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    /// A MySQL protocol or query error.
    #[error("MySQL error: {0}")]
    Mysql(#[from] ::mysql::Error),

    /// Rendering a configuration template string failed.
    #[error(transparent)]
    Config(#[from] hoi_core::ConfigError),

    /// Refusing to manipulate a generally protected (admin) user.
    #[error("is MySQL restricted user: {user}")]
    Restricted { user: String },

    /// A commit failed; the subsystem keeps its dirty flag so a subsequent
    /// pipeline retries the reload.
    #[error("{subsystem} left in dirty state: {source}")]
    Dirty {
        subsystem: &'static str,
        #[source]
        source: Box<SystemError>,
    },

    /// Failed to resolve a user or group name configured at server level.
    #[error("unknown user or group: {name}")]
    UnknownPrincipal { name: String },
}

/// Convenience constructor for [`SystemError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SystemError {
    SystemError::Io {
        path: path.into(),
        source,
    }
}
