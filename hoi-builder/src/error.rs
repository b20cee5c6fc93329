//! Error types for hoi-builder.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while building configuration artifacts.
#[derive(Debug, Error)]
pub enum BuildError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A template failed to parse or render.
    #[error("failed to render template {name}: {source}")]
    Template {
        name: String,
        #[source]
        source: tera::Error,
    },

    /// The template root for a kind does not exist.
    #[error("no templates found at {path}")]
    MissingTemplates { path: PathBuf },

    /// A scope pattern failed to compile or expand.
    #[error("bad file pattern {pattern}: {reason}")]
    Pattern { pattern: String, reason: String },
}

/// Convenience constructor for [`BuildError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> BuildError {
    BuildError::Io {
        path: path.into(),
        source,
    }
}
