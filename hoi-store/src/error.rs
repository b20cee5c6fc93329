//! Error types for hoi-store.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A database file line is not in `<id>#<json>` format.
    #[error("db file {path} corrupt or in unrecognized format (line {line})")]
    Corrupt { path: PathBuf, line: usize },

    /// An entity failed to (de)serialize.
    #[error("bad entity JSON in {path} (line {line}): {source}")]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// No entity under the given ID.
    #[error("no project {id} in store")]
    NotFound { id: String },
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
