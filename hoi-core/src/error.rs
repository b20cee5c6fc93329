//! Error types for hoi-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while parsing, augmenting or validating
/// configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file failed to parse.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A command or server config string failed to render as a template.
    #[error("failed to render template string '{template}': {source}")]
    Template {
        template: String,
        #[source]
        source: tera::Error,
    },

    /// Filesystem-driven completion of the configuration failed.
    #[error("failed to augment config: {0}")]
    Augment(String),

    /// The configuration violates an invariant.
    #[error("invalid config: {0}")]
    Validate(String),
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
