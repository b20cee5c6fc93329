//! Error types for hoi-runner.

use std::fmt;

use thiserror::Error;

/// All errors a runner step can surface.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Build(#[from] hoi_builder::error::BuildError),

    #[error(transparent)]
    System(#[from] hoi_system::SystemError),

    #[error(transparent)]
    Config(#[from] hoi_core::ConfigError),

    /// A built artifact could not be mapped back to its directive.
    #[error("failed to map artifact back to directive: {0}")]
    UnknownArtifact(String),
}

/// One of the three steps on a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Disable,
    Enable,
    Commit,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Disable => write!(f, "disable"),
            StepKind::Enable => write!(f, "enable"),
            StepKind::Commit => write!(f, "commit"),
        }
    }
}

/// A runner step failed. Carries the human name of the step and the runner,
/// so failures can be reported without introspection.
#[derive(Debug, Error)]
#[error("the *{step}* step of the {runner} runner failed: {source}")]
pub struct StepError {
    pub step: StepKind,
    pub runner: &'static str,
    #[source]
    pub source: RunnerError,
}
