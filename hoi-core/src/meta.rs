//! Mutable metadata attached to each stored project.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a stored project. Transitions are linear
/// (i.e. Loading -> Active | Failed) and are written by the request
/// handlers surrounding step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Status {
    #[default]
    Unknown,
    Loading,
    Reloading,
    Unloading,
    Updating,
    Active,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Unknown => write!(f, "unknown"),
            Status::Loading => write!(f, "loading"),
            Status::Reloading => write!(f, "reloading"),
            Status::Unloading => write!(f, "unloading"),
            Status::Updating => write!(f, "updating"),
            Status::Active => write!(f, "active"),
            Status::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Meta {
    pub status: Status,
}
