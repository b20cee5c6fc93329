//! The worker directive.

use serde::{Deserialize, Serialize};

/// Long running worker processes, supervised by the process manager with
/// resource controls keeping them inside reasonable bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerDirective {
    /// An optional descriptive name identifying the worker. If none is
    /// given a hash of the command is used instead.
    pub name: String,
    /// How many instances of the worker should be spawned; defaults to 1.
    pub instances: u32,
    /// A command string, either a path (relative to project root or
    /// absolute) or a template evaluating to one.
    pub command: String,
}

impl WorkerDirective {
    /// Identity of the directive: the plain name when present, otherwise an
    /// Adler-32 hash of the command.
    pub fn id(&self) -> String {
        if self.name.is_empty() {
            return format!("{:x}", adler::adler32_slice(self.command.as_bytes()));
        }
        self.name.clone()
    }

    /// Number of instances, ensuring at least one.
    pub fn instances(&self) -> u32 {
        self.instances.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_least_one_instance() {
        let worker = WorkerDirective::default();
        assert_eq!(worker.instances(), 1);

        let worker = WorkerDirective {
            instances: 3,
            ..WorkerDirective::default()
        };
        assert_eq!(worker.instances(), 3);
    }
}
