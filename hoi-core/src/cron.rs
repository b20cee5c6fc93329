//! The cron directive.

use serde::{Deserialize, Serialize};

/// Jobs run on a regular basis. The schedule option supports expressions
/// from systemd.time(7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CronDirective {
    /// An optional descriptive name identifying the cron. If none is given
    /// a hash of the command is used instead.
    pub name: String,
    /// A systemd.time time and date specification, i.e. "hourly", "daily",
    /// "weekly" or a full calendar expression.
    pub schedule: String,
    /// A command string, either a path (relative to project root or
    /// absolute) or a template evaluating to one. Commands are executed with
    /// the project root as the working directory.
    pub command: String,
}

impl CronDirective {
    /// Identity of the directive: the plain name when present, otherwise an
    /// Adler-32 hash of the command, which together with the project ID is
    /// assumed to be unique enough.
    pub fn id(&self) -> String {
        if self.name.is_empty() {
            return format!("{:x}", adler::adler32_slice(self.command.as_bytes()));
        }
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_prefers_name() {
        let cron = CronDirective {
            name: "mail".to_string(),
            schedule: "hourly".to_string(),
            command: "bin/mail".to_string(),
        };
        assert_eq!(cron.id(), "mail");
    }

    #[test]
    fn id_falls_back_to_command_hash() {
        let cron = CronDirective {
            name: String::new(),
            schedule: "hourly".to_string(),
            command: "bin/mail".to_string(),
        };
        assert_eq!(
            cron.id(),
            format!("{:x}", adler::adler32_slice(b"bin/mail"))
        );
    }
}
