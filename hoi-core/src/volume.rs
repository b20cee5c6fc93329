//! The volume directive.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::project::Config;
use crate::server;

/// A bind-mounted directory whose lifecycle is managed alongside the
/// project. Data lives under a server-level run path; the project-relative
/// path is the mount target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeDirective {
    /// Path relative to the project root; taken from the block key.
    pub path: String,
    /// Whether this volume's data may be wiped between mounts.
    pub is_temporary: bool,
}

impl VolumeDirective {
    /// The mount target: the volume path resolved against the project root.
    pub fn absolute_path(&self, p: &Config) -> PathBuf {
        p.path.join(&self.path)
    }

    /// The server-level directory this volume kind keeps its sources under.
    pub fn run_path(&self, p: &Config, s: &server::Config) -> PathBuf {
        let base = if self.is_temporary {
            &s.volume.temporary_run_path
        } else {
            &s.volume.persistent_run_path
        };
        base.join(format!("project_{}", p.id()))
    }

    /// The mount source: the actual directory backing the volume.
    pub fn source(&self, p: &Config, s: &server::Config) -> PathBuf {
        self.run_path(p, s).join(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_lives_under_kind_specific_run_path() {
        let mut p = Config::default();
        p.path = PathBuf::from("/var/www/foo");

        let mut s = server::Config::default();
        s.volume.persistent_run_path = PathBuf::from("/var/projects");
        s.volume.temporary_run_path = PathBuf::from("/var/tmp/projects");

        let persistent = VolumeDirective {
            path: "media".to_string(),
            is_temporary: false,
        };
        let temporary = VolumeDirective {
            path: "tmp/cache".to_string(),
            is_temporary: true,
        };

        let ns = format!("project_{}", p.id());
        assert_eq!(
            persistent.source(&p, &s),
            PathBuf::from("/var/projects").join(&ns).join("media")
        );
        assert_eq!(
            temporary.source(&p, &s),
            PathBuf::from("/var/tmp/projects").join(&ns).join("tmp/cache")
        );
        assert_eq!(
            persistent.absolute_path(&p),
            PathBuf::from("/var/www/foo/media")
        );
    }
}
