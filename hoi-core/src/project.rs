//! The project configuration aggregate, usually populated from a Hoifile.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app::AppDirective;
use crate::cron::CronDirective;
use crate::database::DatabaseDirective;
use crate::domain::DomainDirective;
use crate::error::{io_err, ConfigError};
use crate::volume::VolumeDirective;
use crate::worker::WorkerDirective;

/// The deployment-phase label a project runs in. Drives validation leniency
/// and naming conventions (i.e. database name suffixing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    #[default]
    Unknown,
    Dev,
    Stage,
    Prod,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Context::Unknown => write!(f, "?"),
            Context::Dev => write!(f, "dev"),
            Context::Stage => write!(f, "stage"),
            Context::Prod => write!(f, "prod"),
        }
    }
}

/// The main project configuration as provided by the Hoifile: a per-project
/// manifest which defines the needs of a project hoi will try to fulfill.
///
/// A project provides as much configuration as needed; the remaining
/// configuration is filled in by discovering the project's needs (through
/// [`Config::augment`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// The absolute path to the project root; required but provided by
    /// hoictl mostly automatically.
    pub path: PathBuf,
    /// The name of the project; optional; if not provided the basename of
    /// the project's path is used, stripped of any context suffix:
    ///   acme       -> acme
    ///   acme_stage -> acme
    pub name: String,
    /// The context the project is running in; required.
    pub context: Context,
    /// Directory inside the project served publicly, relative to the
    /// project root; optional, will be discovered.
    pub webroot: String,
    /// Describes the application run inside the project.
    pub app: AppDirective,
    /// Whether a unified assets directory is served.
    pub use_assets: bool,
    /// Whether classic img/js/css directories are used instead of a single
    /// assets directory.
    pub use_classic_assets: bool,
    /// Whether assets and media directories are nested under the webroot.
    pub use_webroot_nesting: bool,
    /// Whether media versions are served.
    pub use_media_versions: bool,
    /// Whether media transfers are served.
    pub use_media_transfers: bool,
    /// Whether generic files are served.
    pub use_files: bool,
    /// Whether uploads are enabled.
    pub use_uploads: bool,
    /// Domains for the project, keyed by FQDN.
    pub domain: HashMap<String, DomainDirective>,
    /// Crons for the project, keyed by name.
    pub cron: HashMap<String, CronDirective>,
    /// Workers for the project, keyed by name.
    pub worker: HashMap<String, WorkerDirective>,
    /// Databases for the project, keyed by name.
    pub database: HashMap<String, DatabaseDirective>,
    /// Volumes for the project, keyed by relative path.
    pub volume: HashMap<String, VolumeDirective>,
}

impl Config {
    /// Parse a Hoifile, anchoring the configuration at the file's directory.
    pub fn from_file(file: &Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(file).map_err(|e| io_err(file, e))?;
        let mut cfg = Config::from_str(&contents).map_err(|source| match source {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: file.to_path_buf(),
                source,
            },
            other => other,
        })?;
        cfg.path = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        Ok(cfg)
    }

    /// Parse a Hoifile document from a string.
    pub fn from_str(s: &str) -> Result<Config, ConfigError> {
        let mut cfg: Config = serde_yaml::from_str(s).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        cfg.assign_block_keys();
        Ok(cfg)
    }

    /// The first-level key of each block populates the block's identity
    /// field, so directives know who they are when handled in isolation.
    fn assign_block_keys(&mut self) {
        for (k, e) in self.domain.iter_mut() {
            e.fqdn = k.clone();
        }
        for (k, e) in self.cron.iter_mut() {
            e.name = k.clone();
        }
        for (k, e) in self.worker.iter_mut() {
            e.name = k.clone();
        }
        for (k, e) in self.database.iter_mut() {
            e.name = k.clone();
        }
        for (k, e) in self.volume.iter_mut() {
            e.path = k.clone();
        }
    }

    /// Stable project identity: lowercase hex Adler-32 checksum of the
    /// absolute project root path.
    pub fn id(&self) -> String {
        path_to_id(&self.path)
    }

    /// Human-facing name, i.e. `acme@prod`.
    pub fn pretty_name(&self) -> String {
        if self.name.is_empty() {
            return format!(
                "? in {}",
                self.path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            );
        }
        format!("{}@{}", self.name, self.context)
    }

    /// The webroot resolved against the project root.
    pub fn absolute_webroot(&self) -> PathBuf {
        self.path.join(&self.webroot)
    }

    /// Extracts user/password pairs from the domain configuration.
    pub fn creds(&self) -> HashMap<String, String> {
        let mut creds = HashMap::new();
        for d in self.domain.values() {
            if d.auth.is_enabled() {
                creds.insert(d.auth.user.clone(), d.auth.password.clone());
            }
        }
        creds
    }
}

/// Derives a project ID from a project root path.
pub fn path_to_id(path: &Path) -> String {
    format!(
        "{:x}",
        adler::adler32_slice(path.to_string_lossy().as_bytes())
    )
}
