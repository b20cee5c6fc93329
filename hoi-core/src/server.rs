//! Server configuration: what this host offers to projects.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

/// The current configuration format version. Incremented by one whenever
/// the format changes.
pub const FORMAT_VERSION: u16 = 2;

/// Host-level configuration consumed by the daemon: per-subsystem enable
/// flags, run paths into which artifacts are installed, template and build
/// roots, and per-subsystem extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// The internal configuration format version.
    pub format_version: u16,
    /// Administrator email address.
    pub email: String,
    /// Use these user/group when possible, i.e. in systemd unit
    /// definitions and volume source ownership.
    pub user: String,
    pub group: String,
    pub template_path: PathBuf,
    pub build_path: PathBuf,
    pub web: WebDirective,
    pub nginx: NginxDirective,
    pub ssl: SslDirective,
    pub app_service: AppServiceDirective,
    pub php: PhpDirective,
    pub cron: CronDirective,
    pub worker: WorkerDirective,
    pub systemd: SystemdDirective,
    pub database: DatabaseDirective,
    pub mysql: MysqlDirective,
    pub volume: VolumeDirective,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WebDirective {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct NginxDirective {
    pub run_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SslDirective {
    pub enabled: bool,
    pub run_path: PathBuf,
    /// System-wide certificates and keys, keyed by an arbitrary label.
    pub system: HashMap<String, SystemSslDirective>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemSslDirective {
    /// Shell file name pattern the FQDN is matched against.
    pub pattern: String,
    /// Absolute paths to certificate and key.
    pub certificate: String,
    pub certificate_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AppServiceDirective {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PhpDirective {
    pub enabled: bool,
    /// Name of the FPM service unit (sans suffix); may be a templated
    /// string over `P` and `S`.
    pub service: String,
    /// Directory PHP scans for autoloadable configuration; may be a
    /// templated string over `P` and `S`.
    pub run_path: String,
    /// Default PHP version assumed when a project does not pin one.
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CronDirective {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerDirective {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemdDirective {
    pub run_path: PathBuf,
    /// On legacy init systems enable/start must be issued as two serial
    /// calls instead of one `--now` call.
    pub use_legacy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseDirective {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct MysqlDirective {
    pub host: String,
    pub user: String,
    pub password: String,
    /// Legacy servers take `SET PASSWORD ... PASSWORD()` instead of
    /// `ALTER USER ... IDENTIFIED BY`.
    pub use_legacy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeDirective {
    pub enabled: bool,
    pub temporary_run_path: PathBuf,
    pub persistent_run_path: PathBuf,
}

impl Config {
    /// Parse a server configuration file.
    pub fn from_file(file: &Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(file).map_err(|e| io_err(file, e))?;
        let cfg = Config::from_str(&contents).map_err(|source| match source {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: file.to_path_buf(),
                source,
            },
            other => other,
        })?;
        tracing::info!("loaded configuration: {}", file.display());
        Ok(cfg)
    }

    /// Parse a server configuration document from a string.
    pub fn from_str(s: &str) -> Result<Config, ConfigError> {
        let mut cfg: Config = serde_yaml::from_str(s).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        if cfg.format_version == 0 {
            cfg.format_version = FORMAT_VERSION;
        }
        cfg.absolutize_paths();
        Ok(cfg)
    }

    fn absolutize_paths(&mut self) {
        for path in [
            &mut self.template_path,
            &mut self.build_path,
            &mut self.nginx.run_path,
            &mut self.systemd.run_path,
            &mut self.ssl.run_path,
            &mut self.volume.temporary_run_path,
            &mut self.volume.persistent_run_path,
        ] {
            if !path.as_os_str().is_empty() && path.is_relative() {
                if let Ok(cwd) = std::env::current_dir() {
                    *path = cwd.join(path.as_path());
                }
            }
        }
    }
}

impl SslDirective {
    /// Finds a system certificate whose pattern matches the given domain.
    pub fn system_certificate(&self, domain: &str) -> Result<String, ConfigError> {
        self.match_system(domain).map(|d| d.certificate.clone())
    }

    /// Pendant to [`SslDirective::system_certificate`].
    pub fn system_certificate_key(&self, domain: &str) -> Result<String, ConfigError> {
        self.match_system(domain).map(|d| d.certificate_key.clone())
    }

    fn match_system(&self, domain: &str) -> Result<&SystemSslDirective, ConfigError> {
        for d in self.system.values() {
            let pattern = glob::Pattern::new(&d.pattern).map_err(|e| {
                ConfigError::Validate(format!(
                    "bad system certificate pattern {}: {e}",
                    d.pattern
                ))
            })?;
            if pattern.matches(domain) {
                return Ok(d);
            }
        }
        Err(ConfigError::Validate(format!(
            "no system certificate found for FQDN {domain}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_enable_flags_and_extras() {
        let doc = r#"
user: www-data
group: www-data
templatePath: /etc/hoi/templates
buildPath: /var/lib/hoi/build
web: { enabled: true }
nginx: { runPath: /etc/nginx/sites-enabled }
database: { enabled: true }
mysql: { host: localhost, user: root, password: s3cret }
php: { enabled: true, version: "7.2", service: "php{{ P.app.version }}-fpm" }
"#;
        let cfg = Config::from_str(doc).expect("parse");
        assert!(cfg.web.enabled);
        assert!(cfg.database.enabled);
        assert!(!cfg.worker.enabled);
        assert_eq!(cfg.mysql.host, "localhost");
        assert_eq!(cfg.php.version, "7.2");
        assert_eq!(cfg.format_version, FORMAT_VERSION);
    }

    #[test]
    fn system_certificate_matches_by_pattern() {
        let mut ssl = SslDirective::default();
        ssl.system.insert(
            "star".to_string(),
            SystemSslDirective {
                pattern: "*.example.org".to_string(),
                certificate: "/etc/ssl/certs/star.example.org.crt".to_string(),
                certificate_key: "/etc/ssl/private/star.example.org.key".to_string(),
            },
        );

        let cert = ssl.system_certificate("www.example.org").expect("match");
        assert_eq!(cert, "/etc/ssl/certs/star.example.org.crt");
        assert!(ssl.system_certificate("example.net").is_err());
    }
}
