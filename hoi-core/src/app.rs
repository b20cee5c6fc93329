//! The app directive, describing what kind of application a project runs.

use std::net::TcpListener;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::project::Config;
use crate::server;

/// The kind of app a project runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppKind {
    #[default]
    Unknown,
    /// Static contents only, served directly by the HTTP server.
    Static,
    /// A generic service that starts its own HTTP server we proxy to.
    Service,
    /// A project using .php files, optionally routing all requests through
    /// a front controller.
    Php,
}

/// Describes the application run inside a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AppDirective {
    /// The kind of app; optional, will be autodetected.
    pub kind: AppKind,
    /// The semantic version of the app language. For a PHP app this switches
    /// the FPM socket by major version, so projects can run side by side.
    pub version: String,
    /// Used only for service apps. Defaults to localhost.
    pub host: String,
    /// Used only for service apps. By default the next free non-privileged
    /// port is picked.
    pub port: u16,
    /// A command string that starts an HTTP server; may be a path (relative
    /// to project root or absolute) or a template evaluating to one.
    /// Used only for service apps.
    pub command: String,
    /// Whether incoming URLs are rewritten onto the front controller.
    /// Used only for static and PHP apps.
    pub use_front_controller: bool,
    /// Whether try_files cannot be used for front controller rewrites;
    /// autodetected. Older PHP frameworks need this.
    pub use_legacy_front_controller: bool,
}

impl AppDirective {
    pub fn has_command(&self) -> bool {
        !self.command.is_empty()
    }

    /// Name of the systemd service unit backing this app kind (including
    /// the unit suffix). Only PHP apps have a corresponding service that
    /// needs reloading on configuration changes.
    pub fn service_unit(&self, p: &Config, s: &server::Config) -> Result<String, ConfigError> {
        if self.kind != AppKind::Php {
            return Err(ConfigError::Augment(format!(
                "app kind {:?} has no service unit",
                self.kind
            )));
        }
        let service = render_config_template(&s.php.service, p, s)?;
        Ok(format!("{service}.service"))
    }

    /// Path into which per-project configuration for this app kind is
    /// installed. Only PHP apps take outside configuration.
    pub fn run_path(&self, p: &Config, s: &server::Config) -> Result<String, ConfigError> {
        if self.kind != AppKind::Php {
            return Err(ConfigError::Augment(format!(
                "app kind {:?} has no run path",
                self.kind
            )));
        }
        render_config_template(&s.php.run_path, p, s)
    }

    /// Major part of the version string, falling back to the server-level
    /// default version for the app kind.
    pub fn major_version(&self, s: &server::Config) -> Result<u64, ConfigError> {
        let version = if !self.version.is_empty() {
            self.version.clone()
        } else if self.kind == AppKind::Php {
            s.php.version.clone()
        } else {
            return Err(ConfigError::Augment(format!(
                "no default version for app kind {:?}",
                self.kind
            )));
        };
        version
            .split('.')
            .next()
            .and_then(|major| major.parse().ok())
            .ok_or_else(|| {
                ConfigError::Augment(format!("failed to parse app version: {version}"))
            })
    }

    /// Next free port we want to assign to the app, discovered by binding
    /// port 0 and reading back what the kernel handed out.
    pub fn free_port(&self) -> Result<u16, ConfigError> {
        let host = if self.host.is_empty() {
            "localhost"
        } else {
            self.host.as_str()
        };
        let listener = TcpListener::bind((host, 0))
            .map_err(|e| ConfigError::Augment(format!("failed to find free port: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| ConfigError::Augment(format!("failed to find free port: {e}")))?
            .port();
        Ok(port)
    }
}

/// Server configuration strings (PHP service name, run path) may themselves
/// be templates over `P` and `S`.
fn render_config_template(
    tmpl: &str,
    p: &Config,
    s: &server::Config,
) -> Result<String, ConfigError> {
    if !tmpl.contains("{{") {
        return Ok(tmpl.to_string());
    }
    let mut ctx = tera::Context::new();
    ctx.insert("P", p);
    ctx.insert("S", s);
    tera::Tera::one_off(tmpl, &ctx, false).map_err(|source| ConfigError::Template {
        template: tmpl.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_port_is_non_privileged() {
        let app = AppDirective::default();
        let port = app.free_port().expect("free port");
        assert!(port >= 1024);
    }

    #[test]
    fn service_unit_renders_php_service_template() {
        let mut p = Config::default();
        p.app.kind = AppKind::Php;
        p.app.version = "7.2.1".to_string();

        let mut s = server::Config::default();
        s.php.service = "php{{ P.app.version }}-fpm".to_string();

        let unit = p.app.service_unit(&p.clone(), &s).expect("unit");
        assert_eq!(unit, "php7.2.1-fpm.service");
    }

    #[test]
    fn major_version_uses_server_default_for_php() {
        let mut app = AppDirective::default();
        app.kind = AppKind::Php;

        let mut s = server::Config::default();
        s.php.version = "7.2".to_string();

        assert_eq!(app.major_version(&s).expect("version"), 7);
    }

    #[test]
    fn non_php_app_has_no_service_unit() {
        let app = AppDirective {
            kind: AppKind::Static,
            ..AppDirective::default()
        };
        assert!(app
            .service_unit(&Config::default(), &server::Config::default())
            .is_err());
    }
}
