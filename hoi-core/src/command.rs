//! Command string rendering shared by the app, cron and worker directives.

use std::path::Path;

use crate::error::ConfigError;
use crate::project::Config;

/// Renders a command string against the project configuration.
///
/// Command strings may use template syntax; the project configuration is
/// made available as `P`:
///
/// ```text
/// bin/server -l {{ P.app.host }}:{{ P.app.port }}
/// ```
///
/// Rendering only happens when necessary, most commands will not use
/// templating.
pub fn render(command: &str, p: &Config) -> Result<String, ConfigError> {
    if !command.contains("{{") {
        return Ok(command.to_string());
    }
    tracing::debug!("parsing command template: {}", command);

    let mut ctx = tera::Context::new();
    ctx.insert("P", p);

    tera::Tera::one_off(command, &ctx, false).map_err(|source| ConfigError::Template {
        template: command.to_string(),
        source,
    })
}

/// Renders a command string and makes it absolute.
///
/// When used inside systemd unit files paths need to be absolute. A
/// non-absolute command is treated as being relative to the project root
/// directory.
pub fn render_absolute(command: &str, p: &Config) -> Result<String, ConfigError> {
    let cmd = render(command, p)?;
    if Path::new(&cmd).is_absolute() {
        return Ok(cmd);
    }
    Ok(p.path.join(cmd).to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn project() -> Config {
        let mut cfg = Config::default();
        cfg.path = PathBuf::from("/var/www/foo");
        cfg.name = "foo".to_string();
        cfg.app.host = "localhost".to_string();
        cfg.app.port = 8080;
        cfg
    }

    #[test]
    fn plain_command_passes_through() {
        let cmd = render("bin/worker --once", &project()).expect("render");
        assert_eq!(cmd, "bin/worker --once");
    }

    #[test]
    fn templated_command_references_project() {
        let cmd = render("bin/server -l {{ P.app.host }}:{{ P.app.port }}", &project())
            .expect("render");
        assert_eq!(cmd, "bin/server -l localhost:8080");
    }

    #[test]
    fn relative_command_is_anchored_at_project_root() {
        let cmd = render_absolute("bin/worker", &project()).expect("render");
        assert_eq!(cmd, "/var/www/foo/bin/worker");
    }

    #[test]
    fn absolute_command_is_left_alone() {
        let cmd = render_absolute("/usr/bin/true", &project()).expect("render");
        assert_eq!(cmd, "/usr/bin/true");
    }
}
