//! systemd adapter: installs and activates per-project unit files.
//!
//! Unit files are namespaced by project: non-mount units are prefixed with
//! `project_<id>_<kind>_`, mount units carry the path-escaped mount target
//! as their name verbatim (systemd requires mount unit names to match the
//! mount point).

use std::fmt;
use std::path::Path;

use hoi_core::{project, server};

use crate::cmd;
use crate::error::{io_err, SystemError};
use crate::flag;

/// Lazily established handle to the init system, shared across all
/// pipelines and closed on daemon termination.
pub struct Systemctl {
    use_legacy: bool,
}

impl Systemctl {
    pub fn new(use_legacy: bool) -> Systemctl {
        Systemctl { use_legacy }
    }

    /// Probes the init system once; fails early when systemctl is not
    /// available on this host.
    pub fn connect(s: &server::Config) -> Result<Systemctl, SystemError> {
        cmd::run("systemctl", &["--version"])?;
        Ok(Systemctl::new(s.systemd.use_legacy))
    }
}

/// The hoi-internal kinds of units we manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemdKind {
    AppService,
    Cron,
    Worker,
    Volume,
}

impl SystemdKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemdKind::AppService => "app_service",
            SystemdKind::Cron => "cron",
            SystemdKind::Worker => "worker",
            SystemdKind::Volume => "volume",
        }
    }
}

impl fmt::Display for SystemdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Systemd<'a> {
    kind: SystemdKind,
    p: &'a project::Config,
    s: &'a server::Config,
    conn: &'a Systemctl,
}

impl<'a> Systemd<'a> {
    pub fn new(
        kind: SystemdKind,
        p: &'a project::Config,
        s: &'a server::Config,
        conn: &'a Systemctl,
    ) -> Systemd<'a> {
        Systemd { kind, p, s, conn }
    }

    fn ns(&self) -> String {
        format!("project_{}_{}", self.p.id(), self.kind)
    }

    /// Full unit name as known to systemd. Mount units are not prefixed;
    /// their name is the escaped mount target and must stay that way.
    fn full_unit_name(&self, unit: &str) -> String {
        match self.kind {
            SystemdKind::Volume => unit.to_string(),
            _ => format!("{}_{}", self.ns(), unit),
        }
    }

    /// Installs a built unit file into the unit directory, namespaced by
    /// project.
    pub fn install(&self, path: &Path) -> Result<(), SystemError> {
        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = self.s.systemd.run_path.join(self.full_unit_name(&base));

        tracing::info!("systemd install: {} -> {}", path.display(), target.display());

        flag::SYSTEMD.mark();
        cmd::copy_file(path, &target)
    }

    /// Removes an installed unit file by its (namespace-stripped) name.
    pub fn uninstall(&self, unit: &str) -> Result<(), SystemError> {
        let target = self.s.systemd.run_path.join(self.full_unit_name(unit));

        tracing::info!("systemd uninstall: {}", target.display());

        flag::SYSTEMD.mark();
        std::fs::remove_file(&target).map_err(|e| io_err(&target, e))
    }

    /// Enables the unit persistently (survives reboot) and starts it. Where
    /// the init system supports `--now` both happen in one atomic call, on
    /// legacy systems they are split into two serial calls.
    pub fn enable_and_start(&self, unit: &str) -> Result<(), SystemError> {
        let full = self.full_unit_name(unit);
        tracing::info!("systemd enable+start: {}", full);

        if self.conn.use_legacy {
            cmd::run("systemctl", &["enable", &full])?;
            cmd::run("systemctl", &["start", &full]).map(|_| ())
        } else {
            cmd::run("systemctl", &["enable", "--now", &full]).map(|_| ())
        }
    }

    /// Stops the unit and disables it persistently.
    pub fn stop_and_disable(&self, unit: &str) -> Result<(), SystemError> {
        let full = self.full_unit_name(unit);
        tracing::info!("systemd stop+disable: {}", full);

        if self.conn.use_legacy {
            cmd::run("systemctl", &["stop", &full])?;
            cmd::run("systemctl", &["disable", &full]).map(|_| ())
        } else {
            cmd::run("systemctl", &["disable", "--now", &full]).map(|_| ())
        }
    }

    pub fn stop(&self, unit: &str) -> Result<(), SystemError> {
        let full = self.full_unit_name(unit);
        tracing::info!("systemd stop: {}", full);

        cmd::run("systemctl", &["stop", &full]).map(|_| ())
    }

    /// Lists installed service units, stripped of the project namespace.
    pub fn list_installed_services(&self) -> Result<Vec<String>, SystemError> {
        self.list_units("service")
    }

    /// Lists installed timer units, stripped of the project namespace.
    pub fn list_installed_timers(&self) -> Result<Vec<String>, SystemError> {
        self.list_units("timer")
    }

    /// Lists installed mount units for this project. Mount unit names are
    /// returned verbatim.
    pub fn list_installed_mounts(&self) -> Result<Vec<String>, SystemError> {
        let pattern = format!("{}-*.mount", escape_unit_path(&self.p.path));
        let out = cmd::run(
            "systemctl",
            &["list-units", &pattern, "--no-legend", "--no-pager"],
        )?;
        let units = parse_list_units(&String::from_utf8_lossy(&out.stdout), "", "mount");
        tracing::info!("systemd found {} installed mount unit/s", units.len());
        Ok(units)
    }

    fn list_units(&self, suffix: &str) -> Result<Vec<String>, SystemError> {
        let ns = self.ns();
        let pattern = format!("{ns}_*.{suffix}");
        let out = cmd::run(
            "systemctl",
            &["list-units", &pattern, "--no-legend", "--no-pager"],
        )?;
        let units = parse_list_units(&String::from_utf8_lossy(&out.stdout), &ns, suffix);
        tracing::info!(
            "systemd found {} installed {} unit/s: {:?}",
            units.len(),
            suffix,
            units
        );
        Ok(units)
    }

    /// Issues one daemon reload when the unit directory was mutated,
    /// clearing the dirty flag on success.
    pub fn reload_if_dirty(&self) -> Result<(), SystemError> {
        flag::SYSTEMD.reload_if_set(|| {
            tracing::info!("systemd is reloading");
            cmd::run("systemctl", &["daemon-reload"])
                .map(|_| ())
                .map_err(|source| SystemError::Dirty {
                    subsystem: "systemd",
                    source: Box::new(source),
                })
        })
    }

    /// Name of the mount unit for a mount target below the project root.
    pub fn mount_unit_name(&self, target: &Path) -> String {
        format!("{}.mount", escape_unit_path(target))
    }
}

/// Parses `systemctl list-units` output. The first field of each line is
/// the unit name:
///
/// ```text
/// project_2c2605b0_worker_media-fix@1.service loaded active running Worker ...
/// ```
///
/// Unit names are stripped of `<ns>_`; an empty `ns` keeps them verbatim.
fn parse_list_units(out: &str, ns: &str, suffix: &str) -> Vec<String> {
    let dot_suffix = format!(".{suffix}");
    let prefix = format!("{ns}_");

    out.lines()
        .filter_map(|line| {
            let unit = line.split_whitespace().next()?;
            if !unit.ends_with(&dot_suffix) {
                return None;
            }
            if ns.is_empty() {
                return Some(unit.to_string());
            }
            unit.strip_prefix(&prefix).map(str::to_string)
        })
        .collect()
}

/// Escapes a filesystem path for use in a unit name the way
/// systemd-escape --path does: leading and trailing slashes are dropped,
/// remaining slashes become dashes, and any byte outside [a-zA-Z0-9:_.]
/// (or a leading dot) is written as \xXX.
pub fn escape_unit_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    let trimmed = s.trim_matches('/');
    if trimmed.is_empty() {
        return "-".to_string();
    }

    let mut out = String::with_capacity(trimmed.len());
    for (i, &b) in trimmed.as_bytes().iter().enumerate() {
        match b {
            b'/' => out.push('-'),
            b'.' if i > 0 => out.push('.'),
            b if b.is_ascii_alphanumeric() || b == b'_' || b == b':' => out.push(b as char),
            b => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_units_output() {
        let out = "project_2c2605b0_worker_document@1.service      not-found inactive dead    project_2c2605b0_worker_document@1.service
project_2c2605b0_worker_media-fix@1.service     loaded    active   running Worker media-fix for project npiece@dev
project_2c2605b0_worker_media-fix@2.service     loaded    active   running Worker media-fix for project npiece@dev
project_2c2605b0_worker_media-fixflux@1.service not-found inactive dead    project_2c2605b0_worker_media-fixflux@1.service
";
        let units = parse_list_units(out, "project_2c2605b0_worker", "service");
        assert_eq!(units.len(), 4);
        assert_eq!(units[0], "document@1.service");
        assert_eq!(units[1], "media-fix@1.service");
    }

    #[test]
    fn parses_empty_list_units_output() {
        let units = parse_list_units("", "project_2c2605b0_worker", "service");
        assert!(units.is_empty());
    }

    #[test]
    fn mount_listing_keeps_full_unit_names() {
        let out = "var-www-foo-media.mount loaded active mounted /var/www/foo/media\n";
        let units = parse_list_units(out, "", "mount");
        assert_eq!(units, vec!["var-www-foo-media.mount"]);
    }

    #[test]
    fn escapes_unit_paths() {
        assert_eq!(escape_unit_path(Path::new("/var/www/foo")), "var-www-foo");
        assert_eq!(
            escape_unit_path(Path::new("/var/www/foo/tmp/cache")),
            "var-www-foo-tmp-cache"
        );
        assert_eq!(escape_unit_path(Path::new("/")), "-");
        assert_eq!(
            escape_unit_path(Path::new("/srv/foo bar")),
            "srv-foo\\x20bar"
        );
    }

    #[test]
    fn mount_units_are_not_prefixed() {
        let mut p = project::Config::default();
        p.path = "/var/www/foo".into();
        let s = server::Config::default();
        let conn = Systemctl::new(false);

        let mounts = Systemd::new(SystemdKind::Volume, &p, &s, &conn);
        assert_eq!(
            mounts.full_unit_name("var-www-foo-media.mount"),
            "var-www-foo-media.mount"
        );

        let workers = Systemd::new(SystemdKind::Worker, &p, &s, &conn);
        assert_eq!(
            workers.full_unit_name("media@1.service"),
            format!("project_{}_worker_media@1.service", p.id())
        );
    }
}
