//! PHP adapter: per-project PHP configuration.
//!
//! A single configuration file is placed where PHP looks for autoloadable
//! configuration (the `PATH` ini feature); the FPM service is then asked to
//! reload. Other approaches have proven to be buggy.

use std::path::PathBuf;

use hoi_core::{project, server};

use crate::cmd;
use crate::error::{io_err, SystemError};
use crate::flag;

pub struct Php<'a> {
    p: &'a project::Config,
    s: &'a server::Config,
}

impl<'a> Php<'a> {
    pub fn new(p: &'a project::Config, s: &'a server::Config) -> Php<'a> {
        Php { p, s }
    }

    fn target(&self) -> Result<PathBuf, SystemError> {
        let run_path = self.p.app.run_path(self.p, self.s)?;
        Ok(PathBuf::from(run_path).join(format!("99-project-{}.ini", self.p.id())))
    }

    /// Installs the per-project ini fragment.
    pub fn install(&self, path: &std::path::Path) -> Result<(), SystemError> {
        let target = self.target()?;
        tracing::info!("PHP is installing: {} -> {}", path.display(), target.display());

        flag::PHP.mark();
        cmd::copy_file(path, &target)
    }

    pub fn uninstall(&self) -> Result<(), SystemError> {
        let target = self.target()?;
        tracing::info!("PHP is uninstalling: {}", target.display());

        flag::PHP.mark();
        std::fs::remove_file(&target).map_err(|e| io_err(&target, e))
    }

    pub fn is_installed(&self) -> Result<bool, SystemError> {
        Ok(self.target()?.exists())
    }

    /// Reloads the FPM service when per-project configuration changed,
    /// clearing the dirty flag on success.
    pub fn reload_if_dirty(&self) -> Result<(), SystemError> {
        let service = self.p.app.service_unit(self.p, self.s)?;
        flag::PHP.reload_if_set(|| {
            tracing::info!("PHP is reloading: {}", service);
            cmd::run("systemctl", &["reload", &service])
                .map(|_| ())
                .map_err(|source| SystemError::Dirty {
                    subsystem: "PHP",
                    source: Box::new(source),
                })
        })
    }
}
