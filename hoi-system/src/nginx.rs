//! NGINX adapter: manages per-project server configuration files inside
//! the NGINX run path (i.e. `/etc/nginx/sites-enabled`).

use std::path::PathBuf;

use hoi_core::{project, server};

use crate::cmd;
use crate::error::{io_err, SystemError};
use crate::flag;

pub struct Nginx<'a> {
    p: &'a project::Config,
    s: &'a server::Config,
}

impl<'a> Nginx<'a> {
    pub fn new(p: &'a project::Config, s: &'a server::Config) -> Nginx<'a> {
        Nginx { p, s }
    }

    fn ns(&self) -> String {
        format!("project_{}", self.p.id())
    }

    fn target(&self, name: &str) -> PathBuf {
        self.s
            .nginx
            .run_path
            .join(format!("{}_{}", self.ns(), name))
    }

    /// Places a copy of a built server configuration under the run path.
    pub fn install(&self, path: &std::path::Path) -> Result<(), SystemError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = self.target(&name);

        tracing::info!("NGINX is installing: {} -> {}", path.display(), target.display());

        flag::NGINX.mark();
        cmd::copy_file(path, &target)
    }

    /// Removes one installed server configuration by name.
    pub fn uninstall(&self, name: &str) -> Result<(), SystemError> {
        let target = self.target(name);

        tracing::info!("NGINX is uninstalling: {}", target.display());

        flag::NGINX.mark();
        std::fs::remove_file(&target).map_err(|e| io_err(&target, e))
    }

    /// Enumerates installed server configurations for this project,
    /// stripped of the project namespace.
    pub fn list_installed(&self) -> Result<Vec<String>, SystemError> {
        let prefix = format!("{}_", self.ns());
        let dir = &self.s.nginx.run_path;
        let mut servers = Vec::new();

        if !dir.exists() {
            return Ok(servers);
        }
        for entry in std::fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
            let entry = entry.map_err(|e| io_err(dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stripped) = name.strip_prefix(&prefix) {
                servers.push(stripped.to_string());
            }
        }
        servers.sort();
        Ok(servers)
    }

    /// Reloads NGINX when the server configuration changed, clearing the
    /// dirty flag on success.
    pub fn reload_if_dirty(&self) -> Result<(), SystemError> {
        flag::NGINX.reload_if_set(|| {
            tracing::info!("NGINX is reloading");
            reload_cmd()
        })
    }

    /// Unconditionally reloads NGINX; used when new crypto material
    /// requires a reload even though no server block changed. Clears the
    /// dirty flag on success.
    pub fn reload(&self) -> Result<(), SystemError> {
        tracing::info!("NGINX is reloading");
        reload_cmd()?;
        flag::NGINX.clear();
        Ok(())
    }
}

fn reload_cmd() -> Result<(), SystemError> {
    cmd::run("systemctl", &["reload", "nginx"])
        .map(|_| ())
        .map_err(|source| SystemError::Dirty {
            subsystem: "NGINX",
            source: Box::new(source),
        })
}
