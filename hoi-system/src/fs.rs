//! Filesystem adapter: volume source preparation and volume dumps.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use nix::unistd::{Gid, Group, Uid, User};

use hoi_core::volume::VolumeDirective;
use hoi_core::{project, server};

use crate::error::{io_err, SystemError};

pub struct Filesystem<'a> {
    p: &'a project::Config,
    s: &'a server::Config,
}

impl<'a> Filesystem<'a> {
    pub fn new(p: &'a project::Config, s: &'a server::Config) -> Filesystem<'a> {
        Filesystem { p, s }
    }

    /// Sets up the source end of a volume; the target end is created by the
    /// bind mount itself. The setup is intentionally kept simple and does
    /// not try to protect files inside the project more than standard
    /// permission settings do.
    pub fn setup_volume(&self, v: &VolumeDirective) -> Result<(), SystemError> {
        let run_path = v.run_path(self.p, self.s);
        let src = v.source(self.p, self.s);

        // The per-project directory gets restrictive permissions; hoi runs
        // as root, so ownership needs no further restriction.
        if !run_path.exists() {
            std::fs::create_dir_all(&run_path).map_err(|e| io_err(&run_path, e))?;
            std::fs::set_permissions(&run_path, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| io_err(&run_path, e))?;
        }

        // Actual source directories use more open permissions: they are
        // bind mounted, tree traversal isn't necessary to see their
        // contents, and material written by the web/worker user must stay
        // accessible.
        if !src.exists() {
            std::fs::create_dir_all(&src).map_err(|e| io_err(&src, e))?;
            // Mkdir honors the umask; chmod afterwards instead of touching
            // the process-wide umask.
            std::fs::set_permissions(&src, std::fs::Permissions::from_mode(0o755))
                .map_err(|e| io_err(&src, e))?;

            let (uid, gid) = self.server_principal()?;
            nix::unistd::chown(&src, Some(uid), Some(gid)).map_err(|errno| {
                io_err(&src, std::io::Error::from_raw_os_error(errno as i32))
            })?;
        }
        Ok(())
    }

    /// Streams a volume's tree into the archive under
    /// `volume/<volume-path>/…`. Directories and symlinks contribute
    /// headers only; regular file data is not compressed as it can be
    /// assumed to be mostly pre-compressed media.
    pub fn dump_volume<W: std::io::Write>(
        &self,
        v: &VolumeDirective,
        tw: &mut tar::Builder<W>,
    ) -> Result<(), SystemError> {
        let source = v.source(self.p, self.s);
        let base = Path::new("volume").join(&v.path);

        for entry in walkdir::WalkDir::new(&source).follow_links(false) {
            let entry = entry.map_err(|e| SystemError::Io {
                path: source.clone(),
                source: e.into(),
            })?;
            let Ok(rel) = entry.path().strip_prefix(&source) else {
                continue;
            };
            let name = base.join(rel);

            tw.append_path_with_name(entry.path(), &name)
                .map_err(|e| io_err(entry.path(), e))?;
        }
        Ok(())
    }

    fn server_principal(&self) -> Result<(Uid, Gid), SystemError> {
        let user = User::from_name(&self.s.user)
            .map_err(|errno| {
                io_err(&self.s.user, std::io::Error::from_raw_os_error(errno as i32))
            })?
            .ok_or_else(|| SystemError::UnknownPrincipal {
                name: self.s.user.clone(),
            })?;
        let group = Group::from_name(&self.s.group)
            .map_err(|errno| {
                io_err(&self.s.group, std::io::Error::from_raw_os_error(errno as i32))
            })?
            .ok_or_else(|| SystemError::UnknownPrincipal {
                name: self.s.group.clone(),
            })?;
        Ok((user.uid, group.gid))
    }
}
