//! Establishes project volumes as bind mounts, both now and after reboot.

use hoi_builder::{base_context, Builder, Kind};
use hoi_core::{project, server};
use hoi_system::{Filesystem, Systemctl, Systemd, SystemdKind};

use crate::error::RunnerError;
use crate::{Dumper, Runner};

pub struct VolumeRunner<'a> {
    s: &'a server::Config,
    p: &'a project::Config,
    build: Builder<'a>,
    sys: Systemd<'a>,
    fs: Filesystem<'a>,
}

impl<'a> VolumeRunner<'a> {
    pub fn new(
        s: &'a server::Config,
        p: &'a project::Config,
        conn: &'a Systemctl,
    ) -> VolumeRunner<'a> {
        VolumeRunner {
            s,
            p,
            build: Builder::new(Kind::Volume, p, s),
            sys: Systemd::new(SystemdKind::Volume, p, s, conn),
            fs: Filesystem::new(p, s),
        }
    }
}

impl Runner for VolumeRunner<'_> {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn disable(&self) -> Result<(), RunnerError> {
        for unit in self.sys.list_installed_mounts()? {
            self.sys.stop_and_disable(&unit)?;
            self.sys.uninstall(&unit)?;
        }
        self.build.clean()?;
        Ok(())
    }

    fn enable(&self) -> Result<(), RunnerError> {
        if self.p.volume.is_empty() {
            return Ok(()); // nothing to do
        }

        let t_mount = self.build.load_template("default.mount")?;

        for v in self.p.volume.values() {
            self.fs.setup_volume(v)?;

            let mut ctx = base_context(self.p, self.s);
            ctx.insert("V", v);
            // Mount source and target are derived paths the template
            // cannot compute itself.
            ctx.insert("VolumeSource", &v.source(self.p, self.s));
            ctx.insert("VolumeTarget", &v.absolute_path(self.p));

            // A mount unit's file name must equal the path-escaped mount
            // target, or systemd refuses to start it.
            let unit = self.sys.mount_unit_name(&v.absolute_path(self.p));
            self.build.write_template(&unit, &t_mount, &ctx)?;
        }

        for file in self.build.list_available()? {
            self.sys.install(&file)?;
            let unit = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.sys.enable_and_start(&unit)?;
        }
        Ok(())
    }

    fn commit(&self) -> Result<(), RunnerError> {
        Ok(self.sys.reload_if_dirty()?)
    }
}

impl Dumper for VolumeRunner<'_> {
    /// Dumps all persistent volumes; temporary volumes are excluded.
    fn dump(&self, tw: &mut tar::Builder<std::fs::File>) -> Result<(), RunnerError> {
        for v in self.p.volume.values() {
            if v.is_temporary {
                continue;
            }
            tracing::info!("dumping volume {}", v.path);
            self.fs.dump_volume(v, tw)?;
        }
        Ok(())
    }
}
