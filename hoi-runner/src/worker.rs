//! Starts long running worker processes using systemd templated units.
//!
//! One template unit `<id>@.service` is rendered per worker; instances are
//! enabled as `<id>@1.service` … `<id>@<N>.service`. Resource controls
//! (i.e. MemoryMax) in the unit template keep processes inside reasonable
//! bounds even when they leak memory or otherwise misbehave.

use hoi_builder::{base_context, Builder, Kind};
use hoi_core::{command, project, server};
use hoi_system::{Systemctl, Systemd, SystemdKind};

use crate::error::RunnerError;
use crate::Runner;

pub struct WorkerRunner<'a> {
    s: &'a server::Config,
    p: &'a project::Config,
    build: Builder<'a>,
    sys: Systemd<'a>,
}

impl<'a> WorkerRunner<'a> {
    pub fn new(
        s: &'a server::Config,
        p: &'a project::Config,
        conn: &'a Systemctl,
    ) -> WorkerRunner<'a> {
        WorkerRunner {
            s,
            p,
            build: Builder::new(Kind::Worker, p, s),
            sys: Systemd::new(SystemdKind::Worker, p, s, conn),
        }
    }
}

impl Runner for WorkerRunner<'_> {
    fn name(&self) -> &'static str {
        "worker"
    }

    fn disable(&self) -> Result<(), RunnerError> {
        let units = self.sys.list_installed_services()?;

        // At least one unit is needed to derive the template from.
        if units.is_empty() {
            self.build.clean()?;
            return Ok(());
        }

        // Units started from service templates have no file backing them,
        // the template has the file. Stopping must come first: instances
        // fail to disable once the template's file is gone.
        for unit in &units {
            self.sys.stop_and_disable(unit)?;
        }

        // Map an instance name (i.e. media@1.service) back to its template
        // (media@.service) for clean up.
        let template = units[0]
            .split_once('@')
            .map(|(base, _)| format!("{base}@.service"))
            .ok_or_else(|| {
                RunnerError::UnknownArtifact(format!(
                    "failed to parse unit template name from unit: {}",
                    units[0]
                ))
            })?;
        self.sys.uninstall(&template)?;

        self.build.clean()?;
        Ok(())
    }

    fn enable(&self) -> Result<(), RunnerError> {
        if self.p.worker.is_empty() {
            return Ok(()); // nothing to do
        }

        let t_service = self.build.load_template("default@.service")?;

        for w in self.p.worker.values() {
            let mut w = w.clone();
            w.command = command::render_absolute(&w.command, self.p)?;

            let mut ctx = base_context(self.p, self.s);
            ctx.insert("W", &w);

            self.build
                .write_template(&format!("{}@.service", w.id()), &t_service, &ctx)?;
        }

        for file in self.build.list_available()? {
            let base = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            // Map back to the worker directive, instances are needed.
            let id = base.strip_suffix("@.service").ok_or_else(|| {
                RunnerError::UnknownArtifact(format!("not a worker template unit: {base}"))
            })?;
            let w = self
                .p
                .worker
                .values()
                .find(|w| w.id() == id)
                .ok_or_else(|| {
                    RunnerError::UnknownArtifact(format!(
                        "failed to look up worker by id {id}, parsed incorrectly?"
                    ))
                })?;

            self.sys.install(&file)?;

            // A service template starts N instances of the service:
            // media@.service becomes media@1.service, media@2.service, ...
            for i in 1..=w.instances() {
                let unit = base.replace("@.service", &format!("@{i}.service"));
                self.sys.enable_and_start(&unit)?;
            }
        }
        Ok(())
    }

    fn commit(&self) -> Result<(), RunnerError> {
        Ok(self.sys.reload_if_dirty()?)
    }
}
