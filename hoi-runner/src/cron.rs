//! Starts cron jobs using systemd timers.

use hoi_builder::{base_context, Builder, Kind};
use hoi_core::{command, project, server};
use hoi_system::{Systemctl, Systemd, SystemdKind};

use crate::error::RunnerError;
use crate::Runner;

pub struct CronRunner<'a> {
    s: &'a server::Config,
    p: &'a project::Config,
    build: Builder<'a>,
    sys: Systemd<'a>,
}

impl<'a> CronRunner<'a> {
    pub fn new(
        s: &'a server::Config,
        p: &'a project::Config,
        conn: &'a Systemctl,
    ) -> CronRunner<'a> {
        CronRunner {
            s,
            p,
            build: Builder::new(Kind::Cron, p, s),
            sys: Systemd::new(SystemdKind::Cron, p, s, conn),
        }
    }
}

impl Runner for CronRunner<'_> {
    fn name(&self) -> &'static str {
        "cron"
    }

    fn disable(&self) -> Result<(), RunnerError> {
        for timer in self.sys.list_installed_timers()? {
            self.sys.stop_and_disable(&timer)?;
            self.sys.uninstall(&timer)?;

            // Companion service units never show up in
            // list_installed_services as they are not enabled; derive them
            // from the timer name.
            let service = timer.replace(".timer", ".service");

            // An especially long running job might still be going, kill it
            // first. Only the timer is enabled, the service must merely be
            // stopped.
            self.sys.stop(&service)?;
            self.sys.uninstall(&service)?;
        }
        self.build.clean()?;
        Ok(())
    }

    fn enable(&self) -> Result<(), RunnerError> {
        if self.p.cron.is_empty() {
            return Ok(()); // nothing to do
        }

        let t_service = self.build.load_template("default.service")?;
        let t_timer = self.build.load_template("default.timer")?;

        for c in self.p.cron.values() {
            let mut c = c.clone();
            c.command = command::render_absolute(&c.command, self.p)?;

            let mut ctx = base_context(self.p, self.s);
            ctx.insert("C", &c);

            self.build
                .write_template(&format!("{}.service", c.id()), &t_service, &ctx)?;
            self.build
                .write_template(&format!("{}.timer", c.id()), &t_timer, &ctx)?;
        }

        for file in self.build.list_available()? {
            self.sys.install(&file)?;
            if file.extension().is_some_and(|ext| ext == "timer") {
                let unit = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.sys.enable_and_start(&unit)?;
            }
        }
        Ok(())
    }

    fn commit(&self) -> Result<(), RunnerError> {
        Ok(self.sys.reload_if_dirty()?)
    }
}
