//! Supervises the app's own HTTP server for service-kind projects.

use hoi_builder::{base_context, Builder, Kind};
use hoi_core::{command, project, server};
use hoi_system::{Systemctl, Systemd, SystemdKind};

use crate::error::RunnerError;
use crate::Runner;

pub struct AppServiceRunner<'a> {
    s: &'a server::Config,
    p: &'a project::Config,
    build: Builder<'a>,
    sys: Systemd<'a>,
}

impl<'a> AppServiceRunner<'a> {
    pub fn new(
        s: &'a server::Config,
        p: &'a project::Config,
        conn: &'a Systemctl,
    ) -> AppServiceRunner<'a> {
        AppServiceRunner {
            s,
            p,
            build: Builder::new(Kind::AppService, p, s),
            sys: Systemd::new(SystemdKind::AppService, p, s, conn),
        }
    }
}

impl Runner for AppServiceRunner<'_> {
    fn name(&self) -> &'static str {
        "app-service"
    }

    fn disable(&self) -> Result<(), RunnerError> {
        for unit in self.sys.list_installed_services()? {
            self.sys.stop_and_disable(&unit)?;
            self.sys.uninstall(&unit)?;
        }
        self.build.clean()?;
        Ok(())
    }

    fn enable(&self) -> Result<(), RunnerError> {
        if !self.p.app.has_command() {
            return Ok(()); // nothing to do
        }

        let t_service = self.build.load_template("default.service")?;

        let mut p = self.p.clone();
        p.app.command = command::render_absolute(&p.app.command, self.p)?;

        let ctx = base_context(&p, self.s);
        self.build
            .write_template("default.service", &t_service, &ctx)?;

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
