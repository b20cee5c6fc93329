//! Configures PHP on a per project basis.
//!
//! A single ini fragment is built and installed into the place where PHP
//! looks for autoloadable configuration files.

use hoi_builder::{base_context, Builder, Kind};
use hoi_core::app::AppKind;
use hoi_core::{project, server};
use hoi_system::Php;

use crate::error::RunnerError;
use crate::Runner;

pub struct PhpRunner<'a> {
    s: &'a server::Config,
    p: &'a project::Config,
    build: Builder<'a>,
    sys: Php<'a>,
}

impl<'a> PhpRunner<'a> {
    pub fn new(s: &'a server::Config, p: &'a project::Config) -> PhpRunner<'a> {
        PhpRunner {
            s,
            p,
            build: Builder::new(Kind::Php, p, s),
            sys: Php::new(p, s),
        }
    }
}

impl Runner for PhpRunner<'_> {
    fn name(&self) -> &'static str {
        "php"
    }

    fn disable(&self) -> Result<(), RunnerError> {
        if self.p.app.kind != AppKind::Php {
            return Ok(()); // nothing to disable
        }
        if self.sys.is_installed()? {
            self.sys.uninstall()?;
        }
        self.build.clean()?;
        Ok(())
    }

    fn enable(&self) -> Result<(), RunnerError> {
        if self.p.app.kind != AppKind::Php {
            return Ok(()); // nothing to do
        }

        let t_ini = self.build.load_template("php.ini")?;
        let ctx = base_context(self.p, self.s);
        self.build.write_template("php.ini", &t_ini, &ctx)?;

        for file in self.build.list_available()? {
            self.sys.install(&file)?;
        }
        Ok(())
    }

    fn commit(&self) -> Result<(), RunnerError> {
        if self.p.app.kind != AppKind::Php {
            return Ok(());
        }
        Ok(self.sys.reload_if_dirty()?)
    }
}
