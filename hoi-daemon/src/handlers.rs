//! Request handlers: parse and persist project configuration, then drive
//! the reconciliation pipeline and record the resulting status.

use std::collections::hash_map::Entry;
use std::path::Path;
use std::sync::Arc;

use hoi_core::domain::DomainDirective;
use hoi_core::meta::Status;
use hoi_core::{project, server};
use hoi_runner::{run_pipeline, select_dumpers, select_runners, Connections, Pipeline};
use hoi_store::{Entity, Store};
use hoi_system::Systemctl;

use crate::error::{io_err, DaemonError};

pub struct Handlers {
    pub server: server::Config,
    pub store: Arc<Store>,
    pub mysql: Option<mysql::Pool>,
    pub systemd: Systemctl,
}

impl Handlers {
    fn connections(&self) -> Connections<'_> {
        Connections {
            mysql: self.mysql.as_ref(),
            systemd: &self.systemd,
        }
    }

    /// Parses, augments and validates the Hoifile under the project root.
    /// Nothing is touched when any of the three fails.
    fn project_from_path(&self, path: &Path) -> Result<project::Config, DaemonError> {
        let mut p = project::Config::from_file(&path.join("Hoifile"))?;
        p.augment()?;
        p.validate()?;
        Ok(p)
    }

    /// Persists the project and runs a pipeline shape against it,
    /// surrounding step execution with the given status transitions.
    fn reconcile(
        &self,
        p: &project::Config,
        during: Status,
        pipeline: Pipeline,
    ) -> Result<(), DaemonError> {
        let id = p.id();
        self.store.write_status(&id, during)?;

        let conns = self.connections();
        let runners = select_runners(&self.server, p, &conns);

        match run_pipeline(&runners, pipeline) {
            Ok(()) => {
                self.store.write_status(&id, Status::Active)?;
                Ok(())
            }
            Err(step) => {
                self.store.write_status(&id, Status::Failed)?;
                Err(step.into())
            }
        }
    }

    pub fn status(&self, path: &Path) -> Result<Entity, DaemonError> {
        Ok(self.store.read(&project::path_to_id(path))?)
    }

    pub fn status_all(&self) -> Vec<Entity> {
        self.store.read_all()
    }

    /// Parse the Hoifile under `path`, persist the project with status
    /// Loading, and run the full pipeline.
    pub fn load(&self, path: &Path) -> Result<(), DaemonError> {
        tracing::info!("loading project from: {}", path.display());

        let p = self.project_from_path(path)?;
        self.store.write(&p.id(), p.clone())?;
        self.reconcile(&p, Status::Loading, Pipeline::Full)
            .map_err(|e| annotate(e, "load", &p))?;

        tracing::info!("project {} is now active :)", p.pretty_name());
        Ok(())
    }

    /// Like load, but reads from the path the store knows for the project.
    pub fn reload(&self, path: &Path) -> Result<(), DaemonError> {
        let id = project::path_to_id(path);
        let e = self.store.read(&id)?;

        let p = self.project_from_path(&e.project.path)?;
        self.store.write(&p.id(), p.clone())?;
        self.reconcile(&p, Status::Reloading, Pipeline::Full)
            .map_err(|err| annotate(err, "reload", &p))?;

        tracing::info!("project {} reloaded", p.pretty_name());
        Ok(())
    }

    pub fn reload_all(&self) -> Result<(), DaemonError> {
        let all = self.store.read_all();
        let total = all.len();
        let mut failures = Vec::new();

        for e in all {
            if let Err(err) = self.reload(&e.project.path) {
                // A failure before the pipeline even started (i.e. a parse
                // error) has not set a status yet.
                let _ = self.store.write_status(&e.project.id(), Status::Failed);
                failures.push(format!("{}: {}", e.project.pretty_name(), err));
            }
        }
        batch_result(total, failures, "all projects reloaded")
    }

    /// Disable-only pipeline, then removal from the store.
    pub fn unload(&self, path: &Path) -> Result<(), DaemonError> {
        let id = project::path_to_id(path);
        let e = self.store.read(&id)?;

        self.store.write_status(&id, Status::Unloading)?;
        let conns = self.connections();
        let runners = select_runners(&self.server, &e.project, &conns);

        if let Err(step) = run_pipeline(&runners, Pipeline::DisableOnly) {
            self.store.write_status(&id, Status::Failed)?;
            return Err(annotate(step.into(), "unload", &e.project));
        }
        self.store.delete(&id)?;

        tracing::info!("project {} unloaded :(", e.project.pretty_name());
        Ok(())
    }

    pub fn unload_all(&self) -> Result<(), DaemonError> {
        let all = self.store.read_all();
        let total = all.len();
        let mut failures = Vec::new();

        for e in all {
            if let Err(err) = self.unload(&e.project.path) {
                failures.push(format!("{}: {}", e.project.pretty_name(), err));
            }
        }
        batch_result(total, failures, "all projects unloaded :(")
    }

    /// Merges a domain directive into the stored project (aliases are
    /// additive, the www policy replaces) and re-runs just the web runner.
    pub fn domain(&self, path: &Path, directive: DomainDirective) -> Result<(), DaemonError> {
        let id = project::path_to_id(path);
        let mut e = self.store.read(&id)?;

        match e.project.domain.entry(directive.fqdn.clone()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.add_aliases(directive.aliases.clone());
                existing.www = directive.www;
            }
            Entry::Vacant(entry) => {
                entry.insert(directive.clone());
            }
        }
        e.project.validate()?;

        self.store.write(&id, e.project.clone())?;
        self.store.write_status(&id, Status::Updating)?;

        // Iterating all runners would be wasted work, the only one
        // affected by domain changes is the web runner.
        let conns = self.connections();
        let mut runners: Vec<Box<dyn hoi_runner::Runner + '_>> = Vec::new();
        if self.server.web.enabled && !e.project.domain.is_empty() {
            runners.push(Box::new(hoi_runner::web::WebRunner::new(
                &self.server,
                &e.project,
            )));
        }

        match run_pipeline(&runners, Pipeline::Full) {
            Ok(()) => {
                self.store.write_status(&id, Status::Active)?;
            }
            Err(step) => {
                self.store.write_status(&id, Status::Failed)?;
                return Err(annotate(step.into(), "add/modify domain for", &e.project));
            }
        }

        tracing::info!(
            "added/modified domain {} for project {}",
            directive.fqdn,
            e.project.pretty_name()
        );
        Ok(())
    }

    /// Streams a tar archive to `target`: one `database/<db>.sql` entry per
    /// database, one tree per persistent volume.
    pub fn dump(&self, path: &Path, target: &Path) -> Result<(), DaemonError> {
        let id = project::path_to_id(path);
        let e = self.store.read(&id)?;

        let conns = self.connections();
        let dumpers = select_dumpers(&self.server, &e.project, &conns);

        let file = std::fs::File::create(target).map_err(|err| io_err(target, err))?;
        let mut tw = tar::Builder::new(file);
        tw.follow_symlinks(false);

        for d in &dumpers {
            d.dump(&mut tw)
                .map_err(|err| annotate(err.into(), "dump", &e.project))?;
        }
        tw.finish().map_err(|err| io_err(target, err))?;

        tracing::info!(
            "project {} dumped into {}",
            e.project.pretty_name(),
            target.display()
        );
        Ok(())
    }
}

fn annotate(err: DaemonError, what: &str, p: &project::Config) -> DaemonError {
    DaemonError::Protocol(format!(
        "failed to {} project {}: {}",
        what,
        p.pretty_name(),
        err
    ))
}

fn batch_result(
    total: usize,
    failures: Vec<String>,
    success_message: &str,
) -> Result<(), DaemonError> {
    if failures.is_empty() {
        tracing::info!("{}", success_message);
        return Ok(());
    }
    Err(DaemonError::Batch {
        failed: failures.len(),
        total,
        details: failures.join("; "),
    })
}
