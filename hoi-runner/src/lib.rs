//! Runners manage configuration files and services to fulfill the needs of
//! a project. They usually command a builder and utilise a subsystem
//! adapter, into which built artifacts are installed.
//!
//! Runners are "dumb" in that they do not track which configuration depends
//! on what and needs rebuilding; every reconciliation is a full rebuild.
//! Each runner exposes the uniform step contract:
//!
//! - `disable`: enumerate installed artifacts, stop and deactivate them,
//!   remove the installed copies, clean the build subtree. Disabling an
//!   already-disabled project succeeds.
//! - `enable`: render templates via the builder, install the resulting
//!   artifacts into the subsystem, activate them.
//! - `commit`: flush the underlying subsystem's pending reload, if any.
//!
//! The pipeline for a project is the per-runner concatenation of these
//! steps in fixed runner order; see [`run_pipeline`].

pub mod app_service;
pub mod cron;
pub mod db;
pub mod error;
pub mod htpasswd;
pub mod php;
pub mod volume;
pub mod web;
pub mod worker;

use hoi_core::{project, server};
use hoi_system::Systemctl;

pub use error::{RunnerError, StepError, StepKind};

/// Methods common to each runner; invoked sequentially as steps.
pub trait Runner {
    /// Human name of the runner, used in failure reports.
    fn name(&self) -> &'static str;
    fn disable(&self) -> Result<(), RunnerError>;
    fn enable(&self) -> Result<(), RunnerError>;
    fn commit(&self) -> Result<(), RunnerError>;
}

/// Runners that can contribute to a project dump archive.
pub trait Dumper {
    fn dump(&self, tw: &mut tar::Builder<std::fs::File>) -> Result<(), RunnerError>;
}

/// Shared, lazily established connection handles borrowed by the runners
/// for the duration of a pipeline.
pub struct Connections<'a> {
    pub mysql: Option<&'a mysql::Pool>,
    pub systemd: &'a Systemctl,
}

/// The shape of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    /// Disable, enable, commit: the full rebuild.
    Full,
    /// Disable and commit only; used when unloading.
    DisableOnly,
}

/// Composes the list of runners applicable to a project, in fixed,
/// dependency-driven order: volumes first because other runners may read
/// them, database before php so migrations find their schema, web after php
/// so FPM sockets exist, cron and worker last as they depend on all of the
/// above being live.
///
/// A runner is included only when the server enables its subsystem and, for
/// the directive-driven families, the project carries at least one matching
/// directive.
pub fn select_runners<'a>(
    s: &'a server::Config,
    p: &'a project::Config,
    conns: &'a Connections<'a>,
) -> Vec<Box<dyn Runner + 'a>> {
    let mut runners: Vec<Box<dyn Runner + 'a>> = Vec::new();

    if s.volume.enabled && !p.volume.is_empty() {
        runners.push(Box::new(volume::VolumeRunner::new(s, p, conns.systemd)));
    }
    if s.database.enabled {
        if let Some(pool) = conns.mysql {
            runners.push(Box::new(db::DbRunner::new(s, p, pool)));
        }
    }
    if s.php.enabled {
        runners.push(Box::new(php::PhpRunner::new(s, p)));
    }
    if s.app_service.enabled {
        runners.push(Box::new(app_service::AppServiceRunner::new(
            s,
            p,
            conns.systemd,
        )));
    }
    if s.web.enabled && !p.domain.is_empty() {
        runners.push(Box::new(web::WebRunner::new(s, p)));
    }
    if s.cron.enabled && !p.cron.is_empty() {
        runners.push(Box::new(cron::CronRunner::new(s, p, conns.systemd)));
    }
    if s.worker.enabled && !p.worker.is_empty() {
        runners.push(Box::new(worker::WorkerRunner::new(s, p, conns.systemd)));
    }
    runners
}

/// Composes the dumpers contributing to a project dump archive.
pub fn select_dumpers<'a>(
    s: &'a server::Config,
    p: &'a project::Config,
    conns: &'a Connections<'a>,
) -> Vec<Box<dyn Dumper + 'a>> {
    let mut dumpers: Vec<Box<dyn Dumper + 'a>> = Vec::new();

    if s.database.enabled {
        if let Some(pool) = conns.mysql {
            dumpers.push(Box::new(db::DbRunner::new(s, p, pool)));
        }
    }
    if s.volume.enabled && !p.volume.is_empty() {
        dumpers.push(Box::new(volume::VolumeRunner::new(s, p, conns.systemd)));
    }
    dumpers
}

/// Executes the steps of all runners strictly sequentially, aborting at the
/// first failure, which is returned wrapped with the names of the failing
/// step and runner.
///
/// No parallelism: the subsystem dirty flags are process-wide, and commit
/// batching relies on ordered execution.
pub fn run_pipeline(runners: &[Box<dyn Runner + '_>], pipeline: Pipeline) -> Result<(), StepError> {
    let steps: &[StepKind] = match pipeline {
        Pipeline::Full => &[StepKind::Disable, StepKind::Enable, StepKind::Commit],
        Pipeline::DisableOnly => &[StepKind::Disable, StepKind::Commit],
    };

    for runner in runners {
        for &step in steps {
            let result = match step {
                StepKind::Disable => runner.disable(),
                StepKind::Enable => runner.enable(),
                StepKind::Commit => runner.commit(),
            };
            if let Err(source) = result {
                return Err(StepError {
                    step,
                    runner: runner.name(),
                    source,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recording<'a> {
        log: &'a RefCell<Vec<String>>,
        name: &'static str,
        fail_on: Option<StepKind>,
    }

    impl Runner for Recording<'_> {
        fn name(&self) -> &'static str {
            self.name
        }
        fn disable(&self) -> Result<(), RunnerError> {
            self.record(StepKind::Disable)
        }
        fn enable(&self) -> Result<(), RunnerError> {
            self.record(StepKind::Enable)
        }
        fn commit(&self) -> Result<(), RunnerError> {
            self.record(StepKind::Commit)
        }
    }

    impl Recording<'_> {
        fn record(&self, step: StepKind) -> Result<(), RunnerError> {
            self.log.borrow_mut().push(format!("{}:{}", self.name, step));
            if self.fail_on == Some(step) {
                return Err(RunnerError::UnknownArtifact("boom".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn full_pipeline_runs_steps_per_runner_in_order() {
        let log = RefCell::new(Vec::new());
        let runners: Vec<Box<dyn Runner + '_>> = vec![
            Box::new(Recording {
                log: &log,
                name: "volume",
                fail_on: None,
            }),
            Box::new(Recording {
                log: &log,
                name: "web",
                fail_on: None,
            }),
        ];

        run_pipeline(&runners, Pipeline::Full).expect("pipeline");
        assert_eq!(
            *log.borrow(),
            vec![
                "volume:disable",
                "volume:enable",
                "volume:commit",
                "web:disable",
                "web:enable",
                "web:commit",
            ]
        );
    }

    #[test]
    fn first_failing_step_aborts_and_is_named() {
        let log = RefCell::new(Vec::new());
        let runners: Vec<Box<dyn Runner + '_>> = vec![
            Box::new(Recording {
                log: &log,
                name: "db",
                fail_on: Some(StepKind::Enable),
            }),
            Box::new(Recording {
                log: &log,
                name: "web",
                fail_on: None,
            }),
        ];

        let err = run_pipeline(&runners, Pipeline::Full).expect_err("must fail");
        assert_eq!(err.step, StepKind::Enable);
        assert_eq!(err.runner, "db");
        assert_eq!(*log.borrow(), vec!["db:disable", "db:enable"]);
        assert!(err.to_string().contains("*enable*"));
    }

    #[test]
    fn disable_only_pipeline_skips_enable() {
        let log = RefCell::new(Vec::new());
        let runners: Vec<Box<dyn Runner + '_>> = vec![Box::new(Recording {
            log: &log,
            name: "web",
            fail_on: None,
        })];

        run_pipeline(&runners, Pipeline::DisableOnly).expect("pipeline");
        assert_eq!(*log.borrow(), vec!["web:disable", "web:commit"]);
    }
}
