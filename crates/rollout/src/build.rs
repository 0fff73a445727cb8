//! Build coordination, independent of deployment
//!
//! Builds never retry. A failed build is reported; in gating mode the
//! executor uses [`BuildCoordinator::build`] to keep that one host from
//! being deployed.

use crate::context::BuildBackend;
use crate::error::{Error, Result};
use crate::logs::{LogHandle, LogPhase, RunLogs};
use crate::types::HostId;
use rayon::prelude::*;
use std::io::Write;

/// Outcome of building one host
#[derive(Debug)]
pub struct BuildOutcome {
    pub host: HostId,
    pub result: Result<LogHandle>,
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs the build backend and routes output into run logs
pub struct BuildCoordinator<'a> {
    backend: &'a dyn BuildBackend,
    logs: &'a RunLogs,
}

impl<'a> BuildCoordinator<'a> {
    pub fn new(backend: &'a dyn BuildBackend, logs: &'a RunLogs) -> Self {
        Self { backend, logs }
    }

    /// Build one host's configuration
    pub fn build(&self, host: &HostId) -> Result<LogHandle> {
        let handle = self.logs.handle(host, LogPhase::Build);
        let mut log = self.logs.open(host, LogPhase::Build)?;

        log::info!("Building {host}");
        let built = self.backend.build(host, &mut log);
        let _ = log.flush();

        match built {
            Ok(true) => Ok(handle),
            Ok(false) => Err(Error::BuildFailure {
                host: host.clone(),
                message: format!("see {}", handle.path.display()),
            }),
            Err(e) => {
                let _ = writeln!(log, "flotilla: build backend error: {e:#}");
                Err(Error::BuildFailure {
                    host: host.clone(),
                    message: format!("{e:#}"),
                })
            }
        }
    }

    /// Build hosts concurrently, `jobs` at a time
    ///
    /// Outcomes come back in input order. `on_done` is called from worker
    /// threads as each build finishes.
    pub fn build_all(
        &self,
        hosts: &[HostId],
        jobs: usize,
        on_done: &(dyn Fn(&BuildOutcome) + Sync),
    ) -> Result<Vec<BuildOutcome>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .build()
            .map_err(|e| Error::Invalid {
                what: "build thread pool",
                message: e.to_string(),
            })?;

        Ok(pool.install(|| {
            hosts
                .par_iter()
                .map(|host| {
                    let outcome = BuildOutcome {
                        host: host.clone(),
                        result: self.build(host),
                    };
                    on_done(&outcome);
                    outcome
                })
                .collect()
        }))
    }
}
