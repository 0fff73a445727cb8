//! Rollback of failed hosts to their previous generation
//!
//! Rollback never changes a host's deployment status. Its outcome is logged
//! and attached to the report as a note.

use crate::context::RollbackBackend;
use crate::error::{Error, Result};
use crate::logs::{LogHandle, LogPhase, RunLogs};
use crate::run::DeploymentRun;
use crate::types::{DeploymentStatus, HostId, HostRecord};
use std::io::Write;

/// Outcome of rolling back one host
#[derive(Debug)]
pub struct RollbackOutcome {
    pub host: HostId,
    pub result: Result<LogHandle>,
}

impl RollbackOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Roll back every host of the run that ended `Failed`
pub fn rollback_failed(run: &DeploymentRun, backend: &dyn RollbackBackend) -> Vec<RollbackOutcome> {
    let failed = run.registry.hosts_with(DeploymentStatus::Failed);
    if failed.is_empty() {
        return Vec::new();
    }
    log::info!("Rolling back {} failed host(s)", failed.len());

    failed
        .iter()
        .filter_map(|host| run.record(host))
        .map(|record| {
            let outcome = rollback_one(record, backend, &run.logs);
            match &outcome.result {
                Ok(_) => run.registry.note(&record.id, "rolled back to previous generation"),
                Err(e) => run.registry.note(&record.id, e.to_string()),
            }
            outcome
        })
        .collect()
}

/// Roll back an explicit host set, in order
pub fn rollback_hosts(
    hosts: &[HostRecord],
    backend: &dyn RollbackBackend,
    logs: &RunLogs,
) -> Vec<RollbackOutcome> {
    hosts
        .iter()
        .map(|record| rollback_one(record, backend, logs))
        .collect()
}

fn rollback_one(record: &HostRecord, backend: &dyn RollbackBackend, logs: &RunLogs) -> RollbackOutcome {
    let host = &record.id;
    let handle = logs.handle(host, LogPhase::Rollback);

    let result = logs
        .open(host, LogPhase::Rollback)
        .and_then(|mut log| {
            let _ = writeln!(log, "flotilla: rollback {host} via {}", record.target());
            let failure = match backend.rollback(host, record.target(), &mut log) {
                Ok(0) => None,
                Ok(code) => Some(format!("rollback exited with code {code}")),
                Err(e) => Some(format!("{e:#}")),
            };
            match failure {
                None => {
                    let _ = writeln!(log, "flotilla: {host} rolled back");
                    Ok(handle)
                }
                Some(message) => {
                    let err = Error::RollbackFailure {
                        host: host.clone(),
                        message,
                    };
                    let _ = writeln!(log, "flotilla: {err}");
                    Err(err)
                }
            }
        });

    if let Err(e) = &result {
        log::warn!("{e}");
    }

    RollbackOutcome {
        host: host.clone(),
        result,
    }
}
