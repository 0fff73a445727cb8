//! Deploy executor - one host, one action, one terminal status
//!
//! Per-host failures stop here: they become a `Failed` status plus a report
//! note. The only errors returned are registry misuse (claiming a host twice
//! or a host outside the run), which the strategies never do.
//!
//! Panics from the build gate or the deploy backend are caught and end the
//! host as `Failed`.
//!
//! Verification cannot change a status: the terminal state is written
//! before the version marker is queried. The query is a bounded wait on the
//! worker thread, at most `verify_timeout`, so it still holds the host's
//! pool slot (and the wave barrier) for that long.

use crate::build::BuildCoordinator;
use crate::context::{DeployBackend, DeployObserver, RemoteChannel};
use crate::error::{Error, Result};
use crate::health::DEFAULT_PROBE_TIMEOUT;
use crate::logs::{LogPhase, RunLogs};
use crate::registry::{DeployLease, StatusRegistry};
use crate::types::{DeployAction, DeploymentStatus, HostRecord};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

/// Marker queried after a successful activation
const VERSION_MARKER: &[&str] = &["readlink", "/run/current-system"];

/// Executes the deploy action for single hosts of a run
pub struct DeployExecutor<'a> {
    backend: &'a dyn DeployBackend,
    channel: &'a dyn RemoteChannel,
    registry: &'a StatusRegistry,
    logs: &'a RunLogs,
    builder: Option<BuildCoordinator<'a>>,
    verify_timeout: Duration,
}

impl<'a> DeployExecutor<'a> {
    pub fn new(
        backend: &'a dyn DeployBackend,
        channel: &'a dyn RemoteChannel,
        registry: &'a StatusRegistry,
        logs: &'a RunLogs,
    ) -> Self {
        Self {
            backend,
            channel,
            registry,
            logs,
            builder: None,
            verify_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Build each host inside its own task before deploying it
    pub fn with_build_gate(mut self, builder: BuildCoordinator<'a>) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &StatusRegistry {
        self.registry
    }

    /// Deploy one host and return its terminal status
    pub fn deploy(
        &self,
        record: &HostRecord,
        action: DeployAction,
        observer: &dyn DeployObserver,
    ) -> Result<DeploymentStatus> {
        let lease = self.registry.claim(&record.id)?;
        observer.on_host_start(&record.id);

        let status = self.run(&lease, record, action);
        let status = self.registry.complete(lease, status)?;

        if status == DeploymentStatus::Success && action.activates() {
            self.verify(record);
        }

        observer.on_host_complete(&record.id, status);
        Ok(status)
    }

    fn run(&self, lease: &DeployLease, record: &HostRecord, action: DeployAction) -> DeploymentStatus {
        let host = lease.host();

        if let Some(builder) = &self.builder {
            let built = panic::catch_unwind(AssertUnwindSafe(|| builder.build(host)));
            let failure = match built {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some(format!("build failed, not deployed ({e})")),
                Err(_) => Some("build panicked, not deployed".to_string()),
            };
            if let Some(message) = failure {
                log::warn!("{host}: {message}");
                self.registry.note(host, message);
                return DeploymentStatus::Failed;
            }
        }

        let mut log = match self.logs.open(host, LogPhase::Deploy) {
            Ok(file) => file,
            Err(e) => {
                self.registry
                    .note(host, format!("could not open deploy log: {e}"));
                return DeploymentStatus::Failed;
            }
        };

        let _ = writeln!(
            log,
            "flotilla: {} {} via {}",
            action,
            host,
            record.target()
        );

        let applied = panic::catch_unwind(AssertUnwindSafe(|| {
            self.backend.apply(host, record.target(), action, &mut log)
        }));

        let failure = match applied {
            Ok(Ok(0)) => None,
            Ok(Ok(code)) => Some(format!("{action} exited with code {code}")),
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(_) => Some(format!("{action} panicked")),
        };

        match failure {
            None => {
                let _ = writeln!(log, "flotilla: {host} {action} succeeded");
                DeploymentStatus::Success
            }
            Some(message) => {
                let err = Error::DeployFailure {
                    host: host.clone(),
                    message: message.clone(),
                };
                log::warn!("{err}");
                let _ = writeln!(log, "flotilla: {err}");
                self.registry.note(host, message);
                DeploymentStatus::Failed
            }
        }
    }

    /// Query the active system for the report; never changes status
    fn verify(&self, record: &HostRecord) {
        match self
            .channel
            .execute(record.target(), VERSION_MARKER, self.verify_timeout)
        {
            Ok(output) if output.success() => {
                let marker = output.stdout_str();
                let marker = marker.trim();
                if !marker.is_empty() {
                    self.registry.note(&record.id, format!("active: {marker}"));
                }
            }
            Ok(output) => log::debug!(
                "Version marker on {} exited with {}",
                record.id,
                output.exit_code
            ),
            Err(e) => log::debug!("Version marker on {} unavailable: {e:#}", record.id),
        }
    }
}
