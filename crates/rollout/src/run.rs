//! A single deployment run across a host set

use crate::error::Result;
use crate::logs::RunLogs;
use crate::registry::StatusRegistry;
use crate::types::{DeployAction, DeployMode, HostId, HostRecord};
use chrono::{DateTime, Utc};
use std::path::Path;

/// One invocation of the orchestrator
///
/// Everything except the registry is fixed once the run starts.
#[derive(Debug)]
pub struct DeploymentRun {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub mode: DeployMode,
    pub action: DeployAction,
    /// Hosts taking part, in inventory order
    pub hosts: Vec<HostRecord>,
    /// Hosts dropped by pre-flight, kept for the report
    pub excluded: Vec<HostRecord>,
    pub registry: StatusRegistry,
    pub logs: RunLogs,
}

impl DeploymentRun {
    /// Start a run, creating its log directory under `runs_root`
    pub fn start(
        runs_root: &Path,
        mode: DeployMode,
        action: DeployAction,
        hosts: Vec<HostRecord>,
    ) -> Result<Self> {
        let started_at = Utc::now();
        let (id, logs) = RunLogs::create_unique(runs_root, started_at)?;

        let ids: Vec<HostId> = hosts.iter().map(|r| r.id.clone()).collect();
        let registry = StatusRegistry::new(&ids);

        log::info!("Run {id}: {mode} {action} over {} host(s)", hosts.len());

        Ok(Self {
            id,
            started_at,
            mode,
            action,
            hosts,
            excluded: Vec::new(),
            registry,
            logs,
        })
    }

    /// Record hosts that were excluded before the run started
    pub fn with_excluded(mut self, excluded: Vec<HostRecord>) -> Self {
        self.excluded = excluded;
        self
    }

    pub fn host_ids(&self) -> Vec<HostId> {
        self.hosts.iter().map(|r| r.id.clone()).collect()
    }

    pub fn record(&self, host: &HostId) -> Option<&HostRecord> {
        self.hosts.iter().find(|r| &r.id == host)
    }
}

/// Timestamp-based run id
pub fn run_id(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d-%H%M%S").to_string()
}
