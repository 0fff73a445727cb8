//! Status registry - the single source of truth for a run
//!
//! Every post-filter host has exactly one entry. Leaving `Pending` requires
//! [`StatusRegistry::claim`], which hands out a [`DeployLease`]. The lease is
//! not cloneable and is consumed by [`StatusRegistry::complete`], so each
//! host has exactly one writer and no terminal state can be left again.

use crate::error::{Error, Result};
use crate::types::{DeploymentStatus, HostId, StatusCounts};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Exclusive right to finish one host's deployment
#[derive(Debug)]
#[must_use = "a claimed host stays deploying until its lease is completed"]
pub struct DeployLease {
    host: HostId,
}

impl DeployLease {
    pub fn host(&self) -> &HostId {
        &self.host
    }
}

/// One recorded status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub host: HostId,
    pub status: DeploymentStatus,
}

#[derive(Debug, Default)]
struct State {
    statuses: HashMap<HostId, DeploymentStatus>,
    notes: HashMap<HostId, Vec<String>>,
    history: Vec<Transition>,
    deploying: usize,
    peak_deploying: usize,
}

/// Concurrency-safe map from host to deployment status
#[derive(Debug)]
pub struct StatusRegistry {
    order: Vec<HostId>,
    state: Mutex<State>,
}

impl StatusRegistry {
    /// Create a registry with every host `Pending`
    pub fn new(hosts: &[HostId]) -> Self {
        let mut order = Vec::with_capacity(hosts.len());
        let mut statuses = HashMap::with_capacity(hosts.len());
        for host in hosts {
            if statuses.insert(host.clone(), DeploymentStatus::Pending).is_none() {
                order.push(host.clone());
            }
        }

        Self {
            order,
            state: Mutex::new(State {
                statuses,
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Hosts in run order
    pub fn hosts(&self) -> &[HostId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Move a host from `Pending` to `Deploying`
    pub fn claim(&self, host: &HostId) -> Result<DeployLease> {
        let mut state = self.lock();
        let status = state
            .statuses
            .get_mut(host)
            .ok_or_else(|| Error::NotRegistered(host.clone()))?;

        if *status != DeploymentStatus::Pending {
            return Err(Error::AlreadyClaimed(host.clone()));
        }
        *status = DeploymentStatus::Deploying;

        state.deploying += 1;
        state.peak_deploying = state.peak_deploying.max(state.deploying);
        state.history.push(Transition {
            host: host.clone(),
            status: DeploymentStatus::Deploying,
        });

        Ok(DeployLease { host: host.clone() })
    }

    /// Record the terminal status of a claimed host
    pub fn complete(&self, lease: DeployLease, status: DeploymentStatus) -> Result<DeploymentStatus> {
        if !status.is_terminal() {
            return Err(Error::Invalid {
                what: "completion status",
                message: format!("{} is not terminal", status),
            });
        }

        let mut state = self.lock();
        let entry = state
            .statuses
            .get_mut(&lease.host)
            .ok_or_else(|| Error::NotRegistered(lease.host.clone()))?;
        *entry = status;

        state.deploying = state.deploying.saturating_sub(1);
        state.history.push(Transition {
            host: lease.host,
            status,
        });

        Ok(status)
    }

    /// Attach a report note to a host
    pub fn note(&self, host: &HostId, note: impl Into<String>) {
        let note = note.into();
        if note.trim().is_empty() {
            return;
        }
        self.lock()
            .notes
            .entry(host.clone())
            .or_default()
            .push(note);
    }

    /// Notes attached to a host, in order
    pub fn notes(&self, host: &HostId) -> Vec<String> {
        self.lock().notes.get(host).cloned().unwrap_or_default()
    }

    pub fn status(&self, host: &HostId) -> Option<DeploymentStatus> {
        self.lock().statuses.get(host).copied()
    }

    /// Statuses of every host, in run order
    pub fn snapshot(&self) -> Vec<(HostId, DeploymentStatus)> {
        let state = self.lock();
        self.order
            .iter()
            .map(|h| {
                let status = state
                    .statuses
                    .get(h)
                    .copied()
                    .unwrap_or(DeploymentStatus::Pending);
                (h.clone(), status)
            })
            .collect()
    }

    pub fn counts_by_status(&self) -> StatusCounts {
        let state = self.lock();
        let mut counts = StatusCounts::default();
        for status in state.statuses.values() {
            counts.add(*status);
        }
        counts
    }

    /// Hosts currently in a given status, in run order
    pub fn hosts_with(&self, status: DeploymentStatus) -> Vec<HostId> {
        self.snapshot()
            .into_iter()
            .filter(|(_, s)| *s == status)
            .map(|(h, _)| h)
            .collect()
    }

    /// Highest number of simultaneously deploying hosts seen so far
    pub fn peak_deploying(&self) -> usize {
        self.lock().peak_deploying
    }

    /// Every status change, in the order it happened
    pub fn history(&self) -> Vec<Transition> {
        self.lock().history.clone()
    }
}
