//! Deployment strategy engine
//!
//! A run is a sequence of waves. Every wave is a group of hosts deployed
//! with mutual concurrency and closed by a barrier: all workers of a wave
//! are joined before the next wave starts, so no task outlives its wave.
//!
//! - Sequential: one wave per host, run on the caller thread.
//! - Parallel: a single wave on a pool of `max_parallel` workers that pull
//!   hosts in inventory order as slots free up.
//! - Rolling: the canary alone on the caller thread, then fixed-size
//!   batches with full intra-batch concurrency.

use crate::context::{ConfirmCallback, DeployObserver};
use crate::error::{Error, Result};
use crate::executor::DeployExecutor;
use crate::types::{DeployAction, DeployMode, DeploymentStatus, HostId, HostRecord, StatusCounts};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Default worker count in parallel mode
pub const DEFAULT_MAX_PARALLEL: usize = 5;

/// Default batch size in rolling mode
pub const DEFAULT_BATCH_SIZE: usize = 2;

/// Options controlling a run's rollout
#[derive(Debug, Clone)]
pub struct StrategyOptions {
    pub mode: DeployMode,
    pub action: DeployAction,
    pub max_parallel: usize,
    pub batch_size: usize,
    /// Pause between rolling batches
    pub batch_delay: Duration,
}

impl Default for StrategyOptions {
    fn default() -> Self {
        Self {
            mode: DeployMode::default(),
            action: DeployAction::default(),
            max_parallel: DEFAULT_MAX_PARALLEL,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: Duration::ZERO,
        }
    }
}

impl StrategyOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel == 0 {
            return Err(Error::Invalid {
                what: "max-parallel",
                message: "must be at least 1".into(),
            });
        }
        if self.batch_size == 0 {
            return Err(Error::Invalid {
                what: "batch-size",
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Role of a wave within the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveKind {
    /// One host of a sequential run
    Step,
    /// The whole host set behind a bounded pool
    Pool,
    /// Rolling canary
    Canary,
    /// Rolling batch, 1-indexed
    Batch(usize),
}

/// Group of hosts deployed together, closed by a barrier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wave {
    pub kind: WaveKind,
    pub label: String,
    pub hosts: Vec<HostId>,
    /// Maximum simultaneously deploying members
    pub concurrency: usize,
}

/// Lay out the waves of a run
pub fn plan(hosts: &[HostId], opts: &StrategyOptions) -> Vec<Wave> {
    if hosts.is_empty() {
        return Vec::new();
    }

    match opts.mode {
        DeployMode::Sequential => hosts
            .iter()
            .enumerate()
            .map(|(i, host)| Wave {
                kind: WaveKind::Step,
                label: format!("[{}/{}] {}", i + 1, hosts.len(), host),
                hosts: vec![host.clone()],
                concurrency: 1,
            })
            .collect(),
        DeployMode::Parallel => vec![Wave {
            kind: WaveKind::Pool,
            label: format!("all {} hosts", hosts.len()),
            hosts: hosts.to_vec(),
            concurrency: opts.max_parallel.max(1).min(hosts.len()),
        }],
        DeployMode::Rolling => {
            let mut waves = vec![Wave {
                kind: WaveKind::Canary,
                label: format!("canary {}", hosts[0]),
                hosts: vec![hosts[0].clone()],
                concurrency: 1,
            }];
            let rest = &hosts[1..];
            let batch_size = opts.batch_size.max(1);
            let batches = rest.len().div_ceil(batch_size);
            for (i, chunk) in rest.chunks(batch_size).enumerate() {
                waves.push(Wave {
                    kind: WaveKind::Batch(i + 1),
                    label: format!("batch {}/{}", i + 1, batches),
                    hosts: chunk.to_vec(),
                    concurrency: chunk.len(),
                });
            }
            waves
        }
    }
}

/// Final result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    AllSuccess,
    /// Some host failed or was never attempted
    WithFailures,
}

/// Run state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Done(RunResult),
}

/// Why a run stopped before attempting every host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Rolling canary failed; nothing else was attempted
    CanaryFailed(HostId),
    /// Continuation was declined after the named wave
    Declined(String),
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CanaryFailed(host) => write!(f, "canary {host} failed, rollout aborted"),
            Self::Declined(after) => write!(f, "stopped after {after}"),
        }
    }
}

/// Summary returned by [`StrategyEngine::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub result: RunResult,
    pub stopped: Option<StopReason>,
    pub counts: StatusCounts,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.result == RunResult::AllSuccess
    }
}

/// Drives the deploy executor according to a strategy
pub struct StrategyEngine<'a> {
    executor: &'a DeployExecutor<'a>,
    observer: &'a dyn DeployObserver,
    phase: RunPhase,
}

impl<'a> StrategyEngine<'a> {
    pub fn new(executor: &'a DeployExecutor<'a>, observer: &'a dyn DeployObserver) -> Self {
        Self {
            executor,
            observer,
            phase: RunPhase::Idle,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Execute a run over `records` (inventory order)
    pub fn run(
        &mut self,
        records: &[HostRecord],
        opts: &StrategyOptions,
        confirm: &mut dyn ConfirmCallback,
    ) -> Result<RunOutcome> {
        opts.validate()?;
        self.phase = RunPhase::Running;

        let ids: Vec<HostId> = records.iter().map(|r| r.id.clone()).collect();
        let by_id: HashMap<&HostId, &HostRecord> = records.iter().map(|r| (&r.id, r)).collect();
        let waves = plan(&ids, opts);

        log::info!(
            "Starting {} {} over {} hosts in {} wave(s)",
            opts.mode,
            opts.action,
            records.len(),
            waves.len()
        );

        let driven = match opts.mode {
            DeployMode::Sequential => self.run_sequential(&waves, &by_id, opts, confirm),
            DeployMode::Parallel => self.run_parallel(&waves, &by_id, opts.action),
            DeployMode::Rolling => self.run_rolling(&waves, &by_id, opts, confirm),
        };
        let stopped = match driven {
            Ok(stopped) => stopped,
            Err(e) => {
                self.phase = RunPhase::Done(RunResult::WithFailures);
                return Err(e);
            }
        };

        let counts = self.executor.registry().counts_by_status();
        let result = if counts.all_success() {
            RunResult::AllSuccess
        } else {
            RunResult::WithFailures
        };
        self.phase = RunPhase::Done(result);

        if let Some(reason) = &stopped {
            log::warn!("Run {reason}");
        }

        Ok(RunOutcome {
            result,
            stopped,
            counts,
        })
    }

    fn run_sequential(
        &self,
        waves: &[Wave],
        by_id: &HashMap<&HostId, &HostRecord>,
        opts: &StrategyOptions,
        confirm: &mut dyn ConfirmCallback,
    ) -> Result<Option<StopReason>> {
        for (i, wave) in waves.iter().enumerate() {
            let failed = self.run_wave(wave, by_id, opts.action)?;
            let remaining = waves.len() - i - 1;

            if failed > 0 && remaining > 0 {
                let prompt = format!(
                    "{} failed. Continue with the remaining {} host(s)?",
                    wave.hosts[0], remaining
                );
                if !ask(confirm, &prompt) {
                    return Ok(Some(StopReason::Declined(wave.hosts[0].to_string())));
                }
            }
        }
        Ok(None)
    }

    fn run_parallel(
        &self,
        waves: &[Wave],
        by_id: &HashMap<&HostId, &HostRecord>,
        action: DeployAction,
    ) -> Result<Option<StopReason>> {
        for wave in waves {
            self.run_wave(wave, by_id, action)?;
        }
        Ok(None)
    }

    fn run_rolling(
        &self,
        waves: &[Wave],
        by_id: &HashMap<&HostId, &HostRecord>,
        opts: &StrategyOptions,
        confirm: &mut dyn ConfirmCallback,
    ) -> Result<Option<StopReason>> {
        let Some((canary, batches)) = waves.split_first() else {
            return Ok(None);
        };

        if self.run_wave(canary, by_id, opts.action)? > 0 {
            return Ok(Some(StopReason::CanaryFailed(canary.hosts[0].clone())));
        }

        if batches.is_empty() {
            return Ok(None);
        }

        let remaining: usize = batches.iter().map(|w| w.hosts.len()).sum();
        let prompt = format!(
            "Canary {} succeeded. Roll out to the remaining {} host(s)?",
            canary.hosts[0], remaining
        );
        if !ask(confirm, &prompt) {
            return Ok(Some(StopReason::Declined(canary.label.clone())));
        }

        for (i, batch) in batches.iter().enumerate() {
            if i > 0 && !opts.batch_delay.is_zero() {
                log::info!("Waiting {:?} before {}", opts.batch_delay, batch.label);
                thread::sleep(opts.batch_delay);
            }

            let failed = self.run_wave(batch, by_id, opts.action)?;
            let more = i + 1 < batches.len();

            if failed > 0 && more {
                let prompt = format!(
                    "{} failed on {} host(s). Continue with the next batch?",
                    batch.label, failed
                );
                if !ask(confirm, &prompt) {
                    return Ok(Some(StopReason::Declined(batch.label.clone())));
                }
            }
        }
        Ok(None)
    }

    /// Deploy one wave and wait for all of its members
    ///
    /// Returns the number of members that failed.
    fn run_wave(
        &self,
        wave: &Wave,
        by_id: &HashMap<&HostId, &HostRecord>,
        action: DeployAction,
    ) -> Result<usize> {
        let members: Vec<&HostRecord> = wave
            .hosts
            .iter()
            .map(|h| {
                by_id
                    .get(h)
                    .copied()
                    .ok_or_else(|| Error::NotRegistered(h.clone()))
            })
            .collect::<Result<_>>()?;

        self.observer.on_wave_start(&wave.label, &wave.hosts);

        let statuses = if wave.concurrency <= 1 || members.len() <= 1 {
            let mut statuses = Vec::with_capacity(members.len());
            for record in &members {
                statuses.push(self.executor.deploy(record, action, self.observer)?);
            }
            statuses
        } else {
            self.run_pool(&members, wave.concurrency, action)?
        };

        self.observer.on_wave_complete(&wave.label);

        Ok(statuses
            .iter()
            .filter(|s| **s == DeploymentStatus::Failed)
            .count())
    }

    /// Bounded worker pool: `workers` threads pull the next host in order
    fn run_pool(
        &self,
        members: &[&HostRecord],
        workers: usize,
        action: DeployAction,
    ) -> Result<Vec<DeploymentStatus>> {
        let workers = workers.min(members.len()).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| Error::Invalid {
                what: "deploy thread pool",
                message: e.to_string(),
            })?;

        let cursor = AtomicUsize::new(0);
        let statuses: Mutex<Vec<DeploymentStatus>> = Mutex::new(Vec::with_capacity(members.len()));
        let fatal: Mutex<Option<Error>> = Mutex::new(None);

        let executor = self.executor;
        let observer = self.observer;

        pool.scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|_| {
                    loop {
                        let next = cursor.fetch_add(1, Ordering::SeqCst);
                        let Some(record) = members.get(next) else {
                            break;
                        };
                        match executor.deploy(record, action, observer) {
                            Ok(status) => push_locked(&statuses, status),
                            Err(e) => {
                                log::error!("{e}");
                                set_fatal(&fatal, e);
                            }
                        }
                    }
                });
            }
        });

        if let Some(e) = take_locked(fatal) {
            return Err(e);
        }
        Ok(take_locked(statuses))
    }
}

fn ask(confirm: &mut dyn ConfirmCallback, prompt: &str) -> bool {
    match confirm.confirm(prompt) {
        Ok(answer) => answer,
        Err(e) => {
            log::warn!("Confirmation failed ({e:#}), treating as declined");
            false
        }
    }
}

fn push_locked(statuses: &Mutex<Vec<DeploymentStatus>>, status: DeploymentStatus) {
    match statuses.lock() {
        Ok(mut locked) => locked.push(status),
        Err(poisoned) => poisoned.into_inner().push(status),
    }
}

fn set_fatal(slot: &Mutex<Option<Error>>, error: Error) {
    let mut guard = match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.get_or_insert(error);
}

fn take_locked<T>(mutex: Mutex<T>) -> T {
    match mutex.into_inner() {
        Ok(value) => value,
        Err(poisoned) => poisoned.into_inner(),
    }
}
