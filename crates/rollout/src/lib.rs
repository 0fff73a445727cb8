//! # Rollout
//!
//! Orchestration core for deploying a declarative system configuration to
//! a fleet of hosts.
//!
//! ## Core Concepts
//!
//! - **Inventory**: host ids from a configuration source, filtered by glob
//!   pattern or explicit list
//! - **Pre-flight**: bounded-time reachability and disk pressure probes
//! - **Strategy**: sequential, parallel (bounded pool) or rolling (canary
//!   then batches) ordering of deployments
//! - **Registry**: the single source of truth for per-host status
//! - **Report**: a Markdown/JSON projection of the registry
//!
//! ## Example
//!
//! ```ignore
//! use rollout::{
//!     AutoConfirm, DeployExecutor, DeploymentRun, NoObserver, StrategyEngine,
//!     StrategyOptions, render,
//! };
//!
//! let run = DeploymentRun::start(&runs_root, opts.mode, opts.action, records)?;
//! let executor = DeployExecutor::new(&deployer, &channel, &run.registry, &run.logs);
//! let mut engine = StrategyEngine::new(&executor, &NoObserver);
//! let outcome = engine.run(&run.hosts, &opts, &mut AutoConfirm)?;
//!
//! let report = render(&run);
//! report.write_to(run.logs.dir())?;
//! ```
//!
//! ## Provider Traits
//!
//! Nothing here runs a process or touches a terminal. The outside world is
//! injected:
//!
//! - [`HostSource`]: lists hosts of the configuration
//! - [`AddressBook`]: primary/secondary addresses per host
//! - [`RemoteChannel`]: runs commands on a host
//! - [`BuildBackend`], [`DeployBackend`], [`RollbackBackend`]: the actions
//! - [`ConfirmCallback`], [`DeployObserver`]: user interaction and progress

pub mod build;
pub mod classify;
pub mod context;
pub mod error;
pub mod executor;
pub mod health;
pub mod inventory;
pub mod logs;
pub mod registry;
pub mod report;
pub mod rollback;
pub mod run;
pub mod strategy;
pub mod types;

#[cfg(test)]
mod fakes;

// Re-export main types at crate root
pub use build::{BuildCoordinator, BuildOutcome};
pub use classify::classify;
pub use context::{
    AddressBook, AutoConfirm, AutoDecline, BuildBackend, ConfirmCallback, DeployBackend,
    DeployObserver, HostSource, NoObserver, RemoteChannel, RollbackBackend,
};
pub use error::{Error, Result};
pub use executor::DeployExecutor;
pub use health::{DEFAULT_PROBE_TIMEOUT, HealthProber, MIN_PROBE_TIMEOUT, Preflight, ProbeResult};
pub use inventory::{HostSelection, resolve};
pub use logs::{LogHandle, LogPhase, RunLogs};
pub use registry::{DeployLease, StatusRegistry, Transition};
pub use report::{HostReport, Report, render};
pub use rollback::{RollbackOutcome, rollback_failed, rollback_hosts};
pub use run::DeploymentRun;
pub use strategy::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_PARALLEL, RunOutcome, RunPhase, RunResult, StopReason,
    StrategyEngine, StrategyOptions, Wave, WaveKind, plan,
};
pub use types::{
    CommandOutput, DeployAction, DeployMode, DeploymentStatus, HostAddresses, HostCategory, HostId,
    HostRecord, StatusCounts,
};
