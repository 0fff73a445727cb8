//! `flotilla deploy`

use anyhow::{Context as _, Result};
use rollout::{
    BuildCoordinator, DeployExecutor, DeployMode, DeployObserver, DeploymentRun,
    DeploymentStatus, HealthProber, HostId, HostRecord, Preflight, Report, StrategyEngine,
    StrategyOptions, plan, render, rollback_failed,
};
use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::Context;
use crate::backend::{self, ConfigAddressBook, FlakeBuilder, Rebuilder, SshRemote};
use crate::cli::DeployArgs;
use crate::schema::{DeployConfig, FlotillaConfig};
use crate::{paths, progress, ui};

pub fn run(ctx: &Context, args: DeployArgs) -> Result<ExitCode> {
    let config = super::load_config()?;
    let opts = strategy_options(&config.deploy, &args);
    opts.validate().context("Invalid deploy options")?;

    let source = backend::inventory(&config)?;
    let hosts = super::select(source.as_ref(), &args.select)?;

    let book = ConfigAddressBook::new(&config);
    let channel = SshRemote::new(&config, &book);

    let preflight = if args.skip_preflight {
        log::info!("Skipping pre-flight for {} host(s)", hosts.len());
        Preflight {
            reachable: super::unprobed(&hosts, &book),
            unreachable: Vec::new(),
        }
    } else {
        probe(ctx, &config, &channel, &book, &hosts)?
    };
    show_preflight(ctx, &preflight, config.deploy.disk_warn_percent);

    if !ctx.quiet {
        show_plan(&preflight.reachable, &opts);
    }
    if args.dry_run {
        ui::info("Dry run, nothing was deployed.");
        return Ok(ExitCode::SUCCESS);
    }

    let rebuilder = Rebuilder::new(&config, &book)?;
    let builder = if args.build_first {
        Some(FlakeBuilder::new(&config)?)
    } else {
        None
    };

    let run = DeploymentRun::start(
        &paths::runs_dir()?,
        opts.mode,
        opts.action,
        preflight.reachable,
    )
    .context("Could not start run")?
    .with_excluded(preflight.unreachable);

    let mut executor = DeployExecutor::new(&rebuilder, &channel, &run.registry, &run.logs)
        .with_verify_timeout(config.ssh.probe_timeout());
    if let Some(builder) = &builder {
        executor = executor.with_build_gate(BuildCoordinator::new(builder, &run.logs));
    }

    let observer = TerminalObserver::new(ctx.quiet, &run.host_ids());
    let mut confirm = super::confirmer(args.yes);
    let mut engine = StrategyEngine::new(&executor, &observer);
    let outcome = match engine.run(&run.hosts, &opts, confirm.as_mut()) {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Err(write_err) = render(&run).write_to(run.logs.dir()) {
                log::warn!("Could not write report: {write_err}");
            }
            return Err(e).with_context(|| format!("Run {} aborted", run.id));
        }
    };

    if let Some(reason) = &outcome.stopped {
        ui::warn(&format!("Run {reason}"));
    }

    if args.rollback_on_failure {
        let outcomes = rollback_failed(&run, &rebuilder);
        for outcome in &outcomes {
            match &outcome.result {
                Ok(_) => ui::success(&format!("Rolled back {}", outcome.host)),
                Err(e) => ui::error(&e.to_string()),
            }
        }
    }

    let report = render(&run);
    let (markdown, _) = report
        .write_to(run.logs.dir())
        .with_context(|| format!("Could not write report to {}", run.logs.dir().display()))?;

    show_report(ctx, &report);
    ui::kv("Report", &markdown.display().to_string());

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// CLI flags over `[deploy]` defaults
pub fn strategy_options(config: &DeployConfig, args: &DeployArgs) -> StrategyOptions {
    let mut opts = config.strategy();
    if let Some(mode) = args.mode {
        opts.mode = mode;
    }
    if let Some(action) = args.action {
        opts.action = action;
    }
    if let Some(n) = args.max_parallel {
        opts.max_parallel = n;
    }
    if let Some(n) = args.batch_size {
        opts.batch_size = n;
    }
    if let Some(secs) = args.batch_delay {
        opts.batch_delay = Duration::from_secs(secs);
    }
    opts
}

pub(crate) fn probe(
    ctx: &Context,
    config: &FlotillaConfig,
    channel: &SshRemote,
    book: &ConfigAddressBook,
    hosts: &[HostId],
) -> Result<Preflight> {
    let prober = HealthProber::new(channel, book).with_timeout(config.ssh.probe_timeout());
    let spinner = progress::spinner(&format!("Probing {} host(s)...", hosts.len()), ctx.quiet);
    let preflight = prober.preflight(hosts, config.deploy.probe_jobs);
    spinner.finish_and_clear();
    preflight
}

fn show_preflight(ctx: &Context, preflight: &Preflight, disk_warn_percent: u8) {
    for record in &preflight.unreachable {
        ui::warn(&format!("{} is unreachable, excluded from the run", record.id));
    }
    for record in preflight.disk_warnings(disk_warn_percent) {
        ui::warn(&format!(
            "{} root filesystem is {}% full",
            record.id,
            record.disk_pressure.unwrap_or_default()
        ));
    }
    if !ctx.quiet && !preflight.reachable.is_empty() {
        ui::success(&format!("{} host(s) ready", preflight.reachable.len()));
    }
}

fn show_plan(records: &[HostRecord], opts: &StrategyOptions) {
    ui::header(&format!("Deploy plan ({} {})", opts.mode, opts.action));
    if opts.mode == DeployMode::Parallel {
        ui::kv("Workers", &opts.max_parallel.min(records.len()).to_string());
    }
    let ids: Vec<HostId> = records.iter().map(|r| r.id.clone()).collect();
    let waves = plan(&ids, opts);
    for (i, wave) in waves.iter().enumerate() {
        let names: Vec<&str> = wave.hosts.iter().map(HostId::as_str).collect();
        ui::step(i + 1, waves.len(), &format!("{}: {}", wave.label, names.join(", ")));
    }
    if waves.is_empty() {
        ui::dim("no hosts to deploy");
    }
}

fn show_report(ctx: &Context, report: &Report) {
    if !ctx.quiet {
        ui::header(&format!("Run {}", report.run_id));
        let width = ui::name_width(report.hosts.iter().map(|h| h.host.as_str()));
        for host in &report.hosts {
            let detail = host
                .note
                .clone()
                .or_else(|| host.log.as_ref().map(|p| p.display().to_string()))
                .unwrap_or_default();
            ui::host_line(host.status, host.host.as_str(), width, &ui::truncate(&detail, 80));
        }
        for host in &report.excluded {
            ui::dim(&format!("{} excluded: {}", host.host, host.reason));
        }
        println!();
    }

    let summary = format!(
        "{}/{} succeeded, {} failed, {} pending",
        report.success, report.total, report.failed, report.pending
    );
    if report.is_success() {
        ui::success(&summary);
    } else {
        ui::error(&summary);
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Prints wave and host progress as it happens
struct TerminalObserver {
    quiet: bool,
    width: usize,
    started: Mutex<HashMap<HostId, Instant>>,
}

impl TerminalObserver {
    fn new(quiet: bool, hosts: &[HostId]) -> Self {
        Self {
            quiet,
            width: ui::name_width(hosts.iter().map(HostId::as_str)),
            started: Mutex::new(HashMap::new()),
        }
    }

    fn elapsed(&self, host: &HostId) -> Option<Duration> {
        let started = match self.started.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        started.get(host).map(Instant::elapsed)
    }
}

impl DeployObserver for TerminalObserver {
    fn on_wave_start(&self, label: &str, hosts: &[HostId]) {
        if !self.quiet {
            ui::section(&format!("{label} ({} host(s))", hosts.len()));
        }
    }

    fn on_host_start(&self, host: &HostId) {
        match self.started.lock() {
            Ok(mut guard) => guard.insert(host.clone(), Instant::now()),
            Err(poisoned) => poisoned.into_inner().insert(host.clone(), Instant::now()),
        };
        if !self.quiet {
            ui::host_line(DeploymentStatus::Deploying, host.as_str(), self.width, "deploying");
        }
    }

    fn on_host_complete(&self, host: &HostId, status: DeploymentStatus) {
        if self.quiet {
            return;
        }
        let detail = match self.elapsed(host) {
            Some(elapsed) => format!("{status} in {:.1}s", elapsed.as_secs_f64()),
            None => status.to_string(),
        };
        ui::host_line(status, host.as_str(), self.width, &detail);
    }

    fn on_wave_complete(&self, label: &str) {
        log::debug!("{label} complete");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;
    use rollout::{DeployAction, HostCategory, HostReport};

    fn deploy_args(args: &[&str]) -> DeployArgs {
        let cli = Cli::try_parse_from(std::iter::once("flotilla").chain(args.iter().copied()))
            .unwrap();
        match cli.command {
            Command::Deploy(args) => args,
            _ => panic!("expected deploy"),
        }
    }

    fn report(statuses: &[DeploymentStatus]) -> Report {
        let count = |s| statuses.iter().filter(|x| **x == s).count();
        Report {
            run_id: "run".into(),
            timestamp: String::new(),
            mode: DeployMode::Parallel,
            action: DeployAction::Switch,
            total: statuses.len(),
            success: count(DeploymentStatus::Success),
            failed: count(DeploymentStatus::Failed),
            pending: count(DeploymentStatus::Pending) + count(DeploymentStatus::Deploying),
            hosts: statuses
                .iter()
                .enumerate()
                .map(|(i, status)| HostReport {
                    host: HostId::new(format!("h{i}")),
                    category: HostCategory::Other,
                    status: *status,
                    log: None,
                    note: None,
                })
                .collect(),
            excluded: Vec::new(),
        }
    }

    #[test]
    fn test_config_defaults_apply_without_flags() {
        let config = DeployConfig {
            mode: DeployMode::Rolling,
            batch_size: 4,
            batch_delay_secs: 15,
            ..DeployConfig::default()
        };
        let opts = strategy_options(&config, &deploy_args(&["deploy"]));
        assert_eq!(opts.mode, DeployMode::Rolling);
        assert_eq!(opts.batch_size, 4);
        assert_eq!(opts.batch_delay, Duration::from_secs(15));
        assert_eq!(opts.max_parallel, 5);
    }

    #[test]
    fn test_flags_override_config() {
        let opts = strategy_options(
            &DeployConfig::default(),
            &deploy_args(&["deploy", "--mode", "sequential", "--action", "boot", "-j", "2"]),
        );
        assert_eq!(opts.mode, DeployMode::Sequential);
        assert_eq!(opts.action, DeployAction::Boot);
        assert_eq!(opts.max_parallel, 2);
    }

    #[test]
    fn test_zero_batch_size_flag_is_rejected() {
        let opts = strategy_options(
            &DeployConfig::default(),
            &deploy_args(&["deploy", "--batch-size", "0"]),
        );
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_exit_status() {
        use DeploymentStatus::*;
        assert!(report(&[Success, Success, Success]).is_success());
        assert!(!report(&[Failed, Pending]).is_success());
        assert!(!report(&[Success, Pending]).is_success());
        assert!(!report(&[]).is_success());
    }
}
