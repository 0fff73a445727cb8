//! `flotilla build`

use anyhow::{Context as _, Result};
use rollout::{BuildCoordinator, BuildOutcome, DeploymentStatus, RunLogs};
use std::process::ExitCode;

use crate::Context;
use crate::backend::{self, FlakeBuilder};
use crate::cli::BuildArgs;
use crate::{paths, progress, ui};

pub fn run(ctx: &Context, args: BuildArgs) -> Result<ExitCode> {
    let config = super::load_config()?;
    let jobs = args.jobs.unwrap_or(config.deploy.probe_jobs).max(1);

    let source = backend::inventory(&config)?;
    let hosts = super::select(source.as_ref(), &args.select)?;
    let builder = FlakeBuilder::new(&config)?;

    let logs = RunLogs::create_now(&paths::runs_dir()?).context("Could not create log directory")?;
    let coordinator = BuildCoordinator::new(&builder, &logs);

    let pb = progress::bar(hosts.len(), "building", ctx.quiet);
    let on_done = |outcome: &BuildOutcome| {
        pb.set_message(outcome.host.to_string());
        pb.inc(1);
    };
    let outcomes = coordinator.build_all(&hosts, jobs, &on_done)?;
    pb.finish_and_clear();

    let width = ui::name_width(outcomes.iter().map(|o| o.host.as_str()));
    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(handle) => {
                if !ctx.quiet {
                    ui::host_line(
                        DeploymentStatus::Success,
                        outcome.host.as_str(),
                        width,
                        &handle.path.display().to_string(),
                    );
                }
            }
            Err(e) => {
                failed += 1;
                ui::host_line(
                    DeploymentStatus::Failed,
                    outcome.host.as_str(),
                    width,
                    &e.to_string(),
                );
            }
        }
    }

    ui::kv("Logs", &logs.dir().display().to_string());
    if failed == 0 {
        ui::success(&format!("Built {} host(s)", outcomes.len()));
        Ok(ExitCode::SUCCESS)
    } else {
        ui::error(&format!("{} of {} build(s) failed", failed, outcomes.len()));
        Ok(ExitCode::FAILURE)
    }
}
