//! `flotilla rollback`

use anyhow::{Context as _, Result};
use rollout::{DeploymentStatus, HostId, RunLogs, rollback_hosts};
use std::process::ExitCode;

use crate::Context;
use crate::backend::{self, ConfigAddressBook, Rebuilder};
use crate::cli::SelectArgs;
use crate::{paths, ui};

pub fn run(ctx: &Context, hosts: Vec<String>, yes: bool) -> Result<ExitCode> {
    let config = super::load_config()?;
    let source = backend::inventory(&config)?;
    let hosts = super::select(
        source.as_ref(),
        &SelectArgs {
            hosts,
            filter: None,
        },
    )?;

    let book = ConfigAddressBook::new(&config);
    let records = super::unprobed(&hosts, &book);

    let names: Vec<&str> = hosts.iter().map(HostId::as_str).collect();
    let prompt = format!(
        "Roll back {} to the previous generation?",
        names.join(", ")
    );
    let confirmed = super::confirmer(yes).confirm(&prompt).unwrap_or_else(|e| {
        log::warn!("Confirmation failed ({e:#}), treating as declined");
        false
    });
    if !confirmed {
        ui::info("Rollback cancelled.");
        return Ok(ExitCode::FAILURE);
    }

    let rebuilder = Rebuilder::new(&config, &book)?;
    let logs = RunLogs::create_now(&paths::runs_dir()?).context("Could not create log directory")?;
    let outcomes = rollback_hosts(&records, &rebuilder, &logs);

    let width = ui::name_width(names.iter().copied());
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

    if failed == 0 {
        ui::success(&format!("Rolled back {} host(s)", outcomes.len()));
        Ok(ExitCode::SUCCESS)
    } else {
        ui::error(&format!("{} rollback(s) failed, logs in {}", failed, logs.dir().display()));
        Ok(ExitCode::FAILURE)
    }
}
