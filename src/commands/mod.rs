//! Command implementations

pub mod build;
pub mod check;
pub mod config;
pub mod deploy;
pub mod list;
pub mod rollback;

use anyhow::{Context as _, Result, bail};
use dialoguer::Confirm;
use rollout::{
    AddressBook, AutoConfirm, AutoDecline, ConfirmCallback, HostId, HostRecord, HostSelection,
    HostSource, resolve,
};

use crate::backend::ConfigAddressBook;
use crate::cli::SelectArgs;
use crate::schema::FlotillaConfig;

/// Resolve the hosts a command targets, failing when nothing matches
pub fn select(source: &dyn HostSource, args: &SelectArgs) -> Result<Vec<HostId>> {
    let selection = HostSelection::from_args(args.hosts.clone(), args.filter.clone());
    let hosts = resolve(source, &selection).context("Could not resolve hosts")?;
    if hosts.is_empty() {
        match &args.filter {
            Some(pattern) => bail!("No hosts match '{}'", pattern),
            None => bail!("The inventory lists no hosts"),
        }
    }
    Ok(hosts)
}

/// Records for hosts that are not probed
pub fn unprobed(hosts: &[HostId], book: &ConfigAddressBook) -> Vec<HostRecord> {
    hosts
        .iter()
        .map(|host| {
            HostRecord::unprobed(
                host.clone(),
                book.category(host),
                book.addresses(host).primary,
            )
        })
        .collect()
}

pub fn load_config() -> Result<FlotillaConfig> {
    FlotillaConfig::load().context("Could not load configuration")
}

// ============================================================================
// Confirmation
// ============================================================================

/// Asks on the terminal
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        Ok(Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?)
    }
}

/// Prompt interactively, auto-confirm with `--yes`, decline when unattended
pub fn confirmer(yes: bool) -> Box<dyn ConfirmCallback> {
    if yes {
        Box::new(AutoConfirm)
    } else if console::user_attended() {
        Box::new(PromptConfirm)
    } else {
        log::info!("No terminal attached, prompts will be declined (use --yes)");
        Box::new(AutoDecline)
    }
}
