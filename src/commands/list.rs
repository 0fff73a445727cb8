//! `flotilla list`

use anyhow::Result;
use colored::Colorize;
use rollout::{AddressBook, HostCategory, HostId};
use std::collections::BTreeMap;
use std::process::ExitCode;

use crate::Context;
use crate::backend::{self, ConfigAddressBook};
use crate::cli::SelectArgs;
use crate::ui;

pub fn run(ctx: &Context, filter: Option<String>) -> Result<ExitCode> {
    let config = super::load_config()?;
    let source = backend::inventory(&config)?;
    let hosts = super::select(
        source.as_ref(),
        &SelectArgs {
            hosts: Vec::new(),
            filter,
        },
    )?;
    let book = ConfigAddressBook::new(&config);

    if ctx.quiet {
        for host in &hosts {
            println!("{host}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    for (category, members) in by_category(&hosts, &book) {
        ui::section(&format!("{} ({})", category, members.len()));
        let width = ui::name_width(members.iter().map(HostId::as_str));
        for host in members {
            let addrs = book.addresses(&host);
            let mut detail = addrs.primary.clone();
            if let Some(secondary) = &addrs.secondary {
                detail.push_str(&format!(", {secondary}"));
            }
            if addrs.local {
                detail.push_str(" (local)");
            }
            println!("  {:<width$}  {}", host.as_str(), detail.dimmed(), width = width);
        }
    }
    println!();
    ui::info(&format!("{} host(s)", hosts.len()));
    Ok(ExitCode::SUCCESS)
}

/// Hosts grouped by category, inventory order kept within a group
fn by_category(hosts: &[HostId], book: &dyn AddressBook) -> BTreeMap<HostCategory, Vec<HostId>> {
    let mut groups: BTreeMap<HostCategory, Vec<HostId>> = BTreeMap::new();
    for host in hosts {
        groups.entry(book.category(host)).or_default().push(host.clone());
    }
    groups
}
