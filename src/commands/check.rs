//! `flotilla check`

use anyhow::Result;
use colored::Colorize;
use rollout::{HostRecord, Preflight};
use std::process::ExitCode;

use crate::Context;
use crate::backend::{self, ConfigAddressBook, SshRemote};
use crate::cli::SelectArgs;
use crate::ui;

pub fn run(ctx: &Context, args: SelectArgs) -> Result<ExitCode> {
    let config = super::load_config()?;
    let source = backend::inventory(&config)?;
    let hosts = super::select(source.as_ref(), &args)?;

    let book = ConfigAddressBook::new(&config);
    let channel = SshRemote::new(&config, &book);
    let preflight = super::deploy::probe(ctx, &config, &channel, &book, &hosts)?;

    let threshold = config.deploy.disk_warn_percent;
    ui::header("Pre-flight");
    for line in table(&preflight, threshold) {
        println!("{line}");
    }
    println!();

    let warned = preflight.disk_warnings(threshold).len();
    if preflight.unreachable.is_empty() {
        ui::success(&format!("{} host(s) reachable", preflight.reachable.len()));
    } else {
        ui::error(&format!(
            "{} of {} host(s) unreachable",
            preflight.unreachable.len(),
            hosts.len()
        ));
    }
    if warned > 0 {
        ui::warn(&format!("{warned} host(s) at or above {threshold}% disk usage"));
    }

    Ok(if preflight.unreachable.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// One row per host, reachable first, both groups in inventory order
fn table(preflight: &Preflight, threshold: u8) -> Vec<String> {
    let all: Vec<&HostRecord> = preflight
        .reachable
        .iter()
        .chain(&preflight.unreachable)
        .collect();
    let width = ui::name_width(all.iter().map(|r| r.id.as_str()));

    all.into_iter()
        .map(|record| {
            let state = if record.reachable {
                "up".green()
            } else {
                "down".red().bold()
            };
            let disk = match record.disk_pressure {
                Some(p) if p >= threshold => format!("{p:>3}%").yellow(),
                Some(p) => format!("{p:>3}%").normal(),
                None => "   ?".dimmed(),
            };
            format!(
                "  {:<width$}  {:<11}  {:<4}  {}  {}",
                record.id.as_str(),
                record.category.as_str(),
                state,
                disk,
                record.address.as_deref().unwrap_or("-").dimmed(),
                width = width
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollout::{HostCategory, HostId};

    fn record(name: &str, reachable: bool, disk: Option<u8>) -> HostRecord {
        HostRecord {
            id: HostId::new(name),
            reachable,
            disk_pressure: disk,
            category: HostCategory::Server,
            address: reachable.then(|| format!("{name}.local")),
        }
    }

    #[test]
    fn test_table_rows() {
        colored::control::set_override(false);
        let preflight = Preflight {
            reachable: vec![record("web1", true, Some(42)), record("db1", true, None)],
            unreachable: vec![record("kiosk-lobby", false, None)],
        };
        let rows = table(&preflight, 90);

        assert_eq!(rows.len(), 3);
        assert!(rows[0].contains("web1") && rows[0].contains(" 42%"));
        assert!(rows[0].contains("web1.local"));
        assert!(rows[1].contains("   ?"));
        assert!(rows[2].contains("kiosk-lobby") && rows[2].contains("down"));
    }
}
