//! Run report rendering
//!
//! A report is a pure projection of the run's registry. Rendering the same
//! run twice without intervening mutation produces identical output.

use crate::error::Result;
use crate::logs::LogPhase;
use crate::run::DeploymentRun;
use crate::types::{DeployAction, DeployMode, DeploymentStatus, HostCategory, HostId};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// One host line of the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostReport {
    pub host: HostId,
    pub category: HostCategory,
    pub status: DeploymentStatus,
    /// Most relevant log for the host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Host dropped before the run started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedHost {
    pub host: HostId,
    pub category: HostCategory,
    pub reason: String,
}

/// Structured summary of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: String,
    /// Run start, RFC 3339
    pub timestamp: String,
    pub mode: DeployMode,
    pub action: DeployAction,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub pending: usize,
    pub hosts: Vec<HostReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<ExcludedHost>,
}

/// Project a run into its report
pub fn render(run: &DeploymentRun) -> Report {
    let counts = run.registry.counts_by_status();

    let hosts = run
        .registry
        .snapshot()
        .into_iter()
        .map(|(host, status)| {
            let category = run
                .record(&host)
                .map(|r| r.category)
                .unwrap_or_default();
            let notes = run.registry.notes(&host);
            let note = (!notes.is_empty()).then(|| notes.join("; "));
            let log = relevant_log(run, &host, status);
            HostReport {
                host,
                category,
                status,
                log,
                note,
            }
        })
        .collect();

    let excluded = run
        .excluded
        .iter()
        .map(|r| ExcludedHost {
            host: r.id.clone(),
            category: r.category,
            reason: "unreachable".into(),
        })
        .collect();

    Report {
        run_id: run.id.clone(),
        timestamp: run.started_at.to_rfc3339(),
        mode: run.mode,
        action: run.action,
        total: counts.total(),
        success: counts.success,
        failed: counts.failed,
        // a host never claimed and one left mid-flight are both unfinished
        pending: counts.pending + counts.deploying,
        hosts,
        excluded,
    }
}

/// Failed builds point at the build log, everything else at the deploy log
fn relevant_log(run: &DeploymentRun, host: &HostId, status: DeploymentStatus) -> Option<PathBuf> {
    let existing = run.logs.existing(host);
    let deploy = existing.iter().find(|h| h.phase == LogPhase::Deploy);
    let build = existing.iter().find(|h| h.phase == LogPhase::Build);

    match (status, deploy, build) {
        (DeploymentStatus::Failed, None, Some(build)) => Some(build.path.clone()),
        (_, Some(deploy), _) => Some(deploy.path.clone()),
        (_, None, Some(build)) => Some(build.path.clone()),
        _ => None,
    }
}

impl Report {
    /// Every host of the run reached `Success`
    ///
    /// A run with no deployable host is not a success.
    pub fn is_success(&self) -> bool {
        self.total > 0 && self.failed == 0 && self.pending == 0
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Deployment report `{}`", self.run_id);
        let _ = writeln!(out);
        let _ = writeln!(out, "- Started: {}", self.timestamp);
        let _ = writeln!(out, "- Mode: {}", self.mode);
        let _ = writeln!(out, "- Action: {}", self.action);
        let _ = writeln!(
            out,
            "- Result: {} succeeded, {} failed, {} pending of {}",
            self.success, self.failed, self.pending, self.total
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "| Host | Category | Status | Log | Note |");
        let _ = writeln!(out, "|------|----------|--------|-----|------|");
        for host in &self.hosts {
            let log = host
                .log
                .as_ref()
                .map(|p| format!("`{}`", p.display()))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                host.host,
                host.category,
                host.status,
                log,
                escape_cell(host.note.as_deref().unwrap_or(""))
            );
        }

        if !self.excluded.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Excluded");
            let _ = writeln!(out);
            for host in &self.excluded {
                let _ = writeln!(out, "- {} ({}): {}", host.host, host.category, host.reason);
            }
        }

        out
    }

    /// Write `report.md` and `report.json` into `dir`
    pub fn write_to(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        let markdown = dir.join("report.md");
        let json = dir.join("report.json");
        fs::write(&markdown, self.to_markdown())?;
        fs::write(&json, self.to_json()?)?;
        log::debug!("Report written to {}", dir.display());
        Ok((markdown, json))
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::record;
    use crate::types::HostRecord;
    use std::io::Write;
    use tempfile::TempDir;

    fn sample_run(tmp: &TempDir) -> DeploymentRun {
        let mut kiosk = record("kiosk-lobby");
        kiosk.category = HostCategory::Kiosk;
        let run = DeploymentRun::start(
            tmp.path(),
            DeployMode::Rolling,
            DeployAction::Switch,
            vec![kiosk, record("web1"), record("web2")],
        )
        .unwrap()
        .with_excluded(vec![HostRecord {
            reachable: false,
            address: None,
            ..record("nas")
        }]);

        let lease = run.registry.claim(&"kiosk-lobby".into()).unwrap();
        writeln!(
            run.logs.open(&"kiosk-lobby".into(), LogPhase::Deploy).unwrap(),
            "ok"
        )
        .unwrap();
        run.registry.note(&"kiosk-lobby".into(), "active: /nix/store/abc");
        run.registry.complete(lease, DeploymentStatus::Success).unwrap();

        let lease = run.registry.claim(&"web1".into()).unwrap();
        writeln!(run.logs.open(&"web1".into(), LogPhase::Build).unwrap(), "err").unwrap();
        run.registry.note(&"web1".into(), "build failed | see log");
        run.registry.complete(lease, DeploymentStatus::Failed).unwrap();

        run
    }

    #[test]
    fn test_render_counts_and_order() {
        let tmp = TempDir::new().unwrap();
        let run = sample_run(&tmp);
        let report = render(&run);

        assert_eq!(report.total, 3);
        assert_eq!(report.success, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.pending, 1);
        assert!(!report.is_success());

        let order: Vec<&str> = report.hosts.iter().map(|h| h.host.as_str()).collect();
        assert_eq!(order, vec!["kiosk-lobby", "web1", "web2"]);
        assert_eq!(report.hosts[0].category, HostCategory::Kiosk);
        assert_eq!(report.hosts[0].note.as_deref(), Some("active: /nix/store/abc"));
        assert_eq!(report.excluded.len(), 1);
        assert_eq!(report.excluded[0].host.as_str(), "nas");
    }

    #[test]
    fn test_render_points_at_relevant_log() {
        let tmp = TempDir::new().unwrap();
        let run = sample_run(&tmp);
        let report = render(&run);

        assert_eq!(
            report.hosts[0].log.as_deref(),
            Some(run.logs.path(&"kiosk-lobby".into(), LogPhase::Deploy).as_path())
        );
        assert_eq!(
            report.hosts[1].log.as_deref(),
            Some(run.logs.path(&"web1".into(), LogPhase::Build).as_path())
        );
        assert!(report.hosts[2].log.is_none());
    }

    #[test]
    fn test_render_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let run = sample_run(&tmp);

        let first = render(&run);
        let second = render(&run);
        assert_eq!(first, second);
        assert_eq!(first.to_markdown(), second.to_markdown());
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn test_markdown_escapes_notes() {
        let tmp = TempDir::new().unwrap();
        let markdown = render(&sample_run(&tmp)).to_markdown();

        assert!(markdown.contains("| web1 | other | failed |"));
        assert!(markdown.contains("build failed \\| see log"));
        assert!(markdown.contains("1 succeeded, 1 failed, 1 pending of 3"));
        assert!(markdown.contains("## Excluded"));
    }

    #[test]
    fn test_json_round_trips() {
        let tmp = TempDir::new().unwrap();
        let report = render(&sample_run(&tmp));
        let parsed: Report = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_write_to_run_directory() {
        let tmp = TempDir::new().unwrap();
        let run = sample_run(&tmp);
        let (md, json) = render(&run).write_to(run.logs.dir()).unwrap();

        assert!(md.ends_with("report.md"));
        assert!(fs::read_to_string(json).unwrap().contains("\"mode\": \"rolling\""));
    }

    #[test]
    fn test_all_success_report() {
        let tmp = TempDir::new().unwrap();
        let run =
            DeploymentRun::start(tmp.path(), DeployMode::Parallel, DeployAction::Test, vec![record("a")])
                .unwrap();
        let lease = run.registry.claim(&"a".into()).unwrap();
        run.registry.complete(lease, DeploymentStatus::Success).unwrap();

        assert!(render(&run).is_success());
    }
}
