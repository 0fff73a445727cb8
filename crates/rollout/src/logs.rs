//! Per-run log directory
//!
//! Layout: `<root>/<run-id>/<host>.<phase>.log`. Files are opened in append
//! mode and each (host, phase) pair has a single writer.

use crate::error::Result;
use crate::run::run_id;
use crate::types::HostId;
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Phase a log file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogPhase {
    Build,
    Deploy,
    Rollback,
}

impl LogPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Deploy => "deploy",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for LogPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to one host's log for one phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogHandle {
    pub host: HostId,
    pub phase: LogPhase,
    pub path: PathBuf,
}

/// Log directory of a single run
#[derive(Debug, Clone)]
pub struct RunLogs {
    dir: PathBuf,
}

impl RunLogs {
    /// Create `<root>/<run_id>` and return its handle
    pub fn create(root: &Path, run_id: &str) -> Result<Self> {
        let dir = root.join(run_id);
        fs::create_dir_all(&dir)?;
        log::debug!("Run logs at {}", dir.display());
        Ok(Self { dir })
    }

    /// Claim a fresh `<root>/<run-id>` for a run started at `at`
    ///
    /// Each candidate is taken with a single `create_dir`, so two processes
    /// starting in the same second never share a directory: the loser moves
    /// on to the next `-N` suffix.
    pub fn create_unique(root: &Path, at: DateTime<Utc>) -> Result<(String, Self)> {
        fs::create_dir_all(root)?;
        let base = run_id(at);
        let mut n = 1;
        loop {
            let id = if n == 1 {
                base.clone()
            } else {
                format!("{base}-{n}")
            };
            let dir = root.join(&id);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    log::debug!("Run logs at {}", dir.display());
                    return Ok((id, Self { dir }));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Create a directory for a standalone action, named like a run
    pub fn create_now(root: &Path) -> Result<Self> {
        Ok(Self::create_unique(root, Utc::now())?.1)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a host's log for `phase`
    pub fn path(&self, host: &HostId, phase: LogPhase) -> PathBuf {
        self.dir
            .join(format!("{}.{}.log", sanitize(host.as_str()), phase))
    }

    pub fn handle(&self, host: &HostId, phase: LogPhase) -> LogHandle {
        LogHandle {
            host: host.clone(),
            phase,
            path: self.path(host, phase),
        }
    }

    /// Open a host's log for appending
    pub fn open(&self, host: &HostId, phase: LogPhase) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(host, phase))?;
        Ok(file)
    }

    /// Logs that exist for a host, in phase order
    pub fn existing(&self, host: &HostId) -> Vec<LogHandle> {
        [LogPhase::Build, LogPhase::Deploy, LogPhase::Rollback]
            .into_iter()
            .map(|phase| self.handle(host, phase))
            .filter(|h| h.path.exists())
            .collect()
    }
}

/// Keep host ids from escaping the run directory
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}
