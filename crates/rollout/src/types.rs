//! Core types for fleet deployment runs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identifier of a deployable host
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(String);

impl HostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for HostId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Deployment state of a single host within a run
///
/// Transitions are only `Pending -> Deploying -> {Success, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Deploying,
    Success,
    Failed,
}

impl DeploymentStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Deploying => "deploying",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rollout strategy for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// One host at a time, in inventory order
    Sequential,
    /// Bounded worker pool over all hosts
    #[default]
    Parallel,
    /// Canary first, then fixed-size batches
    Rolling,
}

impl DeployMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Rolling => "rolling",
        }
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" | "seq" => Ok(Self::Sequential),
            "parallel" | "par" => Ok(Self::Parallel),
            "rolling" | "canary" => Ok(Self::Rolling),
            other => Err(format!("unknown deploy mode: {other}")),
        }
    }
}

/// Action applied to each host's configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployAction {
    /// Activate now and make it the boot default
    #[default]
    Switch,
    /// Activate now without touching the boot default
    Test,
    /// Make it the boot default without activating
    Boot,
    /// Build only
    Build,
}

impl DeployAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Switch => "switch",
            Self::Test => "test",
            Self::Boot => "boot",
            Self::Build => "build",
        }
    }

    /// Whether the action changes what runs on the host
    pub fn activates(&self) -> bool {
        matches!(self, Self::Switch | Self::Test)
    }
}

impl fmt::Display for DeployAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "switch" => Ok(Self::Switch),
            "test" => Ok(Self::Test),
            "boot" => Ok(Self::Boot),
            "build" => Ok(Self::Build),
            other => Err(format!("unknown deploy action: {other}")),
        }
    }
}

/// Display category of a host
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HostCategory {
    Workstation,
    Server,
    Kiosk,
    #[default]
    Other,
}

impl HostCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workstation => "workstation",
            Self::Server => "server",
            Self::Kiosk => "kiosk",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for HostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-flight view of a host (derived, never persisted)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: HostId,
    pub reachable: bool,
    /// Root filesystem usage in percent, `None` when unknown
    pub disk_pressure: Option<u8>,
    pub category: HostCategory,
    /// Address form that answered the probe
    pub address: Option<String>,
}

impl HostRecord {
    /// Record for a host that was not probed
    pub fn unprobed(id: HostId, category: HostCategory, address: impl Into<String>) -> Self {
        Self {
            id,
            reachable: true,
            disk_pressure: None,
            category,
            address: Some(address.into()),
        }
    }

    /// Address to deploy through, falling back to the host id
    pub fn target(&self) -> &str {
        self.address.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Addresses a host can be reached at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAddresses {
    pub primary: String,
    pub secondary: Option<String>,
    /// Host is the machine running the deploy
    pub local: bool,
}

impl HostAddresses {
    pub fn remote(primary: impl Into<String>, secondary: Option<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary,
            local: false,
        }
    }

    pub fn local(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: None,
            local: true,
        }
    }
}

/// Output of a command run through an execution channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Number of hosts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub deploying: usize,
    pub success: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.deploying + self.success + self.failed
    }

    pub fn terminal(&self) -> usize {
        self.success + self.failed
    }

    /// Every host reached `Success`; an empty run does not count
    pub fn all_success(&self) -> bool {
        self.total() > 0 && self.success == self.total()
    }

    pub fn add(&mut self, status: DeploymentStatus) {
        match status {
            DeploymentStatus::Pending => self.pending += 1,
            DeploymentStatus::Deploying => self.deploying += 1,
            DeploymentStatus::Success => self.success += 1,
            DeploymentStatus::Failed => self.failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!DeploymentStatus::Pending.is_terminal());
        assert!(!DeploymentStatus::Deploying.is_terminal());
        assert!(DeploymentStatus::Success.is_terminal());
        assert!(DeploymentStatus::Failed.is_terminal());
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("rolling".parse::<DeployMode>(), Ok(DeployMode::Rolling));
        assert_eq!("Canary".parse::<DeployMode>(), Ok(DeployMode::Rolling));
        assert_eq!("seq".parse::<DeployMode>(), Ok(DeployMode::Sequential));
        assert!("blue-green".parse::<DeployMode>().is_err());
    }

    #[test]
    fn test_action_activates() {
        assert!(DeployAction::Switch.activates());
        assert!(DeployAction::Test.activates());
        assert!(!DeployAction::Boot.activates());
        assert!(!DeployAction::Build.activates());
    }

    #[test]
    fn test_status_counts() {
        let mut counts = StatusCounts::default();
        assert!(!counts.all_success());
        counts.add(DeploymentStatus::Success);
        counts.add(DeploymentStatus::Success);
        assert!(counts.all_success());

        counts.add(DeploymentStatus::Pending);
        assert!(!counts.all_success());
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.terminal(), 2);
    }

    #[test]
    fn test_host_record_target_falls_back_to_id() {
        let mut record = HostRecord::unprobed("web1".into(), HostCategory::Server, "10.0.0.1");
        assert_eq!(record.target(), "10.0.0.1");
        record.address = None;
        assert_eq!(record.target(), "web1");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&DeploymentStatus::Deploying).unwrap();
        assert_eq!(json, "\"deploying\"");
    }
}
