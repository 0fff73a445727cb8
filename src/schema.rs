//! Configuration schema for flotilla
//!
//! Every field has a default, so an empty or missing `config.toml` is a
//! valid configuration.

use anyhow::{Context, Result, bail};
use rollout::{DeployAction, DeployMode, HostCategory, StrategyOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::paths;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlotillaConfig {
    /// Where host ids come from
    #[serde(default)]
    pub inventory: InventoryConfig,

    /// How hosts are reached
    #[serde(default)]
    pub ssh: SshConfig,

    /// Rollout defaults, overridable per invocation
    #[serde(default)]
    pub deploy: DeployConfig,

    /// Per-host overrides keyed by host id
    #[serde(default)]
    pub hosts: BTreeMap<String, HostConfig>,
}

impl FlotillaConfig {
    /// Load from the default config file, or defaults if it does not exist
    pub fn load() -> Result<Self> {
        let path = paths::config_file()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.inventory.validate().context("Invalid [inventory]")?;
        self.ssh.validate().context("Invalid [ssh]")?;
        self.deploy.validate().context("Invalid [deploy]")?;
        for (name, host) in &self.hosts {
            host.validate()
                .with_context(|| format!("Invalid host '{}'", name))?;
        }
        Ok(())
    }
}

// ============================================================================
// Inventory
// ============================================================================

/// Kind of host inventory
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InventorySource {
    /// `nixosConfigurations` of a flake
    #[default]
    Flake,
    /// The `hosts` list of this file
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryConfig {
    #[serde(default)]
    pub source: InventorySource,

    /// Flake reference, `~` and `$VAR` are expanded
    #[serde(default = "default_flake")]
    pub flake: String,

    /// Host ids for the static source
    #[serde(default)]
    pub hosts: Vec<String>,
}

fn default_flake() -> String {
    ".".to_string()
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            source: InventorySource::default(),
            flake: default_flake(),
            hosts: Vec::new(),
        }
    }
}

impl InventoryConfig {
    pub fn validate(&self) -> Result<()> {
        match self.source {
            InventorySource::Flake if self.flake.trim().is_empty() => {
                bail!("flake reference is empty")
            }
            InventorySource::Static if self.hosts.iter().all(|h| h.trim().is_empty()) => {
                bail!("static inventory lists no hosts")
            }
            _ => Ok(()),
        }
    }

    /// Flake reference with `~` and variables expanded
    pub fn flake_ref(&self) -> String {
        let flake = self.flake.trim();
        if flake.starts_with('~') || flake.contains('$') {
            paths::expand(flake).to_string_lossy().into_owned()
        } else {
            flake.to_string()
        }
    }
}

// ============================================================================
// SSH
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SshConfig {
    /// Login user, empty for the ssh default
    #[serde(default = "default_ssh_user")]
    pub user: String,

    /// Appended to the host id to form the secondary address
    #[serde(default = "default_fallback_suffix")]
    pub fallback_suffix: String,

    /// Hard bound on each probe
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Extra `-o` options, e.g. `Port=2222`
    #[serde(default)]
    pub options: Vec<String>,
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_fallback_suffix() -> String {
    ".local".to_string()
}

const fn default_probe_timeout() -> u64 {
    2
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            fallback_suffix: default_fallback_suffix(),
            probe_timeout_secs: default_probe_timeout(),
            options: Vec::new(),
        }
    }
}

impl SshConfig {
    pub fn validate(&self) -> Result<()> {
        if self.probe_timeout_secs == 0 {
            bail!("probe_timeout_secs must be at least 1");
        }
        if let Some(bad) = self.options.iter().find(|o| !o.contains('=')) {
            bail!("ssh option '{}' is not of the form Key=Value", bad);
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn login_user(&self) -> Option<String> {
        let user = self.user.trim();
        (!user.is_empty()).then(|| user.to_string())
    }
}

// ============================================================================
// Deploy
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeployConfig {
    pub mode: DeployMode,
    pub action: DeployAction,
    pub max_parallel: usize,
    pub batch_size: usize,
    pub batch_delay_secs: u64,
    /// Concurrent pre-flight probes and builds
    pub probe_jobs: usize,
    /// Root filesystem usage that triggers a warning
    pub disk_warn_percent: u8,
    /// `--use-remote-sudo` instead of logging in as root
    pub use_remote_sudo: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            mode: DeployMode::default(),
            action: DeployAction::default(),
            max_parallel: rollout::DEFAULT_MAX_PARALLEL,
            batch_size: rollout::DEFAULT_BATCH_SIZE,
            batch_delay_secs: 0,
            probe_jobs: 8,
            disk_warn_percent: 90,
            use_remote_sudo: false,
        }
    }
}

impl DeployConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel == 0 {
            bail!("max_parallel must be at least 1");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.probe_jobs == 0 {
            bail!("probe_jobs must be at least 1");
        }
        if self.disk_warn_percent > 100 {
            bail!("disk_warn_percent must be between 0 and 100");
        }
        Ok(())
    }

    /// Engine options from these defaults
    pub fn strategy(&self) -> StrategyOptions {
        StrategyOptions {
            mode: self.mode,
            action: self.action,
            max_parallel: self.max_parallel,
            batch_size: self.batch_size,
            batch_delay: Duration::from_secs(self.batch_delay_secs),
        }
    }
}

// ============================================================================
// Hosts
// ============================================================================

/// Per-host reachability and display overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostConfig {
    /// Primary address, defaults to the host id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Secondary address, defaults to `<host><fallback_suffix>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<HostCategory>,

    /// The host is the machine running flotilla
    #[serde(default)]
    pub local: bool,
}

impl HostConfig {
    pub fn validate(&self) -> Result<()> {
        if self.address.as_deref().is_some_and(|a| a.trim().is_empty()) {
            bail!("address is empty");
        }
        if self
            .fallback_address
            .as_deref()
            .is_some_and(|a| a.trim().is_empty())
        {
            bail!("fallback_address is empty");
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
