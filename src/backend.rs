//! Binds the nixkit tooling to the rollout collaborator traits.

use anyhow::{Context, Result};
use nixkit::{FlakeRef, NixFlake, NixosRebuild, RebuildAction, SshChannel, Target};
use rollout::{
    AddressBook, BuildBackend, CommandOutput, DeployAction, DeployBackend, HostAddresses,
    HostCategory, HostId, HostSource, RemoteChannel, RollbackBackend, classify,
};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::time::Duration;

use crate::schema::{FlotillaConfig, HostConfig, InventorySource};

// ============================================================================
// Inventory
// ============================================================================

/// Hosts from the `nixosConfigurations` of a flake
pub struct FlakeInventory {
    nix: NixFlake,
}

impl HostSource for FlakeInventory {
    fn list_hosts(&self) -> Result<Vec<String>> {
        self.nix
            .list_hosts()
            .with_context(|| format!("Could not list hosts of {}", self.nix.flake()))
    }
}

/// Hosts listed in the config file
pub struct StaticInventory {
    hosts: Vec<String>,
}

impl HostSource for StaticInventory {
    fn list_hosts(&self) -> Result<Vec<String>> {
        Ok(self.hosts.iter().map(|h| h.trim().to_string()).collect())
    }
}

/// Host source selected by `[inventory]`
pub fn inventory(config: &FlotillaConfig) -> Result<Box<dyn HostSource>> {
    match config.inventory.source {
        InventorySource::Flake => {
            let nix = NixFlake::new(flake(config)).context("The flake inventory needs nix")?;
            Ok(Box::new(FlakeInventory { nix }))
        }
        InventorySource::Static => Ok(Box::new(StaticInventory {
            hosts: config.inventory.hosts.clone(),
        })),
    }
}

pub fn flake(config: &FlotillaConfig) -> FlakeRef {
    FlakeRef::new(config.inventory.flake_ref())
}

// ============================================================================
// Addresses
// ============================================================================

/// Addresses and categories from `[hosts.*]` and `[ssh]`
#[derive(Debug, Clone, Default)]
pub struct ConfigAddressBook {
    hosts: BTreeMap<String, HostConfig>,
    fallback_suffix: String,
    /// Short hostname of this machine
    hostname: Option<String>,
}

impl ConfigAddressBook {
    pub fn new(config: &FlotillaConfig) -> Self {
        Self {
            hosts: config.hosts.clone(),
            fallback_suffix: config.ssh.fallback_suffix.trim().to_string(),
            hostname: machine_hostname(),
        }
    }

    pub fn with_hostname(mut self, hostname: Option<String>) -> Self {
        self.hostname = hostname;
        self
    }

    fn is_local(&self, host: &str) -> bool {
        self.hosts.get(host).is_some_and(|h| h.local) || self.hostname.as_deref() == Some(host)
    }

    fn primary(&self, host: &str) -> String {
        self.hosts
            .get(host)
            .and_then(|h| h.address.clone())
            .unwrap_or_else(|| host.to_string())
    }

    /// Primary addresses of local hosts
    pub fn local_addresses(&self) -> HashSet<String> {
        self.hosts
            .keys()
            .map(String::as_str)
            .chain(self.hostname.as_deref())
            .filter(|name| self.is_local(name))
            .map(|name| self.primary(name))
            .collect()
    }
}

/// Hostname of the running machine, without its domain
fn machine_hostname() -> Option<String> {
    ["/proc/sys/kernel/hostname", "/etc/hostname"]
        .into_iter()
        .find_map(|path| std::fs::read_to_string(path).ok())
        .and_then(|name| name.trim().split('.').next().map(str::to_string))
        .filter(|name| !name.is_empty())
}

impl AddressBook for ConfigAddressBook {
    fn addresses(&self, host: &HostId) -> HostAddresses {
        let entry = self.hosts.get(host.as_str());
        let primary = self.primary(host.as_str());

        if self.is_local(host.as_str()) {
            return HostAddresses::local(primary);
        }

        let secondary = entry
            .and_then(|h| h.fallback_address.clone())
            .or_else(|| {
                (!self.fallback_suffix.is_empty())
                    .then(|| format!("{host}{}", self.fallback_suffix))
            })
            .filter(|s| s != &primary);

        HostAddresses::remote(primary, secondary)
    }

    fn category(&self, host: &HostId) -> HostCategory {
        self.hosts
            .get(host.as_str())
            .and_then(|h| h.category)
            .unwrap_or_else(|| classify(host.as_str()))
    }
}

// ============================================================================
// Remote execution
// ============================================================================

/// ssh execution channel
pub struct SshRemote {
    ssh: SshChannel,
}

impl SshRemote {
    pub fn new(config: &FlotillaConfig, book: &ConfigAddressBook) -> Self {
        let ssh = SshChannel::new()
            .with_user(config.ssh.login_user())
            .with_options(config.ssh.options.clone());
        let ssh = book
            .local_addresses()
            .into_iter()
            .fold(ssh, |ssh, address| ssh.with_local(address));
        Self { ssh }
    }
}

impl RemoteChannel for SshRemote {
    fn execute(
        &self,
        address: &str,
        command: &[&str],
        connect_timeout: Duration,
    ) -> Result<CommandOutput> {
        let output = self.ssh.execute(address, command, connect_timeout)?;
        Ok(CommandOutput {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

// ============================================================================
// Build
// ============================================================================

/// `nix build` of each host's system closure
pub struct FlakeBuilder {
    nix: NixFlake,
}

impl FlakeBuilder {
    pub fn new(config: &FlotillaConfig) -> Result<Self> {
        let nix = NixFlake::new(flake(config)).context("Building hosts needs nix")?;
        Ok(Self { nix })
    }
}

impl BuildBackend for FlakeBuilder {
    fn build(&self, host: &HostId, log: &mut dyn Write) -> Result<bool> {
        Ok(self.nix.build(host.as_str(), log)?)
    }
}

// ============================================================================
// Deploy and rollback
// ============================================================================

/// `nixos-rebuild` for deploy and rollback
pub struct Rebuilder {
    rebuild: NixosRebuild,
    local: HashSet<String>,
}

impl Rebuilder {
    pub fn new(config: &FlotillaConfig, book: &ConfigAddressBook) -> Result<Self> {
        let rebuild = NixosRebuild::new(flake(config))
            .context("Deploying hosts needs nixos-rebuild")?;
        Ok(Self::with_backend(rebuild, config, book))
    }

    pub fn with_backend(
        rebuild: NixosRebuild,
        config: &FlotillaConfig,
        book: &ConfigAddressBook,
    ) -> Self {
        Self {
            rebuild: rebuild
                .with_ssh_user(config.ssh.login_user())
                .with_remote_sudo(config.deploy.use_remote_sudo)
                .with_ssh_options(config.ssh.options.clone()),
            local: book.local_addresses(),
        }
    }

    fn target(&self, address: &str) -> Target {
        if self.local.contains(address) || matches!(address, "localhost" | "127.0.0.1" | "::1") {
            Target::Local
        } else {
            Target::remote(address)
        }
    }
}

pub fn rebuild_action(action: DeployAction) -> RebuildAction {
    match action {
        DeployAction::Switch => RebuildAction::Switch,
        DeployAction::Test => RebuildAction::Test,
        DeployAction::Boot => RebuildAction::Boot,
        DeployAction::Build => RebuildAction::Build,
    }
}

impl DeployBackend for Rebuilder {
    fn apply(
        &self,
        host: &HostId,
        address: &str,
        action: DeployAction,
        log: &mut dyn Write,
    ) -> Result<i32> {
        let target = self.target(address);
        Ok(self
            .rebuild
            .apply(host.as_str(), &target, rebuild_action(action), log)?)
    }
}

impl RollbackBackend for Rebuilder {
    fn rollback(&self, _host: &HostId, address: &str, log: &mut dyn Write) -> Result<i32> {
        Ok(self.rebuild.rollback(&self.target(address), log)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
