//! Collaborator and callback traits
//!
//! The engine never talks to nix, ssh or a terminal directly. Everything
//! outside the orchestration core is injected through these traits.

use crate::classify::classify;
use crate::types::{
    CommandOutput, DeployAction, DeploymentStatus, HostAddresses, HostCategory, HostId,
};
use anyhow::Result;
use std::io::Write;
use std::time::Duration;

/// Source of deployable host identifiers
pub trait HostSource: Send + Sync {
    /// List every host the configuration declares, in a stable order
    fn list_hosts(&self) -> Result<Vec<String>>;
}

/// Resolves how a host can be reached
pub trait AddressBook: Send + Sync {
    fn addresses(&self, host: &HostId) -> HostAddresses;

    /// Display category, from naming conventions unless overridden
    fn category(&self, host: &HostId) -> HostCategory {
        classify(host.as_str())
    }
}

/// Remote (or local) command execution channel
pub trait RemoteChannel: Send + Sync {
    /// Run `command` on `address`
    ///
    /// `Err` means the channel itself failed (could not connect, timed out).
    /// A command that ran and exited non-zero is `Ok` with its exit code.
    fn execute(
        &self,
        address: &str,
        command: &[&str],
        connect_timeout: Duration,
    ) -> Result<CommandOutput>;
}

/// Opaque builder for a host's declared configuration
pub trait BuildBackend: Send + Sync {
    /// Build the host's configuration, streaming output into `log`
    ///
    /// Returns whether the build succeeded.
    fn build(&self, host: &HostId, log: &mut dyn Write) -> Result<bool>;
}

/// Applies a host's configuration
pub trait DeployBackend: Send + Sync {
    /// Apply `action` to `host` through `address`, returns the exit code
    fn apply(
        &self,
        host: &HostId,
        address: &str,
        action: DeployAction,
        log: &mut dyn Write,
    ) -> Result<i32>;
}

/// Rolls a host back to its previous generation
pub trait RollbackBackend: Send + Sync {
    /// Returns the exit code of the rollback action
    fn rollback(&self, host: &HostId, address: &str, log: &mut dyn Write) -> Result<i32>;
}

/// Confirmation callback for user interaction
///
/// Implement this trait to handle user confirmations.
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Progress observer for a run
///
/// Called from worker threads, so implementations must be `Sync`.
pub trait DeployObserver: Sync {
    /// A wave is about to start
    fn on_wave_start(&self, label: &str, hosts: &[HostId]);

    /// A host left `Pending`
    fn on_host_start(&self, host: &HostId);

    /// A host reached a terminal state
    fn on_host_complete(&self, host: &HostId, status: DeploymentStatus);

    /// Every member of the wave is terminal
    fn on_wave_complete(&self, label: &str);
}

/// No-op observer
pub struct NoObserver;

impl DeployObserver for NoObserver {
    fn on_wave_start(&self, _label: &str, _hosts: &[HostId]) {}
    fn on_host_start(&self, _host: &HostId) {}
    fn on_host_complete(&self, _host: &HostId, _status: DeploymentStatus) {}
    fn on_wave_complete(&self, _label: &str) {}
}
