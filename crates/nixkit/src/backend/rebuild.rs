//! Activation and rollback using `nixos-rebuild`.

use crate::error::Result;
use crate::process::{self, find_tool};
use crate::types::{FlakeRef, RebuildAction, Target};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

/// Backend that runs `nixos-rebuild` for a flake's hosts.
pub struct NixosRebuild {
    flake: FlakeRef,
    /// Path to the nixos-rebuild executable
    rebuild_path: PathBuf,
    /// Login user for remote targets
    ssh_user: Option<String>,
    /// Escalate on the target instead of logging in as root
    use_remote_sudo: bool,
    /// Passed through `NIX_SSHOPTS`
    ssh_options: Vec<String>,
}

impl NixosRebuild {
    /// Create a backend for `flake`.
    ///
    /// Returns an error if nixos-rebuild is not installed.
    pub fn new(flake: FlakeRef) -> Result<Self> {
        Ok(Self::with_executable(flake, find_tool("nixos-rebuild")?))
    }

    pub fn with_executable(flake: FlakeRef, rebuild_path: impl Into<PathBuf>) -> Self {
        Self {
            flake,
            rebuild_path: rebuild_path.into(),
            ssh_user: None,
            use_remote_sudo: false,
            ssh_options: Vec::new(),
        }
    }

    pub fn with_ssh_user(mut self, user: Option<String>) -> Self {
        self.ssh_user = user.filter(|u| !u.is_empty());
        self
    }

    pub fn with_remote_sudo(mut self, enabled: bool) -> Self {
        self.use_remote_sudo = enabled;
        self
    }

    pub fn with_ssh_options(mut self, options: Vec<String>) -> Self {
        self.ssh_options = options;
        self
    }

    fn base(&self, target: &Target, elevate_locally: bool) -> Command {
        let mut cmd = if elevate_locally && matches!(target, Target::Local) {
            let mut sudo = Command::new("sudo");
            sudo.arg(&self.rebuild_path);
            sudo
        } else {
            Command::new(&self.rebuild_path)
        };
        if !self.ssh_options.is_empty() {
            let opts: Vec<String> = self.ssh_options.iter().map(|o| format!("-o {o}")).collect();
            cmd.env("NIX_SSHOPTS", opts.join(" "));
        }
        cmd
    }

    fn target_args(&self, cmd: &mut Command, target: &Target) {
        if let Target::Remote { address } = target {
            let destination = match &self.ssh_user {
                Some(user) if !address.contains('@') => format!("{user}@{address}"),
                _ => address.clone(),
            };
            cmd.arg("--target-host").arg(destination);
            if self.use_remote_sudo {
                cmd.arg("--use-remote-sudo");
            }
        }
    }

    /// `nixos-rebuild <action> --flake <flake>#<host> [--target-host ..]`
    pub fn apply_command(&self, host: &str, target: &Target, action: RebuildAction) -> Command {
        let mut cmd = self.base(target, action.touches_target());
        cmd.arg(action.as_str())
            .arg("--flake")
            .arg(self.flake.host(host));
        if action.touches_target() {
            self.target_args(&mut cmd, target);
        }
        cmd
    }

    /// `nixos-rebuild switch --rollback [--target-host ..]`
    pub fn rollback_command(&self, target: &Target) -> Command {
        let mut cmd = self.base(target, true);
        cmd.args(["switch", "--rollback"]);
        self.target_args(&mut cmd, target);
        cmd
    }

    /// Apply `action` to `host`, streaming output into `log`.
    ///
    /// Returns the exit code of nixos-rebuild.
    pub fn apply(
        &self,
        host: &str,
        target: &Target,
        action: RebuildAction,
        log: &mut dyn Write,
    ) -> Result<i32> {
        let mut cmd = self.apply_command(host, target, action);
        log::debug!("Running {}", process::describe(&cmd));
        Ok(process::run_streaming(&mut cmd, log)?.exit_code)
    }

    /// Activate the previous generation of the target.
    pub fn rollback(&self, target: &Target, log: &mut dyn Write) -> Result<i32> {
        let mut cmd = self.rollback_command(target);
        log::debug!("Running {}", process::describe(&cmd));
        Ok(process::run_streaming(&mut cmd, log)?.exit_code)
    }
}
