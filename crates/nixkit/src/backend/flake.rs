//! Flake evaluation and system builds using `nix` commands.

use crate::error::{Error, Result};
use crate::process::{self, find_tool};
use crate::types::FlakeRef;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

/// Backend that executes real `nix` commands against one flake.
pub struct NixFlake {
    flake: FlakeRef,
    /// Path to the nix executable
    nix_path: PathBuf,
    /// Extra arguments passed to every `nix` call
    extra_args: Vec<String>,
}

impl NixFlake {
    /// Create a backend for `flake`.
    ///
    /// Returns an error if nix is not installed.
    pub fn new(flake: FlakeRef) -> Result<Self> {
        Ok(Self::with_nix(flake, find_tool("nix")?))
    }

    /// Create a backend with an explicit nix executable.
    pub fn with_nix(flake: FlakeRef, nix_path: impl Into<PathBuf>) -> Self {
        Self {
            flake,
            nix_path: nix_path.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn flake(&self) -> &FlakeRef {
        &self.flake
    }

    fn nix(&self) -> Command {
        let mut cmd = Command::new(&self.nix_path);
        cmd.args(["--extra-experimental-features", "nix-command flakes"]);
        cmd.args(&self.extra_args);
        cmd
    }

    /// `nix eval` listing the flake's configuration names
    pub fn list_command(&self) -> Command {
        let mut cmd = self.nix();
        cmd.args(["eval", "--json"])
            .arg(self.flake.configurations())
            .args(["--apply", "builtins.attrNames"]);
        cmd
    }

    /// `nix build` of one host's system closure
    pub fn build_command(&self, host: &str) -> Command {
        let mut cmd = self.nix();
        cmd.arg("build")
            .arg(self.flake.toplevel(host))
            .args(["--no-link", "--print-build-logs"]);
        cmd
    }

    /// List every `nixosConfigurations` attribute, sorted by name.
    pub fn list_hosts(&self) -> Result<Vec<String>> {
        let output = self.list_command().output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_nix_output(&stderr, "nix eval"));
        }
        parse_host_list(&String::from_utf8_lossy(&output.stdout))
    }

    /// Build one host, streaming nix output into `log`.
    ///
    /// `Ok(false)` means nix ran and the build failed; the failure
    /// category and advice are appended to the log.
    pub fn build(&self, host: &str, log: &mut dyn Write) -> Result<bool> {
        let mut cmd = self.build_command(host);
        log::debug!("Running {}", process::describe(&cmd));

        let result = process::run_streaming(&mut cmd, log)?;
        if result.success() {
            return Ok(true);
        }

        let category = Error::from_nix_output(&result.stderr_tail, host).category();
        let _ = writeln!(
            log,
            "nix build exited with code {}: {}. {}",
            result.exit_code,
            category.description(),
            category.advice()
        );
        Ok(false)
    }
}

/// Parse the JSON array printed by `nix eval --json`.
pub fn parse_host_list(json: &str) -> Result<Vec<String>> {
    let mut hosts: Vec<String> = serde_json::from_str(json.trim())?;
    hosts.retain(|h| !h.trim().is_empty());
    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_parse_host_list() {
        let hosts = parse_host_list("[\"kiosk-lobby\",\"web1\",\"\"]\n").unwrap();
        assert_eq!(hosts, vec!["kiosk-lobby", "web1"]);
    }

    #[test]
    fn test_parse_host_list_rejects_garbage() {
        assert!(matches!(
            parse_host_list("error: nope"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_list_command() {
        let nix = NixFlake::with_nix(FlakeRef::new("."), "/run/current-system/sw/bin/nix");
        let args = args(&nix.list_command());
        assert_eq!(
            &args[2..],
            &[
                "eval",
                "--json",
                ".#nixosConfigurations",
                "--apply",
                "builtins.attrNames"
            ]
        );
    }

    #[test]
    fn test_build_command() {
        let nix = NixFlake::with_nix(FlakeRef::new("github:acme/fleet"), "nix")
            .with_extra_args(vec!["--offline".into()]);
        let args = args(&nix.build_command("web1"));
        assert_eq!(args[2], "--offline");
        assert_eq!(args[3], "build");
        assert_eq!(
            args[4],
            "github:acme/fleet#nixosConfigurations.web1.config.system.build.toplevel"
        );
        assert!(args.contains(&"--no-link".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_build_failure_appends_advice() {
        // `false` ignores its arguments and exits 1
        let nix = NixFlake::with_nix(FlakeRef::new("."), "false");
        let mut log: Vec<u8> = Vec::new();
        assert!(!nix.build("web1", &mut log).unwrap());

        let text = String::from_utf8(log).unwrap();
        assert!(text.contains("nix build exited with code 1"));
        assert!(text.contains("Unexpected error"));
    }

    #[cfg(unix)]
    #[test]
    fn test_build_success() {
        let nix = NixFlake::with_nix(FlakeRef::new("."), "true");
        let mut log: Vec<u8> = Vec::new();
        assert!(nix.build("web1", &mut log).unwrap());
    }
}
