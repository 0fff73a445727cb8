//! Bounded command execution over `ssh`.

use crate::error::{Error, Result};
use crate::process::{self, Captured};
use std::collections::HashSet;
use std::process::Command;
use std::time::Duration;

/// Exit code ssh reserves for its own failures
const SSH_FAILURE: i32 = 255;

/// Runs commands on hosts through the system ssh client.
///
/// Addresses registered as local run in a plain child process instead.
#[derive(Debug, Clone, Default)]
pub struct SshChannel {
    user: Option<String>,
    options: Vec<String>,
    local: HashSet<String>,
}

impl SshChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user.filter(|u| !u.is_empty());
        self
    }

    /// Extra `-o` options, e.g. `Port=2222`
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    /// Treat `address` as the machine running the command
    pub fn with_local(mut self, address: impl Into<String>) -> Self {
        self.local.insert(address.into());
        self
    }

    pub fn is_local(&self, address: &str) -> bool {
        self.local.contains(address) || matches!(address, "localhost" | "127.0.0.1" | "::1")
    }

    fn destination(&self, address: &str) -> String {
        match &self.user {
            Some(user) if !address.contains('@') => format!("{user}@{address}"),
            _ => address.to_string(),
        }
    }

    /// The `ssh` invocation for one remote command
    pub fn command(&self, address: &str, command: &[&str], connect_timeout: Duration) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "BatchMode=yes"])
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", connect_timeout.as_secs().max(1)));
        for option in &self.options {
            cmd.arg("-o").arg(option);
        }
        cmd.arg(self.destination(address)).arg("--").args(command);
        cmd
    }

    /// Run `command` on `address`, killing it after `timeout`.
    ///
    /// A connection failure is an `Err`; a command that ran and exited
    /// non-zero is `Ok` with its exit code.
    pub fn execute(&self, address: &str, command: &[&str], timeout: Duration) -> Result<Captured> {
        if self.is_local(address) {
            let Some((program, args)) = command.split_first() else {
                return Ok(Captured::default());
            };
            let mut cmd = Command::new(program);
            cmd.args(args);
            return process::run_with_timeout(&mut cmd, timeout);
        }

        let mut cmd = self.command(address, command, timeout);
        let output = process::run_with_timeout(&mut cmd, timeout).map_err(|e| match e {
            Error::Timeout { after, .. } => Error::Timeout {
                command: format!("ssh {address}"),
                after,
            },
            other => other,
        })?;

        if output.exit_code == SSH_FAILURE {
            return Err(Error::Connection {
                address: address.to_string(),
                message: output.stderr_str().trim().to_string(),
            });
        }
        Ok(output)
    }
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
    fn test_command_shape() {
        let ssh = SshChannel::new()
            .with_user(Some("root".into()))
            .with_options(vec!["Port=2222".into()]);
        let cmd = ssh.command("web1", &["df", "-P", "/"], Duration::from_secs(2));
        let args = args(&cmd);

        assert!(args.contains(&"ConnectTimeout=2".to_string()));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"Port=2222".to_string()));
        let tail = &args[args.len() - 5..];
        assert_eq!(tail, &["root@web1", "--", "df", "-P", "/"]);
    }

    #[test]
    fn test_connect_timeout_has_a_floor() {
        let cmd = SshChannel::new().command("web1", &["true"], Duration::from_millis(100));
        assert!(args(&cmd).contains(&"ConnectTimeout=1".to_string()));
    }

    #[test]
    fn test_explicit_user_in_address_wins() {
        let ssh = SshChannel::new().with_user(Some("root".into()));
        assert_eq!(ssh.destination("admin@web1"), "admin@web1");
        assert_eq!(SshChannel::new().destination("web1"), "web1");
    }

    #[test]
    fn test_local_addresses() {
        let ssh = SshChannel::new().with_local("laptop");
        assert!(ssh.is_local("laptop"));
        assert!(ssh.is_local("localhost"));
        assert!(!ssh.is_local("web1"));
    }

    #[cfg(unix)]
    #[test]
    fn test_local_execution_skips_ssh() {
        let ssh = SshChannel::new().with_local("laptop");
        let out = ssh
            .execute("laptop", &["sh", "-c", "echo local"], Duration::from_secs(5))
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, b"local\n");
    }
}
