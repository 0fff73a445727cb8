//! Error types for nix, nixos-rebuild and ssh operations.
//!
//! Tool failures are categorized from their stderr so callers can show
//! targeted advice next to the raw output.

use std::time::Duration;
use thiserror::Error;

/// Categories of command failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Host or substituter could not be reached
    Network,
    /// Command exceeded its deadline
    Timeout,
    /// The flake failed to evaluate
    Evaluation,
    /// A derivation failed to build
    Build,
    /// Authentication or privilege problem
    Permission,
    /// Tool, flake or attribute missing
    NotFound,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Timeout => "Command timed out",
            Self::Evaluation => "Flake evaluation error",
            Self::Build => "Build failure",
            Self::Permission => "Permission denied",
            Self::NotFound => "Not found",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check that the host is up and reachable over ssh",
            Self::Timeout => "Raise ssh.probe_timeout_secs or check the host's network",
            Self::Evaluation => "Run `nix flake check` to see the evaluation error",
            Self::Build => "Inspect the build log for the failing derivation",
            Self::Permission => {
                "Check ssh keys, or enable deploy.use_remote_sudo for non-root users"
            }
            Self::NotFound => "Verify the flake reference and that nix is installed",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while driving nix tooling.
#[derive(Debug, Error)]
pub enum Error {
    /// A required tool is not in PATH
    #[error("{tool} not found in PATH")]
    ToolNotFound {
        /// Executable name
        tool: &'static str,
    },

    /// Could not connect to a host
    #[error("cannot connect to {address}: {message}")]
    Connection {
        /// Address that was tried
        address: String,
        /// Reason reported by ssh
        message: String,
    },

    /// Command exceeded its deadline and was killed
    #[error("{command} timed out after {}s", .after.as_secs_f32())]
    Timeout {
        /// Short description of the command
        command: String,
        /// Deadline that was exceeded
        after: Duration,
    },

    /// Flake evaluation failed
    #[error("evaluation failed: {message}")]
    Evaluation {
        /// Condensed stderr
        message: String,
    },

    /// Permission denied
    #[error("permission denied: {message}")]
    Permission {
        /// Details about what permission was denied
        message: String,
    },

    /// Flake, attribute or path missing
    #[error("not found: {message}")]
    NotFound {
        /// What could not be found
        message: String,
    },

    /// Command execution failed
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Connection { .. } => ErrorCategory::Network,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::Evaluation { .. } => ErrorCategory::Evaluation,
            Error::Permission { .. } => ErrorCategory::Permission,
            Error::ToolNotFound { .. } | Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::CommandFailed { stderr, .. } if looks_like_build_failure(stderr) => {
                ErrorCategory::Build
            }
            _ => ErrorCategory::Other,
        }
    }

    /// Create an error from nix command output.
    ///
    /// Analyzes stderr to categorize the error appropriately. `subject` is
    /// the host or command the output belongs to.
    pub fn from_nix_output(stderr: &str, subject: &str) -> Self {
        let stderr_lower = stderr.to_lowercase();
        let message = condense(stderr);

        // Network errors
        if stderr_lower.contains("could not resolve")
            || stderr_lower.contains("connection refused")
            || stderr_lower.contains("connection timed out")
            || stderr_lower.contains("no route to host")
            || stderr_lower.contains("network is unreachable")
            || stderr_lower.contains("unable to download")
        {
            return Error::Connection {
                address: subject.to_string(),
                message,
            };
        }

        // Permission errors
        if stderr_lower.contains("permission denied")
            || stderr_lower.contains("operation not permitted")
            || stderr_lower.contains("a password is required")
            || stderr_lower.contains("host key verification failed")
            || stderr_lower.contains("is not a trusted user")
        {
            return Error::Permission { message };
        }

        // Missing flake / attribute
        if stderr_lower.contains("does not provide attribute")
            || (stderr_lower.contains("path") && stderr_lower.contains("does not exist"))
            || stderr_lower.contains("no such file or directory")
            || stderr_lower.contains("cannot find flake")
        {
            return Error::NotFound { message };
        }

        // Evaluation errors (checked after not-found, both start with "error:")
        if stderr_lower.contains("while evaluating")
            || stderr_lower.contains("syntax error")
            || stderr_lower.contains("undefined variable")
            || stderr_lower.contains("infinite recursion")
            || stderr_lower.contains("assertion")
        {
            return Error::Evaluation { message };
        }

        Error::CommandFailed {
            message: format!("{subject} failed"),
            stderr: stderr.trim().to_string(),
        }
    }
}

fn looks_like_build_failure(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("builder for") || (lower.contains("build of") && lower.contains("failed"))
}

/// Last meaningful error line of nix output
fn condense(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .rfind(|l| l.starts_with("error:"))
        .or_else(|| stderr.lines().map(str::trim).rfind(|l| !l.is_empty()))
        .unwrap_or("")
        .to_string()
}

/// Result type for nix operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_transient() {
        assert!(ErrorCategory::Network.is_transient());
        assert!(ErrorCategory::Timeout.is_transient());
        assert!(!ErrorCategory::Evaluation.is_transient());
    }

    #[test]
    fn test_from_nix_output_network() {
        let err = Error::from_nix_output(
            "ssh: Could not resolve hostname web1: Name or service not known",
            "nixos-rebuild",
        );
        assert_eq!(err.category(), ErrorCategory::Network);
    }

    #[test]
    fn test_from_nix_output_missing_attribute() {
        let err = Error::from_nix_output(
            "error: flake 'path:/etc/nixos' does not provide attribute 'nixosConfigurations.nope'",
            "nix build",
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_from_nix_output_evaluation() {
        let stderr = "error:\n       … while evaluating the attribute 'config'\n\n       error: undefined variable 'pkgz'\n";
        let err = Error::from_nix_output(stderr, "nix eval");
        assert_eq!(err.category(), ErrorCategory::Evaluation);
        assert_eq!(err.to_string(), "evaluation failed: error: undefined variable 'pkgz'");
    }

    #[test]
    fn test_from_nix_output_permission() {
        let err = Error::from_nix_output("sudo: a password is required", "nixos-rebuild");
        assert_eq!(err.category(), ErrorCategory::Permission);
    }

    #[test]
    fn test_from_nix_output_build() {
        let err = Error::from_nix_output(
            "error: builder for '/nix/store/abc-foo.drv' failed with exit code 2",
            "nix build",
        );
        assert_eq!(err.category(), ErrorCategory::Build);
    }

    #[test]
    fn test_from_nix_output_other() {
        let err = Error::from_nix_output("something odd", "nix build");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert!(matches!(err, Error::CommandFailed { .. }));
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::Timeout {
            command: "ssh web1".into(),
            after: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "ssh web1 timed out after 2s");
        assert_eq!(err.category(), ErrorCategory::Timeout);
    }

    #[test]
    fn test_condense() {
        assert_eq!(condense("warning: x\nerror: first\nerror: last\n"), "error: last");
        assert_eq!(condense("plain\n\n"), "plain");
        assert_eq!(condense(""), "");
    }
}
