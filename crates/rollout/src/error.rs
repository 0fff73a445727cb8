//! Error taxonomy for deployment runs.
//!
//! Only inventory and registry errors ever abort a run. Per-host failures
//! (unreachable, build, deploy, rollback) are recorded as status and notes
//! and surface in the report instead of being raised.

use crate::types::HostId;
use thiserror::Error;

/// Errors that can occur during a deployment run.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration source could not be queried
    #[error("inventory unavailable: {message}")]
    InventoryUnavailable {
        /// Why the source failed
        message: String,
    },

    /// An explicitly requested host is not in the inventory
    #[error("unknown host: {0}")]
    UnknownHost(HostId),

    /// Host did not answer the pre-flight probe
    #[error("host unreachable: {0}")]
    HostUnreachable(HostId),

    /// Building the host's configuration failed
    #[error("build failed for {host}: {message}")]
    BuildFailure {
        host: HostId,
        message: String,
    },

    /// Applying the configuration failed
    #[error("deploy failed for {host}: {message}")]
    DeployFailure {
        host: HostId,
        message: String,
    },

    /// Rolling back to the previous generation failed
    #[error("rollback failed for {host}: {message}")]
    RollbackFailure {
        host: HostId,
        message: String,
    },

    /// A second owner tried to claim a host
    #[error("host already claimed: {0}")]
    AlreadyClaimed(HostId),

    /// Host has no entry in the status registry
    #[error("host not registered in this run: {0}")]
    NotRegistered(HostId),

    /// Invalid pattern or option
    #[error("invalid {what}: {message}")]
    Invalid {
        what: &'static str,
        message: String,
    },

    /// IO error (log directory, report files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error prevents the run from touching any host
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InventoryUnavailable { .. }
                | Self::UnknownHost(_)
                | Self::Invalid { .. }
                | Self::NotRegistered(_)
        )
    }

    /// Host this error is attributed to, if any
    pub fn host(&self) -> Option<&HostId> {
        match self {
            Self::UnknownHost(h)
            | Self::HostUnreachable(h)
            | Self::AlreadyClaimed(h)
            | Self::NotRegistered(h) => Some(h),
            Self::BuildFailure { host, .. }
            | Self::DeployFailure { host, .. }
            | Self::RollbackFailure { host, .. } => Some(host),
            _ => None,
        }
    }
}

/// Result type for rollout operations.
pub type Result<T> = std::result::Result<T, Error>;
