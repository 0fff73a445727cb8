//! Core types for nix operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Flake reference such as `.`, `/etc/nixos` or `github:org/fleet`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlakeRef(String);

impl FlakeRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<flake>#<host>`, the form `nixos-rebuild --flake` expects
    pub fn host(&self, host: &str) -> String {
        format!("{}#{}", self.0, host)
    }

    /// Installable of the host's system closure
    pub fn toplevel(&self, host: &str) -> String {
        format!(
            "{}#nixosConfigurations.{}.config.system.build.toplevel",
            self.0,
            attr_name(host)
        )
    }

    /// Installable of the configuration set
    pub fn configurations(&self) -> String {
        format!("{}#nixosConfigurations", self.0)
    }
}

impl fmt::Display for FlakeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quote an attribute name unless it is a plain identifier
fn attr_name(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '\''));
    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\\\""))
    }
}

/// `nixos-rebuild` sub-command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildAction {
    Switch,
    Test,
    Boot,
    Build,
}

impl RebuildAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Switch => "switch",
            Self::Test => "test",
            Self::Boot => "boot",
            Self::Build => "build",
        }
    }

    /// Whether the action changes the target machine
    pub fn touches_target(&self) -> bool {
        !matches!(self, Self::Build)
    }
}

impl fmt::Display for RebuildAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a rebuild is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The machine running the command
    Local,
    /// Another machine over ssh
    Remote { address: String },
}

impl Target {
    pub fn remote(address: impl Into<String>) -> Self {
        Self::Remote {
            address: address.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flake_installables() {
        let flake = FlakeRef::new("/etc/nixos");
        assert_eq!(flake.host("web1"), "/etc/nixos#web1");
        assert_eq!(
            flake.toplevel("web1"),
            "/etc/nixos#nixosConfigurations.web1.config.system.build.toplevel"
        );
        assert_eq!(flake.configurations(), "/etc/nixos#nixosConfigurations");
    }

    #[test]
    fn test_attr_names_are_quoted_when_needed() {
        assert_eq!(attr_name("kiosk-lobby"), "kiosk-lobby");
        assert_eq!(attr_name("web.prod"), "\"web.prod\"");
        assert_eq!(attr_name("1host"), "\"1host\"");
    }

    #[test]
    fn test_rebuild_action() {
        assert_eq!(RebuildAction::Boot.to_string(), "boot");
        assert!(RebuildAction::Switch.touches_target());
        assert!(!RebuildAction::Build.touches_target());
    }
}
