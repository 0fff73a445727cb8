//! Command-line backends for nix tooling.
//!
//! Each backend builds its `Command` separately from running it, so the
//! exact invocation can be checked without nix installed.
//!
//! - [`flake::NixFlake`]: host listing and system builds through `nix`
//! - [`rebuild::NixosRebuild`]: activation and rollback through `nixos-rebuild`
//! - [`ssh::SshChannel`]: bounded remote commands through `ssh`

pub mod flake;
pub mod rebuild;
pub mod ssh;

pub use flake::{NixFlake, parse_host_list};
pub use rebuild::NixosRebuild;
pub use ssh::SshChannel;
