//! # nixkit
//!
//! Rust library for driving NixOS tooling against a fleet.
//!
//! This crate provides functionality for:
//! - Listing the `nixosConfigurations` of a flake
//! - Building a host's system closure with `nix build`
//! - Applying or rolling back configurations with `nixos-rebuild`
//! - Running bounded commands on hosts over `ssh`
//!
//! ## Example
//!
//! ```no_run
//! use nixkit::{FlakeRef, NixFlake, NixosRebuild, RebuildAction, SshChannel, Target};
//! use std::time::Duration;
//!
//! let flake = FlakeRef::new("/etc/nixos");
//! let nix = NixFlake::new(flake.clone()).expect("nix not available");
//! for host in nix.list_hosts().expect("evaluation failed") {
//!     println!("{host}");
//! }
//!
//! let ssh = SshChannel::new().with_user(Some("root".into()));
//! let df = ssh.execute("web1", &["df", "-P", "/"], Duration::from_secs(2));
//!
//! let rebuild = NixosRebuild::new(flake).expect("nixos-rebuild not available");
//! let mut log = std::io::stdout();
//! rebuild
//!     .apply("web1", &Target::remote("web1"), RebuildAction::Test, &mut log)
//!     .expect("rebuild failed to start");
//! ```
//!
//! ## Errors
//!
//! Failed commands are categorized from their stderr with
//! [`Error::from_nix_output`]; each [`ErrorCategory`] carries user advice.

#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod process;
pub mod types;

pub use backend::{NixFlake, NixosRebuild, SshChannel, parse_host_list};
pub use error::{Error, ErrorCategory, Result};
pub use process::{Captured, Streamed};
pub use types::{FlakeRef, RebuildAction, Target};
