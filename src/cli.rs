use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use rollout::{DeployAction, DeployMode};

#[derive(Parser, Debug)]
#[command(name = "flotilla")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Deploy a NixOS flake to a fleet of hosts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploy the configuration to hosts
    Deploy(DeployArgs),

    /// Build host configurations without deploying
    Build(BuildArgs),

    /// Probe reachability and disk pressure
    Check(SelectArgs),

    /// List hosts of the inventory
    List {
        /// Only hosts matching this glob
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Roll hosts back to their previous generation
    Rollback {
        /// Hosts to roll back
        #[arg(required = true)]
        hosts: Vec<String>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Inspect the effective configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Host selection
// ============================================================================

#[derive(Args, Debug, Clone, Default)]
pub struct SelectArgs {
    /// Hosts to target, in order (default: every host)
    pub hosts: Vec<String>,

    /// Only hosts matching this glob (ignored when hosts are given)
    #[arg(short, long)]
    pub filter: Option<String>,
}

// ============================================================================
// Deploy
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct DeployArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Rollout strategy: sequential, parallel or rolling
    #[arg(short, long)]
    pub mode: Option<DeployMode>,

    /// Action applied to each host: switch, test, boot or build
    #[arg(short, long)]
    pub action: Option<DeployAction>,

    /// Hosts per batch after the canary (rolling mode)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Seconds to wait between batches (rolling mode)
    #[arg(long)]
    pub batch_delay: Option<u64>,

    /// Concurrent deployments (parallel mode)
    #[arg(short = 'j', long)]
    pub max_parallel: Option<usize>,

    /// Roll back hosts that failed
    #[arg(long)]
    pub rollback_on_failure: bool,

    /// Build each host before deploying it
    #[arg(long)]
    pub build_first: bool,

    /// Show the plan without deploying
    #[arg(long)]
    pub dry_run: bool,

    /// Answer yes to every prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Deploy without probing hosts first
    #[arg(long)]
    pub skip_preflight: bool,
}

// ============================================================================
// Build
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Concurrent builds (default: deploy.probe_jobs)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

// ============================================================================
// Config
// ============================================================================

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file location
    Path,
}

// ============================================================================
// Tests
// ============================================================================
