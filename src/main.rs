mod backend;
mod cli;
mod commands;
mod paths;
mod progress;
mod schema;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Exit code when a command could not run at all
const EXIT_ERROR: u8 = 2;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context { quiet: cli.quiet };

    match dispatch(&ctx, cli.command) {
        Ok(code) => code,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn dispatch(ctx: &Context, command: Command) -> Result<ExitCode> {
    match command {
        Command::Deploy(args) => commands::deploy::run(ctx, args),
        Command::Build(args) => commands::build::run(ctx, args),
        Command::Check(args) => commands::check::run(ctx, args),
        Command::List { filter } => commands::list::run(ctx, filter),
        Command::Rollback { hosts, yes } => commands::rollback::run(ctx, hosts, yes),
        Command::Config(cmd) => commands::config::run(cmd),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "flotilla", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}
