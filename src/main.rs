mod cli;
mod commands;
mod config;
mod paths;
mod providers;
mod runner;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Explicit manifest path (`--config`)
    pub config: Option<PathBuf>,
    /// Manifests layered on top of the base (`--overlay`)
    pub overlays: Vec<PathBuf>,
}

fn main() -> Result<()> {
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

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
        overlays: cli.overlays,
    };

    match cli.command {
        Command::Check => commands::engine::check(&ctx),
        Command::Plan => commands::engine::plan(&ctx),
        Command::Apply(args) => commands::engine::apply(&ctx, &args),
        Command::Explain(args) => commands::engine::explain(&ctx, &args),
        Command::Graph(args) => commands::engine::graph(&ctx, &args),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "hearth", &mut io::stdout());
            Ok(())
        }
    }
}
