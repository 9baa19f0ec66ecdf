use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hearth")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative dev environment provisioning", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Manifest file (defaults to hearth.toml or hearth.json in the config dir)
    #[arg(short, long, global = true, env = "HEARTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Additional manifest layered on top of the base (repeatable)
    #[arg(long = "overlay", global = true, value_name = "FILE")]
    pub overlays: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check every step and report its current status
    Check,

    /// Show the changes apply would make
    Plan,

    /// Bring the system in line with the manifest
    Apply(ApplyArgs),

    /// Explain what a step does and why
    Explain(ExplainArgs),

    /// Print the compiled step graph
    Graph(GraphArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Dry run - check and plan, but change nothing
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of steps to run in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Stop starting new steps after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Roll back applied steps if any step fails
    #[arg(long)]
    pub rollback: bool,
}

#[derive(Args)]
pub struct ExplainArgs {
    /// Step ID to explain (all steps when omitted)
    pub step: Option<String>,
}

#[derive(Args)]
pub struct GraphArgs {
    /// Emit Graphviz DOT instead of a plain listing
    #[arg(long)]
    pub dot: bool,
}
