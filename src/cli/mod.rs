//! CLI command definitions and handlers

mod init;
mod run;
mod status;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// netpulse - threat-score delta pipeline
#[derive(Parser, Debug)]
#[command(name = "netpulse")]
#[command(
    version,
    about = "Score network topology snapshots and publish incremental change feeds for visualization clients",
    after_help = "\
Examples:
  netpulse init                       Write an example netpulse.toml
  netpulse run                        Dry run: fetch, score, diff, print
  netpulse run --commit               Publish snapshot + delta feed + state index
  netpulse run --commit --sandbox     Write only the sandbox snapshot
  netpulse status                     Show the latest published run"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = "netpulse.toml")]
    pub config: PathBuf,

    /// API token for the snapshot stores (falls back to GITHUB_TOKEN)
    #[arg(long, global = true, env = "NETPULSE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write an example netpulse.toml config file
    Init,

    /// Run the pipeline once (dry run unless --commit)
    #[command(after_help = "\
Examples:
  netpulse run                        Print changes, write nothing
  netpulse run --commit               Publish all four artifacts
  netpulse run --commit --sandbox     Publish the snapshot to the sandbox path only
  netpulse run --sandbox              Dry run; shows what a sandbox commit would write")]
    Run {
        /// Write artifacts to the output repository (otherwise dry run)
        #[arg(long)]
        commit: bool,

        /// Target the sandbox snapshot path instead of the canonical
        /// artifact set; safe while consumers follow the live feed
        #[arg(long)]
        sandbox: bool,
    },

    /// Show the latest published run from the output store
    Status,
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init => init::run(&cli.config),
        Commands::Run { commit, sandbox } => run::run(&cli.config, cli.token, commit, sandbox),
        Commands::Status => status::run(&cli.config, cli.token),
    }
}
