//! difftrack: working-tree diff state from the command line.
//!
//! # Usage
//!
//! ```text
//! difftrack [--root <dir>] [--baseline <dir>] [--log-json] status [--json]
//! difftrack [--root <dir>] [--baseline <dir>] [--log-json] show <file> [--json]
//! difftrack [--root <dir>] [--baseline <dir>] [--log-json] watch [--file <file>]
//! ```
//!
//! The working tree at `--root` (default: current directory) is compared
//! against a baseline copy at `--baseline` (default: `<root>/.baseline`).

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{show::ShowArgs, status::StatusArgs, watch::WatchArgs, WorkspaceArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "difftrack",
    version,
    about = "Track working-tree changes against a baseline snapshot",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    workspace: WorkspaceArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List changed files.
    Status(StatusArgs),

    /// Load one file's diff state: baseline, working copy and annotations.
    Show(ShowArgs),

    /// Follow status and active-file changes until interrupted.
    Watch(WatchArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Status(args) => args.run(&cli.workspace),
        Commands::Show(args) => args.run(&cli.workspace),
        Commands::Watch(args) => args.run(&cli.workspace),
    }
}
