//! revship: content-hashed asset builds and branch-scoped publishing.
//!
//! # Usage
//!
//! ```text
//! revship build   [--root DIR]
//! revship publish [--root DIR] [--branch B] [--env E] [--store-dir DIR] [--dry-run]
//! revship plan    [--root DIR] [--branch B] [--env E] [--store-dir DIR] [--json]
//! ```
//!
//! Logging goes to stderr through `env_logger`; set `RUST_LOG=info` to see
//! every written, uploaded and deleted object.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{build::BuildArgs, plan::PlanArgs, publish::PublishArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "revship",
    version,
    about = "Revision static assets and publish them to branch-scoped object storage",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Revision assets, rewrite references and write the manifest.
    Build(BuildArgs),

    /// Sync the publish directory to the store for the current branch.
    Publish(PublishArgs),

    /// Show what `publish` would upload, skip and delete.
    Plan(PlanArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build(args) => args.run(),
        Commands::Publish(args) => args.run(),
        Commands::Plan(args) => args.run(),
    }
}
