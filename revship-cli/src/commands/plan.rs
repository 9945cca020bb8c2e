//! `revship plan`: compute and print the sync plan without writing.

use anyhow::{Context, Result};
use clap::Args;

use revship_sync::pipeline;

use super::{describe_target, print_plan, TargetArgs};

/// Arguments for `revship plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl PlanArgs {
    pub fn run(self) -> Result<()> {
        let resolved = self.target.resolve()?;
        let outcome = pipeline::plan(&resolved.request, resolved.store).context("plan failed")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome).context("failed to serialize plan JSON")?
            );
            return Ok(());
        }

        println!("[dry-run] {}", describe_target(&outcome.target, &outcome.store));
        print_plan(&outcome.plan, &outcome.unmatched);
        Ok(())
    }
}
