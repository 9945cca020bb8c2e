//! `revship publish`: sync the publish directory to the store.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use revship_sync::{pipeline, ObjectOutcome, PublishReport};

use super::{describe_target, print_plan, TargetArgs};

/// Arguments for `revship publish`.
#[derive(Args, Debug)]
pub struct PublishArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Show the plan without uploading, deleting or touching the cache.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "result")]
    result: String,
    #[tabled(rename = "key")]
    key: String,
    #[tabled(rename = "error")]
    error: String,
}

impl PublishArgs {
    pub fn run(self) -> Result<()> {
        let resolved = self.target.resolve()?;

        if self.dry_run {
            let outcome = pipeline::plan(&resolved.request, resolved.store).context("plan failed")?;
            println!("[dry-run] {}", describe_target(&outcome.target, &outcome.store));
            print_plan(&outcome.plan, &outcome.unmatched);
            return Ok(());
        }

        let outcome =
            pipeline::publish(&resolved.request, resolved.store).context("publish failed")?;
        println!("{}", describe_target(&outcome.target, &outcome.store));
        print_report(&outcome.report);

        let counts = outcome.report.counts();
        if counts.failed > 0 {
            bail!("{} object(s) failed to publish", counts.failed);
        }
        Ok(())
    }
}

fn print_report(report: &PublishReport) {
    let rows: Vec<ReportRow> = report
        .objects
        .iter()
        .filter(|o| o.outcome != ObjectOutcome::Skipped)
        .map(|o| ReportRow {
            result: outcome_label(o.outcome),
            key: o.key.clone(),
            error: o.error.clone().unwrap_or_default(),
        })
        .collect();
    if !rows.is_empty() {
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    let counts = report.counts();
    let summary = format!(
        "{} created, {} updated, {} deleted, {} skipped, {} failed",
        counts.created, counts.updated, counts.deleted, counts.skipped, counts.failed
    );
    if counts.failed > 0 {
        println!("{} {summary}", "✗".red().bold());
    } else {
        println!("{} {summary}", "✓".green().bold());
    }
}

fn outcome_label(outcome: ObjectOutcome) -> String {
    match outcome {
        ObjectOutcome::Created => "created".green().to_string(),
        ObjectOutcome::Updated => "updated".yellow().to_string(),
        ObjectOutcome::Deleted => "deleted".red().to_string(),
        ObjectOutcome::Skipped => "skipped".bright_black().to_string(),
        ObjectOutcome::Failed => "FAILED".red().bold().to_string(),
    }
}
