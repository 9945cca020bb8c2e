//! `revship build`: run the revision pipeline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use revship_core::ProjectConfig;
use revship_revision::{pipeline, BuildLayout, Stage};

/// Arguments for `revship build`.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Project root containing `revship.yaml`.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

impl BuildArgs {
    pub fn run(self) -> Result<()> {
        let config = ProjectConfig::load_at(&self.root)
            .with_context(|| format!("failed to load project config in {}", self.root.display()))?;
        let layout = BuildLayout::from(&config.build);
        let report = pipeline::run(&layout).context("build failed")?;

        for stage in &report.stages {
            if stage.stage == Stage::ClearDestination {
                continue;
            }
            println!("{} {} ({} files)", "✓".green(), stage.stage, stage.files.len());
            for file in &stage.files {
                if file.original == file.written {
                    println!("  ✎  {}", file.written);
                } else {
                    println!("  ✎  {} → {}", file.original, file.written);
                }
            }
        }
        println!(
            "{} {} files written, {} manifest entries → {}",
            "✓".green().bold(),
            report.files_written(),
            report.manifest.len(),
            layout.manifest_path.display()
        );
        Ok(())
    }
}
