//! Subcommands and the target resolution they share.

pub mod build;
pub mod plan;
pub mod publish;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use revship_core::{
    config::{load_file_groups, resolve_branch, resolve_environment},
    DeployConfig, EnvSnapshot, EnvironmentName, ProjectConfig, SyncTarget,
};
use revship_sync::{
    pipeline::PublishRequest,
    planner::SyncPlan,
    store::{DirStore, S3Store},
    ObjectStore,
};

/// Where and as what to publish; shared by `publish` and `plan`.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Project root containing `revship.yaml`.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Branch to publish (default: `REVSHIP_BRANCH`, the CI branch, or git HEAD).
    #[arg(long)]
    pub branch: Option<String>,

    /// Deployment environment (default: `REVSHIP_ENV`, `GULP_ENV`, `ENV`, or development).
    #[arg(long = "env")]
    pub environment: Option<String>,

    /// Publish into a local directory instead of the configured bucket.
    #[arg(long)]
    pub store_dir: Option<PathBuf>,
}

pub struct Resolved {
    pub request: PublishRequest,
    pub store: Arc<dyn ObjectStore>,
}

impl TargetArgs {
    /// Resolve configuration, target and store once for this invocation.
    pub fn resolve(&self) -> Result<Resolved> {
        let config = ProjectConfig::load_at(&self.root)
            .with_context(|| format!("failed to load project config in {}", self.root.display()))?;
        let groups = load_file_groups(&config.publish.file_groups)
            .context("failed to load file groups")?;

        let env = EnvSnapshot::from_process();
        let environment = self
            .environment
            .as_deref()
            .map(EnvironmentName::from)
            .unwrap_or_else(|| resolve_environment(&env));
        let branch = resolve_branch(&env, self.branch.as_deref(), &self.root)
            .context("could not determine the branch to publish")?;

        let store: Arc<dyn ObjectStore> = match &self.store_dir {
            Some(dir) => Arc::new(DirStore::new(dir)),
            None => {
                let home = dirs::home_dir();
                let deploy = DeployConfig::resolve(
                    &env,
                    branch.clone(),
                    environment.clone(),
                    &self.root,
                    home.as_deref(),
                )
                .context("failed to resolve deploy settings")?;
                let timeout = Duration::from_secs(config.publish.request_timeout_secs);
                Arc::new(S3Store::new(&deploy, timeout).context("failed to set up the S3 client")?)
            }
        };

        let target = SyncTarget::resolve(branch, &environment, &config.publish.canonical_policy());
        tracing::info!(
            "target: branch {} ({}) → '{}' on {}",
            target.branch,
            if target.is_canonical { "canonical" } else { "branch" },
            target.destination_prefix,
            store.describe()
        );
        Ok(Resolved {
            request: PublishRequest::new(&config.publish, groups, target, environment),
            store,
        })
    }
}

// ---------------------------------------------------------------------------
// Shared output
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "key")]
    key: String,
}

pub(crate) fn describe_target(target: &SyncTarget, store: &str) -> String {
    let prefix = if target.destination_prefix.is_empty() {
        "/".to_string()
    } else {
        target.destination_prefix.clone()
    };
    let kind = if target.is_canonical { "canonical" } else { "branch" };
    format!("{} {} ({kind}) → {store} {prefix}", "▶".bold(), target.branch)
}

pub(crate) fn print_plan(plan: &SyncPlan, unmatched: &[String]) {
    let mut rows: Vec<PlanRow> = Vec::new();
    for upload in &plan.uploads {
        let action = match upload.kind {
            revship_sync::UploadKind::Create => "create".green().to_string(),
            revship_sync::UploadKind::Update => "update".yellow().to_string(),
        };
        rows.push(PlanRow {
            action,
            key: upload.object.key.clone(),
        });
    }
    for key in &plan.deletes {
        rows.push(PlanRow {
            action: "delete".red().to_string(),
            key: key.clone(),
        });
    }
    for key in &plan.protected {
        rows.push(PlanRow {
            action: "keep".bright_black().to_string(),
            key: key.clone(),
        });
    }

    if rows.is_empty() {
        println!("  nothing to upload or delete ({} unchanged)", plan.skips.len());
    } else {
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!(
            "  {} to upload, {} to delete, {} unchanged",
            plan.uploads.len(),
            plan.deletes.len(),
            plan.skips.len()
        );
    }
    if !unmatched.is_empty() {
        println!(
            "  {} {} local file(s) match no file group and are not published",
            "!".yellow().bold(),
            unmatched.len()
        );
    }
}
