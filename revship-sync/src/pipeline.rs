//! Publish entrypoints used by the CLI.
//!
//! `plan` stops after computing the [`SyncPlan`]; `publish` executes it and
//! persists the upload cache. Both list the remote under the target prefix
//! and load the cache for `{environment, branch}` first.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use revship_core::{EnvironmentName, FileGroup, GroupPriority, PublishConfig, SyncTarget};
use revship_revision::{hasher, scan};

use crate::cache::{self, UploadCache};
use crate::error::{io_err, StoreError, SyncError};
use crate::groups::GroupMatcher;
use crate::planner::{self, LocalObject, SyncPlan};
use crate::publisher::{self, PublishOptions, PublishReport};
use crate::store::{ObjectStore, RemoteObject};

/// Inputs of a plan or publish run, resolved by the caller.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub publish_dir: PathBuf,
    pub groups: Vec<FileGroup>,
    pub priority: GroupPriority,
    pub target: SyncTarget,
    pub environment: EnvironmentName,
    pub cache_dir: PathBuf,
    pub protected_prefixes: Vec<String>,
    pub options: PublishOptions,
}

impl PublishRequest {
    pub fn new(
        config: &PublishConfig,
        groups: Vec<FileGroup>,
        target: SyncTarget,
        environment: EnvironmentName,
    ) -> Self {
        Self {
            publish_dir: config.dir.clone(),
            groups,
            priority: config.group_priority,
            target,
            environment,
            cache_dir: config.cache_dir.clone(),
            protected_prefixes: config.protected_prefixes.clone(),
            options: PublishOptions::from(config),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    pub target: SyncTarget,
    pub store: String,
    pub plan: SyncPlan,
    /// Local files no group claims; they are not published.
    pub unmatched: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub target: SyncTarget,
    pub store: String,
    pub plan: SyncPlan,
    pub unmatched: Vec<String>,
    pub report: PublishReport,
}

/// Hash every file of `request.publish_dir` owned by a group.
pub fn collect_local(
    request: &PublishRequest,
    groups: &GroupMatcher,
) -> Result<(Vec<LocalObject>, Vec<String>), SyncError> {
    if !request.publish_dir.is_dir() {
        return Err(io_err(
            &request.publish_dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "publish directory not found"),
        ));
    }

    let mut local = Vec::new();
    let mut unmatched = Vec::new();
    for file in scan::walk(&request.publish_dir)? {
        let Some(group) = groups.owner(&file.relative) else {
            tracing::debug!("no file group matches {}", file.relative);
            unmatched.push(file.relative);
            continue;
        };
        let bytes = std::fs::read(&file.path).map_err(|e| io_err(&file.path, e))?;
        local.push(LocalObject {
            key: request.target.key_for(&file.relative),
            relative: file.relative,
            path: file.path,
            content_hash: hasher::content_digest(&bytes),
            group,
        });
    }
    Ok((local, unmatched))
}

async fn list_remote(
    request: &PublishRequest,
    store: &Arc<dyn ObjectStore>,
) -> Result<Vec<RemoteObject>, SyncError> {
    let prefix = request.target.destination_prefix.clone();
    let lister = Arc::clone(store);
    publisher::with_retry(&request.options.retry, "list", move || lister.list(&prefix))
        .await
        .map_err(|err| match err {
            StoreError::Auth(message) => SyncError::Auth(message),
            source => SyncError::Store {
                operation: "list",
                source,
            },
        })
}

struct Prepared {
    groups: GroupMatcher,
    cache: UploadCache,
    outcome: PlanOutcome,
}

async fn prepare(
    request: &PublishRequest,
    store: &Arc<dyn ObjectStore>,
) -> Result<Prepared, SyncError> {
    let groups = GroupMatcher::new(&request.groups, request.priority)?;
    let (local, unmatched) = collect_local(request, &groups)?;
    let cache = cache::load_at(&request.cache_dir, &request.environment, &request.target.branch)?;
    let remote = list_remote(request, store).await?;

    tracing::info!(
        "planning {} local files against {} remote objects under '{}' on {}",
        local.len(),
        remote.len(),
        request.target.destination_prefix,
        store.describe()
    );
    let plan = planner::plan(
        &request.target,
        local,
        &remote,
        &cache.objects,
        &request.protected_prefixes,
    );
    Ok(Prepared {
        groups,
        cache,
        outcome: PlanOutcome {
            target: request.target.clone(),
            store: store.describe(),
            plan,
            unmatched,
        },
    })
}

fn runtime() -> Result<tokio::runtime::Runtime, SyncError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| SyncError::Runtime(e.to_string()))
}

/// Compute the plan without writing to the store or the cache.
pub fn plan(request: &PublishRequest, store: Arc<dyn ObjectStore>) -> Result<PlanOutcome, SyncError> {
    runtime()?.block_on(async { Ok(prepare(request, &store).await?.outcome) })
}

/// Plan, execute and persist the upload cache.
///
/// The cache is written only when the run was not aborted; per-object
/// failures are in the report.
pub fn publish(
    request: &PublishRequest,
    store: Arc<dyn ObjectStore>,
) -> Result<PublishOutcome, SyncError> {
    runtime()?.block_on(async {
        let Prepared {
            groups,
            mut cache,
            outcome,
        } = prepare(request, &store).await?;

        let report = publisher::execute(
            Arc::clone(&store),
            &outcome.plan,
            &groups,
            &request.options,
            &mut cache.objects,
        )
        .await?;

        cache.synced_at = Utc::now();
        cache::save_at(
            &request.cache_dir,
            &request.environment,
            &request.target.branch,
            &cache,
        )?;

        Ok(PublishOutcome {
            target: outcome.target,
            store: outcome.store,
            plan: outcome.plan,
            unmatched: outcome.unmatched,
            report,
        })
    })
}
