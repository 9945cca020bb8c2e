//! Plan execution against an [`ObjectStore`].
//!
//! Store calls are blocking, so each one runs on tokio's blocking pool and a
//! semaphore bounds how many are in flight. Deletions start only after every
//! upload finished.
//!
//! A blocking call cannot be cancelled once it runs. After an authentication
//! failure the remaining tasks are aborted and an abort flag makes every call
//! that has not reached the store yet return without touching it; calls
//! already inside the store finish.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use revship_core::PublishConfig;

use crate::cache::ObjectHashes;
use crate::error::{store_io_err, StoreError, SyncError};
use crate::groups::GroupMatcher;
use crate::planner::{SyncPlan, UploadKind};
use crate::store::{content_type_for, ObjectMeta, ObjectStore};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Bounded exponential backoff for transient store failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&PublishConfig> for PublishOptions {
    fn from(config: &PublishConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            retry: RetryPolicy {
                max_attempts: config.max_attempts.max(1),
                base_delay: Duration::from_millis(config.retry_base_delay_ms),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectOutcome {
    Created,
    Updated,
    Deleted,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectReport {
    pub key: String,
    pub outcome: ObjectOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Per-object result of a publish, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub objects: Vec<ObjectReport>,
}

impl PublishReport {
    pub fn counts(&self) -> PublishCounts {
        let mut counts = PublishCounts::default();
        for object in &self.objects {
            match object.outcome {
                ObjectOutcome::Created => counts.created += 1,
                ObjectOutcome::Updated => counts.updated += 1,
                ObjectOutcome::Deleted => counts.deleted += 1,
                ObjectOutcome::Skipped => counts.skipped += 1,
                ObjectOutcome::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn has_failures(&self) -> bool {
        self.objects
            .iter()
            .any(|o| o.outcome == ObjectOutcome::Failed)
    }
}

#[derive(Debug)]
enum Operation {
    Upload {
        key: String,
        path: PathBuf,
        kind: UploadKind,
        meta: ObjectMeta,
    },
    Delete {
        key: String,
    },
}

impl Operation {
    fn key(&self) -> &str {
        match self {
            Operation::Upload { key, .. } | Operation::Delete { key } => key,
        }
    }
}

/// Headers for an upload: the group's headers plus a `Content-Type` by
/// extension unless the group sets one.
pub fn object_headers(
    group_headers: Option<&BTreeMap<String, String>>,
    key: &str,
) -> BTreeMap<String, String> {
    let mut headers = group_headers.cloned().unwrap_or_default();
    if !headers
        .keys()
        .any(|name| name.eq_ignore_ascii_case("content-type"))
    {
        headers.insert("Content-Type".to_string(), content_type_for(key).to_string());
    }
    headers
}

fn aborted_err() -> StoreError {
    StoreError::Rejected("publish aborted after an authentication failure".to_string())
}

/// Run `op` on the blocking pool, retrying transient failures.
pub(crate) async fn with_retry<T, F>(retry: &RetryPolicy, label: &str, op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: Fn() -> Result<T, StoreError> + Clone + Send + 'static,
{
    let mut attempt = 1;
    loop {
        let result = match tokio::task::spawn_blocking(op.clone()).await {
            Ok(result) => result,
            Err(e) => Err(StoreError::Rejected(format!("store call panicked: {e}"))),
        };
        match result {
            Err(err) if err.is_transient() && attempt < retry.max_attempts => {
                let delay = retry.delay(attempt);
                tracing::warn!(
                    "{label}: attempt {attempt}/{} failed ({err}), retrying in {delay:?}",
                    retry.max_attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

async fn run_batch(
    store: &Arc<dyn ObjectStore>,
    operations: Vec<Operation>,
    options: &PublishOptions,
    aborted: &Arc<AtomicBool>,
) -> Result<Vec<(Operation, Result<(), StoreError>)>, SyncError> {
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for operation in operations {
        let store = Arc::clone(store);
        let semaphore = Arc::clone(&semaphore);
        let retry = options.retry.clone();
        let aborted = Arc::clone(aborted);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let label = operation.key().to_string();
            let result = match &operation {
                Operation::Upload {
                    key, path, meta, ..
                } => {
                    let (key, path, meta) = (key.clone(), path.clone(), meta.clone());
                    with_retry(&retry, &label, move || {
                        if aborted.load(Ordering::SeqCst) {
                            return Err(aborted_err());
                        }
                        let body = std::fs::read(&path).map_err(|e| store_io_err(&path, e))?;
                        store.put(&key, &body, &meta)
                    })
                    .await
                }
                Operation::Delete { key } => {
                    let key = key.clone();
                    with_retry(&retry, &label, move || {
                        if aborted.load(Ordering::SeqCst) {
                            return Err(aborted_err());
                        }
                        store.delete(&key)
                    })
                    .await
                }
            };
            (operation, result)
        });
    }

    let mut completed = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (operation, result) =
            joined.map_err(|e| SyncError::Runtime(format!("publish task failed: {e}")))?;
        if let Err(StoreError::Auth(message)) = &result {
            aborted.store(true, Ordering::SeqCst);
            tasks.abort_all();
            return Err(SyncError::Auth(message.clone()));
        }
        completed.push((operation, result));
    }
    Ok(completed)
}

/// Execute `plan` and fold the outcome into `cache`.
///
/// An authentication failure aborts the run and leaves `cache` as it was
/// after the uploads, which the caller must then not persist.
pub async fn execute(
    store: Arc<dyn ObjectStore>,
    plan: &SyncPlan,
    groups: &GroupMatcher,
    options: &PublishOptions,
    cache: &mut ObjectHashes,
) -> Result<PublishReport, SyncError> {
    let mut report = PublishReport::default();
    let hashes: BTreeMap<&str, &str> = plan
        .uploads
        .iter()
        .map(|u| (u.object.key.as_str(), u.object.content_hash.as_str()))
        .collect();

    for skip in &plan.skips {
        tracing::debug!("skip {} ({:?})", skip.object.key, skip.reason);
        cache.insert(skip.object.key.clone(), skip.object.content_hash.clone());
        report.objects.push(ObjectReport {
            key: skip.object.key.clone(),
            outcome: ObjectOutcome::Skipped,
            error: None,
        });
    }

    let uploads = plan
        .uploads
        .iter()
        .map(|upload| Operation::Upload {
            key: upload.object.key.clone(),
            path: upload.object.path.clone(),
            kind: upload.kind,
            meta: ObjectMeta {
                content_hash: upload.object.content_hash.clone(),
                headers: object_headers(groups.headers(upload.object.group), &upload.object.key),
            },
        })
        .collect();
    let deletes = plan
        .deletes
        .iter()
        .map(|key| Operation::Delete { key: key.clone() })
        .collect();

    let aborted = Arc::new(AtomicBool::new(false));
    let mut completed = run_batch(&store, uploads, options, &aborted).await?;
    completed.extend(run_batch(&store, deletes, options, &aborted).await?);

    for (operation, result) in completed {
        let key = operation.key().to_string();
        let outcome = match (&operation, &result) {
            (_, Err(err)) => {
                tracing::warn!("{key}: {err}");
                if matches!(operation, Operation::Upload { .. }) {
                    cache.remove(&key);
                }
                ObjectOutcome::Failed
            }
            (Operation::Upload { kind, .. }, Ok(())) => {
                tracing::info!("uploaded {key}");
                if let Some(hash) = hashes.get(key.as_str()) {
                    cache.insert(key.clone(), hash.to_string());
                }
                match kind {
                    UploadKind::Create => ObjectOutcome::Created,
                    UploadKind::Update => ObjectOutcome::Updated,
                }
            }
            (Operation::Delete { .. }, Ok(())) => {
                tracing::info!("deleted {key}");
                cache.remove(&key);
                ObjectOutcome::Deleted
            }
        };
        report.objects.push(ObjectReport {
            key,
            outcome,
            error: result.err().map(|e| e.to_string()),
        });
    }

    report.objects.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 100)]
    #[case(2, 200)]
    #[case(3, 400)]
    #[case(20, 10_000)]
    fn backoff_doubles_and_is_capped(#[case] attempt: u32, #[case] millis: u64) {
        let retry = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(retry.delay(attempt), Duration::from_millis(millis));
    }

    #[test]
    fn group_content_type_wins() {
        let mut group = BTreeMap::new();
        group.insert("content-type".to_string(), "text/plain".to_string());
        group.insert("Cache-Control".to_string(), "no-cache".to_string());
        let headers = object_headers(Some(&group), "index.html");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("content-type").map(String::as_str), Some("text/plain"));
    }

    #[test]
    fn content_type_is_derived_without_group_headers() {
        let headers = object_headers(None, "css/a-0123456789.css");
        assert_eq!(
            headers.get("Content-Type").map(String::as_str),
            Some("text/css; charset=utf-8")
        );
    }

    #[tokio::test]
    async fn aborted_batch_never_reaches_the_store() {
        let memory = Arc::new(crate::store::MemoryStore::new());
        memory.insert_unhashed("old.css", b"x");
        let store: Arc<dyn ObjectStore> = memory.clone();
        let operations = vec![
            Operation::Upload {
                key: "a.css".into(),
                path: PathBuf::from("does-not-matter"),
                kind: UploadKind::Create,
                meta: ObjectMeta::default(),
            },
            Operation::Delete {
                key: "old.css".into(),
            },
        ];
        let aborted = Arc::new(AtomicBool::new(true));

        let completed = run_batch(&store, operations, &PublishOptions::default(), &aborted)
            .await
            .unwrap();
        assert_eq!(completed.len(), 2);
        assert!(completed
            .iter()
            .all(|(_, r)| matches!(r, Err(StoreError::Rejected(_)))));
        assert_eq!(memory.put_count() + memory.delete_count(), 0);
        assert_eq!(memory.keys(), vec!["old.css"]);
    }

    #[test]
    fn counts_by_outcome() {
        let report = PublishReport {
            objects: vec![
                ObjectReport {
                    key: "a".into(),
                    outcome: ObjectOutcome::Created,
                    error: None,
                },
                ObjectReport {
                    key: "b".into(),
                    outcome: ObjectOutcome::Failed,
                    error: Some("boom".into()),
                },
            ],
        };
        let counts = report.counts();
        assert_eq!(counts.created, 1);
        assert_eq!(counts.failed, 1);
        assert!(report.has_failures());
    }
}
