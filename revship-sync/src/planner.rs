//! Sync planning: decide per key whether to create, update, skip or delete.
//!
//! Pure function of the local tree, the remote listing and the upload cache;
//! no store calls happen here.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Serialize;

use revship_core::SyncTarget;

use crate::cache::ObjectHashes;
use crate::store::RemoteObject;

/// A local file selected for publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalObject {
    /// Remote key: destination prefix + relative path.
    pub key: String,
    /// Path relative to the publish directory.
    pub relative: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub content_hash: String,
    /// Index of the owning file group.
    pub group: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    /// Absent remotely.
    Create,
    /// Present remotely with a different or unknown hash.
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipReason {
    /// The cache recorded this hash and the object still exists.
    Cached,
    /// The store reported the same hash.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedUpload {
    pub object: LocalObject,
    pub kind: UploadKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedSkip {
    pub object: LocalObject,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub uploads: Vec<PlannedUpload>,
    pub skips: Vec<PlannedSkip>,
    /// Remote keys to delete, sorted.
    pub deletes: Vec<String>,
    /// Orphaned keys kept because they fall under a protected prefix.
    pub protected: Vec<String>,
}

impl SyncPlan {
    pub fn is_noop(&self) -> bool {
        self.uploads.is_empty() && self.deletes.is_empty()
    }
}

/// Compute the plan for `target`.
///
/// Remote objects outside the target's prefix are ignored entirely, so a
/// non-canonical branch can never touch another deployment.
pub fn plan(
    target: &SyncTarget,
    local: Vec<LocalObject>,
    remote: &[RemoteObject],
    cache: &ObjectHashes,
    protected_prefixes: &[String],
) -> SyncPlan {
    let remote: BTreeMap<&str, Option<&str>> = remote
        .iter()
        .filter(|object| target.owns(&object.key))
        .map(|object| (object.key.as_str(), object.content_hash.as_deref()))
        .collect();
    let local_keys: BTreeSet<String> = local.iter().map(|o| o.key.clone()).collect();

    let mut plan = SyncPlan::default();
    for object in local {
        match remote.get(object.key.as_str()) {
            None => plan.uploads.push(PlannedUpload {
                object,
                kind: UploadKind::Create,
            }),
            Some(remote_hash) => {
                let reason = if *remote_hash == Some(object.content_hash.as_str()) {
                    Some(SkipReason::Unchanged)
                } else if remote_hash.is_none()
                    && cache.get(&object.key) == Some(&object.content_hash)
                {
                    Some(SkipReason::Cached)
                } else {
                    None
                };
                match reason {
                    Some(reason) => plan.skips.push(PlannedSkip { object, reason }),
                    None => plan.uploads.push(PlannedUpload {
                        object,
                        kind: UploadKind::Update,
                    }),
                }
            }
        }
    }

    for key in remote.keys().filter(|key| !local_keys.contains(**key)) {
        if protected_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && key.starts_with(prefix.as_str()))
        {
            plan.protected.push(key.to_string());
        } else {
            plan.deletes.push(key.to_string());
        }
    }
    plan
}
