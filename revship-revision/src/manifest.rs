//! Revision manifest: original relative path → revisioned relative path.
//!
//! The on-disk manifest is the hand-off point between build passes: a pass
//! only sees entries of earlier passes once they are persisted. Writes use the
//! `.tmp` + rename pattern, and read-merge-write cycles are serialised by the
//! lock held in [`ManifestFile`].

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, RevisionError};

/// In-memory manifest. Keys are unique; merging is right-biased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionManifest(BTreeMap<String, String>);

impl RevisionManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, original: impl Into<String>, revisioned: impl Into<String>) {
        self.0.insert(original.into(), revisioned.into());
    }

    /// Merge `other` into `self`; entries of `other` win on collision.
    pub fn merge(&mut self, other: &RevisionManifest) {
        for (original, revisioned) in &other.0 {
            self.0.insert(original.clone(), revisioned.clone());
        }
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.0.get(original).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RevisionManifest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Handle to the manifest file shared by the passes of one build.
#[derive(Debug)]
pub struct ManifestFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ManifestFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the manifest.
    ///
    /// A missing file is an empty manifest. A corrupt file is logged and also
    /// treated as empty: the worst outcome is a reference left unrewritten,
    /// never a wrong one.
    pub fn load(&self) -> Result<RevisionManifest, RevisionError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.load_unlocked()
    }

    /// Replace the manifest on disk with `manifest`.
    pub fn save(&self, manifest: &RevisionManifest) -> Result<(), RevisionError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.save_unlocked(manifest)
    }

    /// Merge `entries` into the on-disk manifest and return the merged result.
    pub fn merge(&self, entries: &RevisionManifest) -> Result<RevisionManifest, RevisionError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut current = self.load_unlocked()?;
        current.merge(entries);
        self.save_unlocked(&current)?;
        Ok(current)
    }

    fn load_unlocked(&self) -> Result<RevisionManifest, RevisionError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(RevisionManifest::new()),
            Err(err) => return Err(io_err(&self.path, err)),
        };
        match serde_json::from_str(&contents) {
            Ok(manifest) => Ok(manifest),
            Err(err) => {
                tracing::warn!(
                    "ignoring corrupt manifest {}: {err}",
                    self.path.display()
                );
                Ok(RevisionManifest::new())
            }
        }
    }

    fn save_unlocked(&self, manifest: &RevisionManifest) -> Result<(), RevisionError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let json = serde_json::to_string_pretty(manifest)?;
        let tmp = self.path.with_extension("json.tmp");
        if let Err(e) = std::fs::write(&tmp, json) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&tmp, e));
        }
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&self.path, e));
        }
        Ok(())
    }
}
