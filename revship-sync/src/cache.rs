//! Upload cache: remote key → content hash of the last successful upload.
//!
//! One JSON document per `{environment, branch}` at
//! `<cache_dir>/cache/<environment>_<branch>.json`, both names
//! percent-encoded so that `_` only ever separates them. Writes use the
//! atomic `.tmp` + rename pattern. A missing or unreadable document is an
//! empty cache; the worst outcome is a redundant upload.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use revship_core::{BranchName, EnvironmentName};

use crate::error::{io_err, SyncError};

const FILE_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'-');

/// Remote key → content hash.
pub type ObjectHashes = BTreeMap<String, String>;

/// On-disk cache payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadCache {
    pub synced_at: DateTime<Utc>,
    pub objects: ObjectHashes,
}

impl UploadCache {
    pub fn empty() -> Self {
        Self {
            synced_at: Utc::now(),
            objects: ObjectHashes::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UploadCacheCompat {
    Structured(StructuredCompat),
    Flat(ObjectHashes),
}

#[derive(Debug, Deserialize)]
struct StructuredCompat {
    synced_at: Option<DateTime<Utc>>,
    objects: ObjectHashes,
}

/// Path of the cache document for one environment and branch.
pub fn cache_path_at(cache_dir: &Path, environment: &EnvironmentName, branch: &BranchName) -> PathBuf {
    cache_dir.join("cache").join(format!(
        "{}_{}.json",
        file_component(&environment.0),
        file_component(&branch.0)
    ))
}

/// Load the cache; missing or corrupt documents yield an empty cache.
pub fn load_at(
    cache_dir: &Path,
    environment: &EnvironmentName,
    branch: &BranchName,
) -> Result<UploadCache, SyncError> {
    let path = cache_path_at(cache_dir, environment, branch);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(UploadCache::empty()),
        Err(err) => return Err(io_err(&path, err)),
    };
    match serde_json::from_str::<UploadCacheCompat>(&contents) {
        Ok(UploadCacheCompat::Structured(cache)) => Ok(UploadCache {
            synced_at: cache.synced_at.unwrap_or_else(Utc::now),
            objects: cache.objects,
        }),
        Ok(UploadCacheCompat::Flat(objects)) => Ok(UploadCache {
            synced_at: Utc::now(),
            objects,
        }),
        Err(err) => {
            tracing::warn!("ignoring corrupt upload cache {}: {err}", path.display());
            Ok(UploadCache::empty())
        }
    }
}

/// Save the cache atomically.
pub fn save_at(
    cache_dir: &Path,
    environment: &EnvironmentName,
    branch: &BranchName,
    cache: &UploadCache,
) -> Result<(), SyncError> {
    let path = cache_path_at(cache_dir, environment, branch);
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid cache path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(cache)?;
    let tmp = path.with_extension("json.tmp");
    if let Err(e) = std::fs::write(&tmp, &json) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&tmp, e));
    }
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}

fn file_component(name: &str) -> String {
    utf8_percent_encode(name, FILE_COMPONENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env() -> EnvironmentName {
        EnvironmentName::from("production")
    }

    #[test]
    fn empty_cache_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        let cache = load_at(tmp.path(), &env(), &BranchName::from("master")).unwrap();
        assert!(cache.objects.is_empty());
    }

    #[test]
    fn path_is_keyed_by_environment_and_branch() {
        let path = cache_path_at(
            Path::new("/p/.revship"),
            &env(),
            &BranchName::from("feature/login"),
        );
        assert_eq!(
            path,
            PathBuf::from("/p/.revship/cache/production_feature%2Flogin.json")
        );
    }

    #[test]
    fn roundtrip_save_load() {
        let tmp = TempDir::new().unwrap();
        let branch = BranchName::from("foo");
        let mut cache = UploadCache::empty();
        cache
            .objects
            .insert("branch/foo/css/a.css".to_string(), "deadbeef".to_string());

        save_at(tmp.path(), &env(), &branch, &cache).unwrap();
        let loaded = load_at(tmp.path(), &env(), &branch).unwrap();
        assert_eq!(loaded.objects, cache.objects);
        assert!(
            !cache_path_at(tmp.path(), &env(), &branch)
                .with_extension("json.tmp")
                .exists(),
            "tmp file should be removed after atomic rename"
        );
    }

    #[test]
    fn environments_do_not_share_a_cache() {
        let tmp = TempDir::new().unwrap();
        let branch = BranchName::from("master");
        let mut cache = UploadCache::empty();
        cache.objects.insert("a.css".to_string(), "1".to_string());
        save_at(tmp.path(), &env(), &branch, &cache).unwrap();

        let staging = load_at(tmp.path(), &EnvironmentName::from("staging"), &branch).unwrap();
        assert!(staging.objects.is_empty());
    }

    #[test]
    fn distinct_names_never_share_a_cache_file() {
        let pairs = [
            ("production", "feature/x"),
            ("production", "feature-x"),
            ("production", "feature_x"),
            ("production_feature", "x"),
        ];
        let paths: std::collections::BTreeSet<PathBuf> = pairs
            .iter()
            .map(|(e, b)| {
                cache_path_at(
                    Path::new("/c"),
                    &EnvironmentName::from(*e),
                    &BranchName::from(*b),
                )
            })
            .collect();
        assert_eq!(paths.len(), pairs.len());
    }

    #[test]
    fn failed_save_leaves_no_tmp_file() {
        let tmp = TempDir::new().unwrap();
        let branch = BranchName::from("master");
        let path = cache_path_at(tmp.path(), &env(), &branch);
        // A directory at the destination makes the rename fail.
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let err = save_at(tmp.path(), &env(), &branch, &UploadCache::empty()).unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }), "got: {err}");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_cache_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let branch = BranchName::from("master");
        let path = cache_path_at(tmp.path(), &env(), &branch);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[1, 2").unwrap();

        let cache = load_at(tmp.path(), &env(), &branch).unwrap();
        assert!(cache.objects.is_empty());
    }

    #[test]
    fn flat_map_is_accepted() {
        let tmp = TempDir::new().unwrap();
        let branch = BranchName::from("master");
        let path = cache_path_at(tmp.path(), &env(), &branch);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"index.html":"cafebabe"}"#).unwrap();

        let cache = load_at(tmp.path(), &env(), &branch).unwrap();
        assert_eq!(
            cache.objects.get("index.html").map(String::as_str),
            Some("cafebabe")
        );
    }
}
