use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{store_io_err, StoreError};

use super::{validate_key, ObjectMeta, ObjectStore, RemoteObject};

/// Directory under the store root holding per-object metadata.
pub const META_DIR: &str = ".revship-meta";

/// Staging area for atomic writes, inside [`META_DIR`] so that no
/// temporary file is ever listed as an object.
const STAGING_DIR: &str = "staging";

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_hash: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

/// Objects as plain files under a root directory.
///
/// Headers and the content hash live in `<root>/.revship-meta/<key>.json`.
/// Writes are staged under `<root>/.revship-meta/staging/` and renamed into
/// place.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.root.join(META_DIR).join(format!("{key}.json"))
    }

    fn staging_path(&self, key: &str, kind: &str) -> PathBuf {
        let name = hex::encode(Sha256::digest(key.as_bytes()));
        self.root
            .join(META_DIR)
            .join(STAGING_DIR)
            .join(format!("{name}.{kind}"))
    }

    /// Headers recorded for `key` at upload time.
    pub fn headers(&self, key: &str) -> Result<Option<BTreeMap<String, String>>, StoreError> {
        validate_key(key)?;
        Ok(self.read_sidecar(key)?.map(|sidecar| sidecar.headers))
    }

    fn read_sidecar(&self, key: &str) -> Result<Option<Sidecar>, StoreError> {
        let path = self.sidecar_path(key);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(store_io_err(&path, err)),
        };
        match serde_json::from_str(&contents) {
            Ok(sidecar) => Ok(Some(sidecar)),
            Err(err) => {
                tracing::warn!("ignoring corrupt metadata {}: {err}", path.display());
                Ok(None)
            }
        }
    }
}

fn write_atomic(path: &Path, tmp: &Path, contents: &[u8]) -> Result<(), StoreError> {
    for dir in [path.parent(), tmp.parent()].into_iter().flatten() {
        std::fs::create_dir_all(dir).map_err(|e| store_io_err(dir, e))?;
    }
    if let Err(e) = std::fs::write(tmp, contents) {
        let _ = std::fs::remove_file(tmp);
        return Err(store_io_err(tmp, e));
    }
    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(store_io_err(path, e));
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(store_io_err(path, err)),
    }
}

impl ObjectStore for DirStore {
    fn describe(&self) -> String {
        format!("dir://{}", self.root.display())
    }

    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut objects = Vec::new();
        let walker = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| entry.depth() != 1 || entry.file_name() != META_DIR);
        for entry in walker {
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(&self.root).to_path_buf();
                store_io_err(path, std::io::Error::other(err.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !key.starts_with(prefix) {
                continue;
            }
            let content_hash = self.read_sidecar(&key)?.map(|s| s.content_hash);
            objects.push(RemoteObject { key, content_hash });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn put(&self, key: &str, body: &[u8], meta: &ObjectMeta) -> Result<(), StoreError> {
        validate_key(key)?;
        write_atomic(&self.object_path(key), &self.staging_path(key, "object"), body)?;
        let sidecar = Sidecar {
            content_hash: meta.content_hash.clone(),
            headers: meta.headers.clone(),
        };
        let json = serde_json::to_vec_pretty(&sidecar)
            .map_err(|e| StoreError::Protocol(format!("cannot encode metadata for {key}: {e}")))?;
        write_atomic(&self.sidecar_path(key), &self.staging_path(key, "meta"), &json)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        remove_if_present(&self.object_path(key))?;
        remove_if_present(&self.sidecar_path(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta(hash: &str) -> ObjectMeta {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "text/css".to_string());
        ObjectMeta {
            content_hash: hash.to_string(),
            headers,
        }
    }

    #[test]
    fn put_list_delete() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path().join("bucket"));
        assert!(store.list("").unwrap().is_empty());

        store.put("branch/foo/css/a.css", b"a{}", &meta("h1")).unwrap();
        store.put("index.html", b"<html>", &meta("h2")).unwrap();

        let listed = store.list("").unwrap();
        let keys: Vec<&str> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["branch/foo/css/a.css", "index.html"]);
        assert_eq!(listed[0].content_hash.as_deref(), Some("h1"));
        assert_eq!(store.list("branch/").unwrap().len(), 1);
        assert_eq!(
            std::fs::read(tmp.path().join("bucket/branch/foo/css/a.css")).unwrap(),
            b"a{}"
        );
        assert_eq!(
            store.headers("index.html").unwrap().unwrap().get("Content-Type").map(String::as_str),
            Some("text/css")
        );

        store.delete("index.html").unwrap();
        store.delete("index.html").unwrap();
        assert_eq!(store.list("").unwrap().len(), 1);
    }

    #[test]
    fn files_without_sidecar_report_no_hash() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("stray.txt"), "x").unwrap();
        let store = DirStore::new(tmp.path());
        let listed = store.list("").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content_hash, None);
    }

    #[test]
    fn objects_named_tmp_are_listed_and_staging_is_not() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        store.put("backup.tmp", b"x", &meta("h1")).unwrap();
        store.put("a.css", b"a{}", &meta("h2")).unwrap();

        let keys: Vec<String> = store.list("").unwrap().into_iter().map(|o| o.key).collect();
        assert_eq!(keys, vec!["a.css", "backup.tmp"]);
        let staged = std::fs::read_dir(tmp.path().join(META_DIR).join(STAGING_DIR))
            .unwrap()
            .count();
        assert_eq!(staged, 0);

        store.delete("backup.tmp").unwrap();
        assert_eq!(store.list("").unwrap().len(), 1);
    }

    #[test]
    fn failed_staging_write_leaves_target_untouched() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("bucket/a.css");
        let staged = tmp.path().join("staging/a.object");
        // A directory in place of the staged file makes the write fail.
        std::fs::create_dir_all(&staged).unwrap();
        std::fs::write(staged.join("keep"), "x").unwrap();

        let err = write_atomic(&target, &staged, b"a{}").unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }), "got: {err}");
        assert!(!target.exists());
    }

    #[test]
    fn escaping_keys_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let err = store.put("../outside", b"x", &meta("h")).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }
}
