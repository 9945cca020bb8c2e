use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;

use super::{ObjectMeta, ObjectStore, RemoteObject};

/// An object held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub meta: ObjectMeta,
}

/// Error class injected by [`MemoryStore::fail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Auth,
    Rejected,
}

impl FailureKind {
    fn error(self, key: &str) -> StoreError {
        match self {
            FailureKind::Transient => StoreError::Transient(format!("injected failure for {key}")),
            FailureKind::Auth => StoreError::Auth(format!("injected failure for {key}")),
            FailureKind::Rejected => StoreError::Rejected(format!("injected failure for {key}")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Injected {
    kind: FailureKind,
    /// `None` fails forever.
    remaining: Option<u32>,
}

/// In-process store.
///
/// Listing reports the hash recorded at upload time, like [`super::DirStore`].
/// Objects seeded with [`MemoryStore::insert_unhashed`] report none, like S3.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failures: Mutex<HashMap<String, Injected>>,
    puts: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object as if uploaded with `content_hash`.
    pub fn insert(&self, key: &str, body: &[u8], content_hash: &str) {
        self.objects().insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                meta: ObjectMeta {
                    content_hash: content_hash.to_string(),
                    headers: BTreeMap::new(),
                },
            },
        );
    }

    /// Seed an object whose content hash the store cannot report.
    pub fn insert_unhashed(&self, key: &str, body: &[u8]) {
        self.insert(key, body, "");
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects().keys().cloned().collect()
    }

    /// Make calls touching `key` fail; `times: None` fails every call.
    pub fn fail(&self, key: &str, kind: FailureKind, times: Option<u32>) {
        self.failures().insert(
            key.to_string(),
            Injected {
                kind,
                remaining: times,
            },
        );
    }

    /// Number of successful puts.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of successful deletes.
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn failures(&self) -> MutexGuard<'_, HashMap<String, Injected>> {
        self.failures.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn injected(&self, key: &str) -> Result<(), StoreError> {
        let mut failures = self.failures();
        let Some(injected) = failures.get_mut(key) else {
            return Ok(());
        };
        match injected.remaining {
            Some(0) => Ok(()),
            Some(ref mut n) => {
                *n -= 1;
                Err(injected.kind.error(key))
            }
            None => Err(injected.kind.error(key)),
        }
    }
}

impl ObjectStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, StoreError> {
        self.injected(prefix)?;
        Ok(self
            .objects()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| RemoteObject {
                key: key.clone(),
                content_hash: Some(object.meta.content_hash.clone()).filter(|h| !h.is_empty()),
            })
            .collect())
    }

    fn put(&self, key: &str, body: &[u8], meta: &ObjectMeta) -> Result<(), StoreError> {
        self.injected(key)?;
        self.objects().insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                meta: meta.clone(),
            },
        );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.injected(key)?;
        self.objects().remove(key);
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
