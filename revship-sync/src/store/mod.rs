//! Remote object stores.
//!
//! Every store is blocking and shareable across threads; the publisher drives
//! them from tokio's blocking pool.

use std::collections::BTreeMap;

use crate::error::StoreError;

mod dir;
mod memory;
mod s3;
mod sigv4;
mod xml;

pub use dir::DirStore;
pub use memory::{FailureKind, MemoryStore, StoredObject};
pub use s3::S3Store;

/// User metadata header carrying the content hash on S3.
pub const CONTENT_HASH_HEADER: &str = "x-amz-meta-content-sha256";

/// An object as reported by [`ObjectStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    /// Content hash recorded at upload time, when the store can report it.
    pub content_hash: Option<String>,
}

/// Metadata sent along with an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    pub content_hash: String,
    /// HTTP headers, including `Content-Type`.
    pub headers: BTreeMap<String, String>,
}

pub trait ObjectStore: Send + Sync {
    /// Human-readable destination, for logs and reports.
    fn describe(&self) -> String;

    /// Every object whose key starts with `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, StoreError>;

    fn put(&self, key: &str, body: &[u8], meta: &ObjectMeta) -> Result<(), StoreError>;

    /// Delete `key`; deleting an absent key succeeds.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// `Content-Type` for a key, by extension.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "pdf" => "application/pdf",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Reject keys that could escape a key space rooted at a directory.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|segment| segment == ".." || segment == ".")
    {
        return Err(StoreError::Rejected(format!("invalid object key '{key}'")));
    }
    Ok(())
}
