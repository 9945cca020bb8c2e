//! Error types for revship-sync.

use std::path::PathBuf;

use thiserror::Error;

use revship_core::ConfigError;
use revship_revision::RevisionError;

/// Failure of a single remote store call.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Credentials rejected; retrying cannot help.
    #[error("access denied: {0}")]
    Auth(String),

    /// Network failure, throttling or a 5xx response.
    #[error("transient store failure: {0}")]
    Transient(String),

    /// The store refused this particular request.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Local I/O while serving the call (reading the upload body, dir store).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store answered with something we cannot interpret.
    #[error("unexpected store response: {0}")]
    Protocol(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, StoreError::Auth(_))
    }
}

/// All errors that abort a plan or publish run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Glob compilation or local tree traversal.
    #[error("{0}")]
    Revision(#[from] RevisionError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (upload cache).
    #[error("upload cache JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store rejected our credentials; the publish was aborted.
    #[error("remote store rejected credentials: {0}")]
    Auth(String),

    /// A store call every publish depends on (listing) failed.
    #[error("failed to {operation} remote objects: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("async runtime error: {0}")]
    Runtime(String),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn store_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
