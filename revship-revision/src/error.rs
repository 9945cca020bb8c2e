//! Error types for revship-revision.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can abort a revision build.
#[derive(Debug, Error)]
pub enum RevisionError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source directory of the build does not exist.
    #[error("source directory not found: {path}")]
    MissingSource { path: PathBuf },

    /// Clearing the destination would delete the sources.
    #[error("refusing to clear {dist}: it contains the source directory {source_dir}")]
    UnsafeDestination { dist: PathBuf, source_dir: PathBuf },

    /// A selection pattern is not a valid glob.
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// The reference matcher could not be compiled.
    #[error("failed to build reference matcher: {0}")]
    Matcher(#[from] regex::Error),

    /// Text asset (CSS/HTML) is not valid UTF-8.
    #[error("{path} is not valid UTF-8")]
    Encoding { path: PathBuf },

    /// Manifest serialization error.
    #[error("manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory traversal failure.
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Convenience constructor for [`RevisionError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RevisionError {
    RevisionError::Io {
        path: path.into(),
        source,
    }
}
