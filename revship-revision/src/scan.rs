//! Source selection: walk a directory and keep files matching glob patterns.
//!
//! Patterns are matched against `/`-separated paths relative to the walked
//! root; `*` stays within one segment and `**` spans segments.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::RevisionError;

/// A file selected for a build pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the walked root, `/`-separated.
    pub relative: String,
    pub path: PathBuf,
}

/// Compile a single glob with path-aware `*` semantics.
pub fn glob(pattern: &str) -> Result<Glob, RevisionError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|source| RevisionError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Compile `patterns` into one set.
pub fn glob_set<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet, RevisionError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(glob(pattern.as_ref())?);
    }
    builder.build().map_err(|source| RevisionError::Pattern {
        pattern: patterns
            .iter()
            .map(|p| p.as_ref())
            .collect::<Vec<_>>()
            .join(", "),
        source,
    })
}

/// Every regular file under `root`, sorted by relative path.
pub fn walk(root: &Path) -> Result<Vec<SourceFile>, RevisionError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|source| RevisionError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        files.push(SourceFile {
            relative: relative_string(relative),
            path: entry.path().to_path_buf(),
        });
    }
    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Files under `root` matching any of `patterns`.
pub fn select<S: AsRef<str>>(root: &Path, patterns: &[S]) -> Result<Vec<SourceFile>, RevisionError> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let set = glob_set(patterns)?;
    Ok(walk(root)?
        .into_iter()
        .filter(|file| set.is_match(&file.relative))
        .collect())
}

fn relative_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
