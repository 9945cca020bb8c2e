//! Ordered multi-pass revision build.
//!
//! ```text
//! ClearDestination
//!   └─ RevisionStaticAssets            writes the manifest
//!        ├─ RevisionAndRewriteCss      merges into the manifest  ┐ concurrent
//!        └─ RevisionJs                 merges into the manifest  ┘
//!             └─ RewriteHtml           reads the final manifest
//! ```
//!
//! Every pass after the first reads the manifest from disk; a pass is
//! complete once its entries are persisted. Any error aborts the build.

use std::fmt;
use std::path::{Path, PathBuf};

use revship_core::BuildConfig;

use crate::error::{io_err, RevisionError};
use crate::hasher::{content_token, revisioned_name};
use crate::manifest::{ManifestFile, RevisionManifest};
use crate::rewriter::ReferenceRewriter;
use crate::scan::{self, SourceFile};

// ---------------------------------------------------------------------------
// Layout and report types
// ---------------------------------------------------------------------------

/// Absolute locations and pass selections of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    pub source_dir: PathBuf,
    pub dist_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub static_assets: Vec<String>,
    pub css: Vec<String>,
    pub js: Vec<String>,
    pub html: Vec<String>,
}

impl From<&BuildConfig> for BuildLayout {
    fn from(config: &BuildConfig) -> Self {
        Self {
            source_dir: config.source_dir.clone(),
            dist_dir: config.dist_dir.clone(),
            manifest_path: config.manifest_path(),
            static_assets: config.static_assets.clone(),
            css: config.css.clone(),
            js: config.js.clone(),
            html: config.html.clone(),
        }
    }
}

/// Build passes, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ClearDestination,
    RevisionStaticAssets,
    RevisionAndRewriteCss,
    RevisionJs,
    RewriteHtml,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ClearDestination => "clear-destination",
            Stage::RevisionStaticAssets => "revision-assets",
            Stage::RevisionAndRewriteCss => "revreplace-css",
            Stage::RevisionJs => "revision-js",
            Stage::RewriteHtml => "revreplace-html",
        };
        f.write_str(name)
    }
}

/// A file written by a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltFile {
    /// Path relative to the source directory.
    pub original: String,
    /// Path relative to the destination directory.
    pub written: String,
    /// References rewritten inside the file (CSS and HTML passes).
    pub rewritten_refs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub files: Vec<BuiltFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub stages: Vec<StageReport>,
    pub manifest: RevisionManifest,
}

impl BuildReport {
    pub fn files_written(&self) -> usize {
        self.stages.iter().map(|s| s.files.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Run every pass in order.
pub fn run(layout: &BuildLayout) -> Result<BuildReport, RevisionError> {
    if !layout.source_dir.is_dir() {
        return Err(RevisionError::MissingSource {
            path: layout.source_dir.clone(),
        });
    }

    let cleared = clear_destination(layout)?;
    let manifest_file = ManifestFile::new(&layout.manifest_path);

    let statics = revision_static_assets(layout, &manifest_file)?;
    let (css, js) = rayon::join(
        || revision_and_rewrite_css(layout, &manifest_file),
        || revision_js(layout, &manifest_file),
    );
    let css = css?;
    let js = js?;
    let html = rewrite_html(layout, &manifest_file)?;

    let manifest = manifest_file.load()?;
    tracing::info!(
        "build complete: {} manifest entries in {}",
        manifest.len(),
        manifest_file.path().display()
    );

    Ok(BuildReport {
        stages: vec![cleared, statics, css, js, html],
        manifest,
    })
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

/// Remove the destination directory if it exists.
pub fn clear_destination(layout: &BuildLayout) -> Result<StageReport, RevisionError> {
    let dist = &layout.dist_dir;
    if dist.exists() {
        let dist_abs = dist.canonicalize().map_err(|e| io_err(dist, e))?;
        let source_abs = layout
            .source_dir
            .canonicalize()
            .map_err(|e| io_err(&layout.source_dir, e))?;
        if source_abs.starts_with(&dist_abs) {
            return Err(RevisionError::UnsafeDestination {
                dist: dist.clone(),
                source_dir: layout.source_dir.clone(),
            });
        }
        std::fs::remove_dir_all(dist).map_err(|e| io_err(dist, e))?;
        tracing::info!("cleared {}", dist.display());
    }
    Ok(StageReport {
        stage: Stage::ClearDestination,
        files: Vec::new(),
    })
}

/// Content-address fonts, images and built JS; overwrite the manifest.
pub fn revision_static_assets(
    layout: &BuildLayout,
    manifest_file: &ManifestFile,
) -> Result<StageReport, RevisionError> {
    let sources = scan::select(&layout.source_dir, &layout.static_assets)?;
    let (files, entries) = revision_files(layout, &sources)?;
    manifest_file.save(&entries)?;
    Ok(StageReport {
        stage: Stage::RevisionStaticAssets,
        files,
    })
}

/// Rewrite CSS references against the persisted manifest, then
/// content-address the rewritten CSS and merge its entries.
pub fn revision_and_rewrite_css(
    layout: &BuildLayout,
    manifest_file: &ManifestFile,
) -> Result<StageReport, RevisionError> {
    let rewriter = ReferenceRewriter::new(&manifest_file.load()?)?;
    let sources = scan::select(&layout.source_dir, &layout.css)?;

    let mut files = Vec::with_capacity(sources.len());
    let mut entries = RevisionManifest::new();
    for source in &sources {
        let text = read_text(&source.path)?;
        let rewrite = rewriter.rewrite(&text);
        let token = content_token(rewrite.text.as_bytes());
        let written = revisioned_name(&source.relative, &token);
        write_output(&layout.dist_dir, &written, rewrite.text.as_bytes())?;
        tracing::info!(
            "revisioned {} -> {} ({} refs)",
            source.relative,
            written,
            rewrite.replaced
        );

        entries.insert(source.relative.clone(), written.clone());
        files.push(BuiltFile {
            original: source.relative.clone(),
            written,
            rewritten_refs: rewrite.replaced,
        });
    }

    manifest_file.merge(&entries)?;
    Ok(StageReport {
        stage: Stage::RevisionAndRewriteCss,
        files,
    })
}

/// Content-address JS bundles and merge their entries.
pub fn revision_js(
    layout: &BuildLayout,
    manifest_file: &ManifestFile,
) -> Result<StageReport, RevisionError> {
    let sources = scan::select(&layout.source_dir, &layout.js)?;
    let (files, entries) = revision_files(layout, &sources)?;
    manifest_file.merge(&entries)?;
    Ok(StageReport {
        stage: Stage::RevisionJs,
        files,
    })
}

/// Rewrite HTML references against the final manifest. HTML keeps its name.
pub fn rewrite_html(
    layout: &BuildLayout,
    manifest_file: &ManifestFile,
) -> Result<StageReport, RevisionError> {
    let rewriter = ReferenceRewriter::new(&manifest_file.load()?)?;
    let sources = scan::select(&layout.source_dir, &layout.html)?;

    let mut files = Vec::with_capacity(sources.len());
    for source in &sources {
        let text = read_text(&source.path)?;
        let rewrite = rewriter.rewrite(&text);
        write_output(&layout.dist_dir, &source.relative, rewrite.text.as_bytes())?;
        tracing::info!("rewrote {} ({} refs)", source.relative, rewrite.replaced);
        files.push(BuiltFile {
            original: source.relative.clone(),
            written: source.relative.clone(),
            rewritten_refs: rewrite.replaced,
        });
    }

    Ok(StageReport {
        stage: Stage::RewriteHtml,
        files,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn revision_files(
    layout: &BuildLayout,
    sources: &[SourceFile],
) -> Result<(Vec<BuiltFile>, RevisionManifest), RevisionError> {
    let mut files = Vec::with_capacity(sources.len());
    let mut entries = RevisionManifest::new();
    for source in sources {
        let bytes = std::fs::read(&source.path).map_err(|e| io_err(&source.path, e))?;
        let written = revisioned_name(&source.relative, &content_token(&bytes));
        write_output(&layout.dist_dir, &written, &bytes)?;
        tracing::info!("revisioned {} -> {}", source.relative, written);

        entries.insert(source.relative.clone(), written.clone());
        files.push(BuiltFile {
            original: source.relative.clone(),
            written,
            rewritten_refs: 0,
        });
    }
    Ok((files, entries))
}

fn read_text(path: &Path) -> Result<String, RevisionError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    String::from_utf8(bytes).map_err(|_| RevisionError::Encoding {
        path: path.to_path_buf(),
    })
}

fn write_output(dist: &Path, relative: &str, bytes: &[u8]) -> Result<(), RevisionError> {
    let path = dist.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::fs::write(&path, bytes).map_err(|e| io_err(&path, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
