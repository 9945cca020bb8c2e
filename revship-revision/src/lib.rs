//! # revship-revision
//!
//! Content-addressed asset revisioning.
//!
//! [`pipeline::run`] clears the destination, revisions static assets, CSS
//! (after rewriting its references) and JS, then rewrites HTML against the
//! accumulated [`RevisionManifest`].

pub mod error;
pub mod hasher;
pub mod manifest;
pub mod pipeline;
pub mod rewriter;
pub mod scan;

pub use error::RevisionError;
pub use manifest::{ManifestFile, RevisionManifest};
pub use pipeline::{BuildLayout, BuildReport, Stage, StageReport};
pub use rewriter::ReferenceRewriter;
