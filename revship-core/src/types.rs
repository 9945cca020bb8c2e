//! Domain types shared by the revision and sync crates.
//!
//! Relative paths and remote keys are plain `String`s with `/` separators;
//! filesystem locations use `PathBuf`.

use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};

/// Key prefix under which non-canonical branches are published.
pub const BRANCH_ROOT: &str = "branch/";

/// Bytes escaped when a branch name becomes one key segment. `%` is escaped
/// too so distinct names never share a segment.
const SEGMENT: &AsciiSet = &CONTROLS.add(b'%').add(b'/').add(b'\\');

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed VCS branch name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchName(pub String);

impl BranchName {
    /// Branch name as a single key segment: `feature/login` → `feature%2Flogin`.
    ///
    /// Distinct names give distinct segments.
    pub fn slug(&self) -> String {
        let slug = utf8_percent_encode(&self.0, SEGMENT).to_string();
        match slug.as_str() {
            "." | ".." => slug.replace('.', "%2E"),
            _ => slug,
        }
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for BranchName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BranchName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A strongly-typed deployment environment name (`development`, `production`, …).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentName(pub String);

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for EnvironmentName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EnvironmentName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Default for EnvironmentName {
    fn default() -> Self {
        Self::from("development")
    }
}

// ---------------------------------------------------------------------------
// File groups
// ---------------------------------------------------------------------------

/// One entry of the file-group declaration (`publish-files.json`).
///
/// Filters are globs relative to the publish directory; a leading `!` marks
/// an exclude.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileGroup {
    pub filter: Vec<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl FileGroup {
    pub fn new<I, S>(filter: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filter: filter.into_iter().map(Into::into).collect(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Sync target
// ---------------------------------------------------------------------------

/// Which branch / environment publishes to the store root.
///
/// The two predicates are independent; a target is canonical when either
/// one matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalPolicy {
    pub branch: Option<BranchName>,
    pub environment: Option<EnvironmentName>,
}

impl Default for CanonicalPolicy {
    fn default() -> Self {
        Self {
            branch: Some(BranchName::from("master")),
            environment: None,
        }
    }
}

impl CanonicalPolicy {
    pub fn is_canonical(&self, branch: &BranchName, environment: &EnvironmentName) -> bool {
        self.branch.as_ref() == Some(branch) || self.environment.as_ref() == Some(environment)
    }
}

/// Branch-scoped destination of a publish run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncTarget {
    pub branch: BranchName,
    pub is_canonical: bool,
    /// `""` for the canonical branch, `branch/<slug>/` otherwise.
    pub destination_prefix: String,
}

impl SyncTarget {
    pub fn resolve(
        branch: BranchName,
        environment: &EnvironmentName,
        policy: &CanonicalPolicy,
    ) -> Self {
        let is_canonical = policy.is_canonical(&branch, environment);
        let destination_prefix = if is_canonical {
            String::new()
        } else {
            format!("{BRANCH_ROOT}{}/", branch.slug())
        };
        Self {
            branch,
            is_canonical,
            destination_prefix,
        }
    }

    /// Remote key for a path relative to the publish directory.
    pub fn key_for(&self, relative: &str) -> String {
        format!("{}{}", self.destination_prefix, relative.trim_start_matches('/'))
    }

    /// Whether a remote key may be deleted by this target.
    ///
    /// The canonical prefix is empty, so the canonical target owns the root
    /// and every `branch/*/` deployment.
    pub fn owns(&self, key: &str) -> bool {
        key.starts_with(&self.destination_prefix)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> EnvironmentName {
        EnvironmentName::from("staging")
    }

    #[test]
    fn newtype_display() {
        assert_eq!(BranchName::from("master").to_string(), "master");
        assert_eq!(EnvironmentName::from("production").to_string(), "production");
    }

    #[test]
    fn master_publishes_to_root() {
        let target = SyncTarget::resolve(BranchName::from("master"), &env(), &Default::default());
        assert!(target.is_canonical);
        assert_eq!(target.destination_prefix, "");
        assert_eq!(target.key_for("css/a.css"), "css/a.css");
    }

    #[test]
    fn feature_branch_is_confined_to_its_prefix() {
        let target = SyncTarget::resolve(BranchName::from("foo"), &env(), &Default::default());
        assert!(!target.is_canonical);
        assert_eq!(target.key_for("css/a.css"), "branch/foo/css/a.css");
        assert!(target.owns("branch/foo/css/old.css"));
        assert!(!target.owns("branch/bar/x.js"));
        assert!(!target.owns("branch/foobar/x.js"));
        assert!(!target.owns("index.html"));
    }

    #[test]
    fn nested_branch_names_are_escaped() {
        let target = SyncTarget::resolve(
            BranchName::from("feature/login"),
            &env(),
            &Default::default(),
        );
        assert_eq!(target.destination_prefix, "branch/feature%2Flogin/");
    }

    #[test]
    fn similar_branch_names_get_disjoint_prefixes() {
        let names = ["feature/x", "feature-x", "feature%2Fx", "feature\\x", ".."];
        let targets: Vec<SyncTarget> = names
            .iter()
            .map(|n| SyncTarget::resolve(BranchName::from(*n), &env(), &Default::default()))
            .collect();
        for (i, a) in targets.iter().enumerate() {
            for (j, b) in targets.iter().enumerate() {
                if i != j {
                    assert!(
                        !b.owns(&a.key_for("index.html")),
                        "{} must not own keys of {}",
                        b.branch,
                        a.branch
                    );
                }
            }
        }
        assert_eq!(targets[4].destination_prefix, "branch/%2E%2E/");
    }

    #[test]
    fn canonical_environment_is_independent_of_branch() {
        let policy = CanonicalPolicy {
            branch: Some(BranchName::from("main")),
            environment: Some(EnvironmentName::from("production")),
        };
        let by_env = SyncTarget::resolve(
            BranchName::from("hotfix"),
            &EnvironmentName::from("production"),
            &policy,
        );
        assert!(by_env.is_canonical);

        let by_branch = SyncTarget::resolve(BranchName::from("main"), &env(), &policy);
        assert!(by_branch.is_canonical);

        let neither = SyncTarget::resolve(BranchName::from("master"), &env(), &policy);
        assert!(!neither.is_canonical);
    }

    #[test]
    fn canonical_owns_branch_deployments() {
        let target = SyncTarget::resolve(BranchName::from("master"), &env(), &Default::default());
        assert!(target.owns("branch/foo/app.js"));
        assert!(target.owns("index.html"));
    }

    #[test]
    fn file_group_deserializes_without_headers() {
        let groups: Vec<FileGroup> =
            serde_json::from_str(r#"[{"filter": ["**/*.html"]}]"#).expect("parse");
        assert_eq!(groups[0].filter, vec!["**/*.html".to_string()]);
        assert!(groups[0].headers.is_empty());
    }
}
