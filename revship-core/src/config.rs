//! Project configuration and deploy settings resolution.
//!
//! # Sources
//!
//! ```text
//! <root>/revship.yaml         project settings (build layout, publish policy)
//! <root>/publish-files.json   ordered file-group declaration
//! process environment         deploy settings, captured once as an EnvSnapshot
//! <root>/.env[.<env>]         local (non-CI) overrides, never replacing set vars
//! ~/.aws/credentials          local credential fallback
//! ```
//!
//! Everything is resolved once per invocation into typed structs and passed
//! down by reference; nothing below the CLI reads the environment.

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{BranchName, CanonicalPolicy, EnvironmentName, FileGroup};

/// File name of the project config, relative to the project root.
pub const CONFIG_FILE: &str = "revship.yaml";

const DEFAULT_REGION: &str = "us-east-1";

// ---------------------------------------------------------------------------
// 1. Project config (revship.yaml)
// ---------------------------------------------------------------------------

/// Root of `revship.yaml`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProjectConfig {
    pub build: BuildConfig,
    pub publish: PublishConfig,
}

/// Layout of the revision build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub source_dir: PathBuf,
    pub dist_dir: PathBuf,
    /// Defaults to `<dist_dir>/rev-manifest.json`.
    pub manifest: Option<PathBuf>,
    pub static_assets: Vec<String>,
    pub css: Vec<String>,
    pub js: Vec<String>,
    pub html: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("build"),
            dist_dir: PathBuf::from("dist"),
            manifest: None,
            static_assets: strings(&["fonts/*", "images/**/*", "images-minified/**/*", "js/**/*.js"]),
            css: strings(&["css/*.css"]),
            js: strings(&["js/**/*.js"]),
            html: strings(&["**/*.html"]),
        }
    }
}

impl BuildConfig {
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| self.dist_dir.join("rev-manifest.json"))
    }
}

/// Which group wins a file claimed by more than one file group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GroupPriority {
    #[default]
    FirstWins,
    LastWins,
}

/// Publish policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub dir: PathBuf,
    pub file_groups: PathBuf,
    pub group_priority: GroupPriority,
    pub canonical_branch: Option<BranchName>,
    pub canonical_environment: Option<EnvironmentName>,
    pub protected_prefixes: Vec<String>,
    pub cache_dir: PathBuf,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("dist"),
            file_groups: PathBuf::from("publish-files.json"),
            group_priority: GroupPriority::default(),
            canonical_branch: Some(BranchName::from("master")),
            canonical_environment: None,
            protected_prefixes: Vec::new(),
            cache_dir: PathBuf::from(".revship"),
            concurrency: 8,
            max_attempts: 3,
            retry_base_delay_ms: 200,
            request_timeout_secs: 30,
        }
    }
}

impl PublishConfig {
    pub fn canonical_policy(&self) -> CanonicalPolicy {
        CanonicalPolicy {
            branch: self.canonical_branch.clone(),
            environment: self.canonical_environment.clone(),
        }
    }
}

impl ProjectConfig {
    /// Load `<root>/revship.yaml`, falling back to defaults when absent.
    ///
    /// Relative paths in the result are joined onto `root`.
    pub fn load_at(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        let config = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Self::default(),
            Ok(contents) => serde_yaml::from_str(&contents)
                .map_err(|source| ConfigError::Yaml { path, source })?,
            Err(err) if err.kind() == ErrorKind::NotFound => Self::default(),
            Err(err) => return Err(io_err(path, err)),
        };
        Ok(config.rooted(root))
    }

    fn rooted(mut self, root: &Path) -> Self {
        let join = |p: &Path| -> PathBuf {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                root.join(p)
            }
        };
        self.build.source_dir = join(&self.build.source_dir);
        self.build.dist_dir = join(&self.build.dist_dir);
        self.build.manifest = self.build.manifest.as_deref().map(join);
        self.publish.dir = join(&self.publish.dir);
        self.publish.file_groups = join(&self.publish.file_groups);
        self.publish.cache_dir = join(&self.publish.cache_dir);
        self
    }
}

/// Load the ordered file-group declaration.
pub fn load_file_groups(path: &Path) -> Result<Vec<FileGroup>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::FileGroups {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// 2. Environment snapshot
// ---------------------------------------------------------------------------

/// Immutable copy of the environment variables relevant to one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    pub fn from_process() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of `key`; empty values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Add the variables of a dotenv file without overriding existing ones.
    ///
    /// Returns `Ok(false)` if the file does not exist.
    pub fn overlay_dotenv(&mut self, path: &Path) -> Result<bool, ConfigError> {
        let entries = match dotenvy::from_path_iter(path) {
            Ok(entries) => entries,
            Err(err) if err.not_found() => return Ok(false),
            Err(source) => return Err(dotenv_err(path, source)),
        };
        for entry in entries {
            let (key, value) = entry.map_err(|source| dotenv_err(path, source))?;
            self.vars.entry(key).or_insert(value);
        }
        Ok(true)
    }
}

fn dotenv_err(path: &Path, source: dotenvy::Error) -> ConfigError {
    ConfigError::Dotenv {
        path: path.to_path_buf(),
        source,
    }
}

// ---------------------------------------------------------------------------
// 3. Deploy settings
// ---------------------------------------------------------------------------

/// Store credentials. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Fully resolved settings for publishing to the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub region: String,
    pub endpoint: Option<String>,
    pub credentials: Credentials,
    pub bucket: String,
    pub branch: BranchName,
    pub environment: EnvironmentName,
    pub is_ci: bool,
}

/// `REVSHIP_ENV`, `GULP_ENV`, `ENV`, else `development`.
pub fn resolve_environment(env: &EnvSnapshot) -> EnvironmentName {
    ["REVSHIP_ENV", "GULP_ENV", "ENV"]
        .iter()
        .find_map(|key| env.get(key))
        .map(EnvironmentName::from)
        .unwrap_or_default()
}

pub fn is_ci(env: &EnvSnapshot) -> bool {
    env.get("CI").is_some()
}

/// Current branch: explicit value, `REVSHIP_BRANCH`, the CI branch variable,
/// else `git rev-parse --abbrev-ref HEAD` run in `root`.
pub fn resolve_branch(
    env: &EnvSnapshot,
    explicit: Option<&str>,
    root: &Path,
) -> Result<BranchName, ConfigError> {
    if let Some(branch) = explicit.filter(|b| !b.trim().is_empty()) {
        return Ok(BranchName::from(branch.trim()));
    }
    if let Some(branch) = env.get("REVSHIP_BRANCH") {
        return Ok(BranchName::from(branch.trim()));
    }
    if is_ci(env) {
        return ["TRAVIS_BRANCH", "GITHUB_REF_NAME"]
            .iter()
            .find_map(|key| env.get(key))
            .map(|b| BranchName::from(b.trim()))
            .ok_or_else(|| {
                ConfigError::Branch("CI is set but TRAVIS_BRANCH/GITHUB_REF_NAME are not".into())
            });
    }

    let output = Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(root)
        .output()
        .map_err(|e| ConfigError::Branch(format!("failed to run git: {e}")))?;
    if !output.status.success() {
        return Err(ConfigError::Branch(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if branch.is_empty() {
        return Err(ConfigError::Branch("git reported an empty branch name".into()));
    }
    Ok(BranchName::from(branch))
}

impl DeployConfig {
    /// Resolve store settings for `environment`.
    ///
    /// CI reads environment-suffixed variables (`AWS_S3_BUCKET_<ENV>`, …).
    /// Local runs first overlay `.env` (development) or `.env.<environment>`
    /// from `root`, then read the unsuffixed variables and fall back to the
    /// shared credentials file under `home`.
    pub fn resolve(
        env: &EnvSnapshot,
        branch: BranchName,
        environment: EnvironmentName,
        root: &Path,
        home: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let ci = is_ci(env);
        if ci {
            tracing::info!("using CI config for environment: {environment}");
            let (access_key_id, tried_key) = var_for_env(env, "AWS_S3_ACCESS_KEYID", &environment);
            let (secret_access_key, tried_secret) =
                var_for_env(env, "AWS_S3_SECRET_ACCESS_KEY", &environment);
            let (bucket, tried_bucket) = var_for_env(env, "AWS_S3_BUCKET", &environment);
            let (region, _) = var_for_env(env, "AWS_REGION", &environment);
            let (endpoint, _) = var_for_env(env, "AWS_S3_ENDPOINT", &environment);

            return Ok(Self {
                region: region
                    .or_else(|| env.get("AWS_REGION").map(str::to_string))
                    .unwrap_or_else(|| DEFAULT_REGION.to_string()),
                endpoint: endpoint.or_else(|| env.get("AWS_S3_ENDPOINT").map(str::to_string)),
                credentials: Credentials {
                    access_key_id: required("access key id", access_key_id, tried_key)?,
                    secret_access_key: required(
                        "secret access key",
                        secret_access_key,
                        tried_secret,
                    )?,
                },
                bucket: required("bucket", bucket, tried_bucket)?,
                branch,
                environment,
                is_ci: ci,
            });
        }

        let mut env = env.clone();
        let dotenv = if environment.0 == "development" {
            root.join(".env")
        } else {
            root.join(format!(".env.{environment}"))
        };
        if env.overlay_dotenv(&dotenv)? {
            tracing::info!("dotenv: {} loaded", dotenv.display());
        } else {
            tracing::debug!("dotenv: {} not found", dotenv.display());
        }

        let credentials = match (env.get("AWS_ACCESS_KEY_ID"), env.get("AWS_SECRET_ACCESS_KEY")) {
            (Some(id), Some(secret)) => Credentials {
                access_key_id: id.to_string(),
                secret_access_key: secret.to_string(),
            },
            _ => shared_credentials(&env, home)?,
        };

        Ok(Self {
            region: env
                .get("AWS_REGION")
                .unwrap_or(DEFAULT_REGION)
                .to_string(),
            endpoint: env.get("AWS_S3_ENDPOINT").map(str::to_string),
            credentials,
            bucket: required(
                "bucket",
                env.get("AWS_S3_BUCKET").map(str::to_string),
                vec!["AWS_S3_BUCKET".to_string()],
            )?,
            branch,
            environment,
            is_ci: ci,
        })
    }
}

/// Look up `<key>_<ENV>`, `<key>_<env>`, then `<key>_<Env>` verbatim.
fn var_for_env(
    env: &EnvSnapshot,
    key: &str,
    environment: &EnvironmentName,
) -> (Option<String>, Vec<String>) {
    let name = &environment.0;
    let tried = vec![
        format!("{key}_{}", name.to_uppercase()),
        format!("{key}_{}", name.to_lowercase()),
        format!("{key}_{name}"),
    ];
    let value = tried.iter().find_map(|k| env.get(k)).map(str::to_string);
    (value, tried)
}

fn required(
    setting: &'static str,
    value: Option<String>,
    tried: Vec<String>,
) -> Result<String, ConfigError> {
    value.ok_or(ConfigError::MissingSetting { setting, tried })
}

fn shared_credentials(env: &EnvSnapshot, home: Option<&Path>) -> Result<Credentials, ConfigError> {
    let path = match env.get("AWS_SHARED_CREDENTIALS_FILE") {
        Some(p) => PathBuf::from(p),
        None => match home {
            Some(home) => home.join(".aws").join("credentials"),
            None => {
                return Err(ConfigError::MissingSetting {
                    setting: "credentials",
                    tried: vec!["AWS_ACCESS_KEY_ID".into(), "AWS_SECRET_ACCESS_KEY".into()],
                })
            }
        },
    };
    let profile = env.get("AWS_PROFILE").unwrap_or("default");
    let tried = vec![
        "AWS_ACCESS_KEY_ID".to_string(),
        format!("{}[{profile}]", path.display()),
    ];

    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::MissingSetting {
                setting: "credentials",
                tried,
            })
        }
        Err(err) => return Err(io_err(&path, err)),
    };

    let section = parse_ini_section(&contents, profile);
    match (
        section.get("aws_access_key_id"),
        section.get("aws_secret_access_key"),
    ) {
        (Some(id), Some(secret)) => Ok(Credentials {
            access_key_id: id.clone(),
            secret_access_key: secret.clone(),
        }),
        _ => Err(ConfigError::MissingSetting {
            setting: "credentials",
            tried,
        }),
    }
}

fn parse_ini_section(contents: &str, wanted: &str) -> BTreeMap<String, String> {
    let mut current: Option<&str> = None;
    let mut values = BTreeMap::new();
    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = Some(name.trim());
            continue;
        }
        if current != Some(wanted) {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    values
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
