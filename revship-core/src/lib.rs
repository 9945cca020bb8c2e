//! revship core library: domain types, configuration, errors.
//!
//! - [`types`]: newtypes, file groups and the branch-scoped sync target
//! - [`config`]: `revship.yaml` project settings and deploy settings resolution
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    BuildConfig, Credentials, DeployConfig, EnvSnapshot, GroupPriority, ProjectConfig,
    PublishConfig,
};
pub use error::ConfigError;
pub use types::{BranchName, CanonicalPolicy, EnvironmentName, FileGroup, SyncTarget};
