//! Error types for revship-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `revship.yaml` exists but is not valid.
    #[error("failed to parse project config at {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The file-group declaration is not valid JSON of the expected shape.
    #[error("failed to parse file groups at {path}: {source}")]
    FileGroups {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A dotenv file exists but cannot be read or parsed.
    #[error("failed to load dotenv file {path}: {source}")]
    Dotenv {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    /// A required deploy setting could not be found under any of the tried keys.
    #[error("missing {setting}; tried {}", .tried.join(", "))]
    MissingSetting {
        setting: &'static str,
        tried: Vec<String>,
    },

    /// The current branch could not be determined.
    #[error("cannot determine current branch: {0}")]
    Branch(String),
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
