//! Error types for spkeeper-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure reading a config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// No output directory was configured.
    #[error("missing output directory")]
    MissingOutputDir,

    /// The configured output directory is absent or not a directory.
    #[error("output directory does not exist: {path}")]
    OutputDirNotFound { path: PathBuf },

    /// A required field was empty.
    #[error("missing {0}")]
    MissingField(&'static str),

    /// The database name cannot be used as a directory name.
    #[error("database name '{0}' cannot be used as an output directory name")]
    InvalidDatabaseName(String),

    /// An author field holds characters a commit signature cannot carry.
    #[error("git author {0} must not contain '<', '>' or line breaks")]
    InvalidAuthor(&'static str),

    /// Worker count must be at least one.
    #[error("worker count must be at least 1")]
    InvalidWorkerCount,
}
