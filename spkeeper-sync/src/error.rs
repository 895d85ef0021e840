//! Error types for spkeeper-sync.

use std::path::PathBuf;

use thiserror::Error;

use spkeeper_core::ProcedureName;

use crate::pipeline::SaveSummary;

/// Boxed driver error carried across the [`ProcedureSource`](crate::ProcedureSource) seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Listing the procedures of a database failed.
#[derive(Debug, Error)]
#[error("failed to list stored procedures: {0}")]
pub struct ListError(#[source] pub BoxError);

/// Fetching one procedure's definition failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The query itself failed (connection dropped, permission denied, ...).
    #[error("{name}: query failed: {source}")]
    Query {
        name: ProcedureName,
        #[source]
        source: BoxError,
    },

    /// The query returned a row that cannot be read as procedure text.
    #[error("{name}: unreadable definition row: {reason}")]
    MalformedRow { name: ProcedureName, reason: String },
}

impl FetchError {
    pub fn name(&self) -> &ProcedureName {
        match self {
            FetchError::Query { name, .. } | FetchError::MalformedRow { name, .. } => name,
        }
    }
}

/// Saving a single procedure failed. Never fatal to the batch.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Saving panicked; the worker caught it and kept going.
    #[error("{name}: save panicked")]
    Panicked { name: ProcedureName },

    #[error("{name}: name cannot be used as a file name")]
    InvalidName { name: ProcedureName },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the version-control stage.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("failed to open repository at {0}: {1}")]
    OpenRepo(PathBuf, #[source] git2::Error),

    #[error("failed to initialize repository at {0}: {1}")]
    InitRepo(PathBuf, #[source] git2::Error),

    #[error("failed to load index: {0}")]
    Index(#[source] git2::Error),

    #[error("failed to stage {pathspec}: {source}")]
    Stage {
        pathspec: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to write index: {0}")]
    WriteIndex(#[source] git2::Error),

    #[error("failed to write tree: {0}")]
    WriteTree(#[source] git2::Error),

    #[error("failed to resolve {branch}: {source}")]
    ResolveHead {
        branch: &'static str,
        #[source]
        source: git2::Error,
    },

    #[error("invalid commit signature: {0}")]
    Signature(#[source] git2::Error),

    #[error("failed to create commit: {0}")]
    Commit(#[source] git2::Error),
}

/// Run-level errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    List(#[from] ListError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more procedures could not be saved. `summary` describes what
    /// did get written so the caller can still commit it.
    #[error("{failed} errors occurred while saving stored procedures")]
    ProcedureFailures { failed: usize, summary: SaveSummary },

    #[error(transparent)]
    Commit(#[from] CommitError),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
