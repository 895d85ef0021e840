//! Repository accessor: open or lazily create the repository at the output root.
//!
//! State machine: `Absent → Initialized` happens at most once per output root;
//! `Unborn → HasCommits` on the first non-empty commit.

use std::path::Path;

use git2::{Commit, ErrorCode, Repository, RepositoryInitOptions};

use crate::error::CommitError;

/// Branch every sync commit lands on.
pub const TARGET_BRANCH: &str = "master";
pub const TARGET_REF: &str = "refs/heads/master";

/// Open the repository at `path`, or initialize one if none exists.
///
/// Never re-initializes an existing repository. Only a missing repository
/// triggers init; any other open failure is returned as-is.
pub fn open_or_init(path: &Path) -> Result<Repository, CommitError> {
    match Repository::open(path) {
        Ok(repo) => Ok(repo),
        Err(e) if e.code() == ErrorCode::NotFound => {
            tracing::info!(path = %path.display(), "initializing repository");
            let mut opts = RepositoryInitOptions::new();
            opts.initial_head(TARGET_BRANCH);
            Repository::init_opts(path, &opts)
                .map_err(|e| CommitError::InitRepo(path.to_path_buf(), e))
        }
        Err(e) => Err(CommitError::OpenRepo(path.to_path_buf(), e)),
    }
}

/// Current tip of [`TARGET_REF`], or `None` while the branch is unborn.
pub fn head_commit(repo: &Repository) -> Result<Option<Commit<'_>>, CommitError> {
    let resolve_err = |source: git2::Error| CommitError::ResolveHead {
        branch: TARGET_REF,
        source,
    };
    let reference = match repo.find_reference(TARGET_REF) {
        Ok(reference) => reference,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(resolve_err(e)),
    };
    reference.peel_to_commit().map(Some).map_err(resolve_err)
}
