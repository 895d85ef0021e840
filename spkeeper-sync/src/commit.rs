//! Change-aware committer.
//!
//! 1. Stage `<database>/` into the in-memory index.
//! 2. Diff the branch tip's tree against that index: every added or modified
//!    path under `<database>/` is the change set.
//! 3. Empty change set → stop; nothing is written.
//! 4. Build the signature and write a tree from the staged index.
//! 5. Commit with a generated message, advancing the branch.
//! 6. Persist the index.
//!
//! The on-disk index is only written once the commit exists. A failure at any
//! earlier step leaves the repository as it was, and because changes are measured
//! against the branch tip rather than the index, the next run picks them up again.

use std::fmt;
use std::path::Path;

use git2::{
    Commit, Delta, DiffOptions, Index, IndexAddOption, IndexMatchedPath, Oid, Repository,
    Signature, Tree,
};

use spkeeper_core::OutputConfig;

use crate::error::CommitError;
use crate::repo::{self, TARGET_REF};

// ---------------------------------------------------------------------------
// ChangeSet
// ---------------------------------------------------------------------------

/// Repository-relative paths that differ from the branch tip, in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet(Vec<String>);

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn paths(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("\n"))
    }
}

/// What the committer did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing differed; no index, tree or commit was written.
    NoChanges,
    Committed {
        id: Oid,
        /// `None` for the first commit on the branch.
        parent: Option<Oid>,
        changes: ChangeSet,
    },
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Commit message for `database` listing `changes` in recorded order.
pub fn commit_message(database: &str, changes: &ChangeSet) -> String {
    format!("Update with procedures from database '{database}'\n\nThese files have changed:\n\n{changes}")
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// Stage every file under `<database>/` and return the paths that differ from
/// `base` (the branch tip's tree, `None` while unborn).
///
/// Only that subdirectory is touched, and `database` is matched literally.
/// Paths reported for files that no longer exist on disk are skipped: they stay
/// in the index as they were and are never recorded. The index is modified in
/// memory only.
pub fn stage_database(
    repo: &Repository,
    index: &mut Index,
    database: &str,
    base: Option<&Tree<'_>>,
) -> Result<ChangeSet, CommitError> {
    let pathspec = directory_pathspec(database);
    let stage_err = |source: git2::Error| CommitError::Stage {
        pathspec: pathspec.clone(),
        source,
    };
    let workdir = repo
        .workdir()
        .ok_or_else(|| stage_err(git2::Error::from_str("repository has no working directory")))?;

    let mut skip_missing = |path: &Path, _matched: &[u8]| -> i32 {
        if workdir.join(path).exists() {
            0
        } else {
            1
        }
    };
    index
        .add_all(
            [pathspec.as_str()],
            IndexAddOption::DEFAULT,
            Some(&mut skip_missing as &mut IndexMatchedPath),
        )
        .map_err(stage_err)?;

    let mut opts = DiffOptions::new();
    opts.pathspec(pathspec.as_str());
    let diff = repo
        .diff_tree_to_index(base, Some(&*index), Some(&mut opts))
        .map_err(stage_err)?;

    let mut changed = Vec::new();
    for delta in diff.deltas() {
        if !matches!(delta.status(), Delta::Added | Delta::Modified | Delta::Typechange) {
            continue;
        }
        if let Some(path) = delta.new_file().path() {
            let path = path.to_string_lossy().into_owned();
            tracing::debug!(path = %path, "staging changed file");
            changed.push(path);
        }
    }
    Ok(ChangeSet(changed))
}

/// `<database>/*` with every pathspec metacharacter in `database` escaped.
fn directory_pathspec(database: &str) -> String {
    let mut spec = String::with_capacity(database.len() + 2);
    for (i, c) in database.chars().enumerate() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') || (i == 0 && matches!(c, '!' | '#')) {
            spec.push('\\');
        }
        spec.push(c);
    }
    spec.push_str("/*");
    spec
}

// ---------------------------------------------------------------------------
// commit_changes
// ---------------------------------------------------------------------------

/// Commit whatever changed under `<database>/` since the last commit.
///
/// Any failure is returned and nothing is committed.
pub fn commit_changes(
    repo: &Repository,
    database: &str,
    output: &OutputConfig,
) -> Result<CommitOutcome, CommitError> {
    commit_changes_with(repo, database, output, |_, _| {})
}

/// [`commit_changes`], calling `before_commit(changes, initial)` once every
/// fallible step but the commit itself has succeeded.
pub fn commit_changes_with<F>(
    repo: &Repository,
    database: &str,
    output: &OutputConfig,
    before_commit: F,
) -> Result<CommitOutcome, CommitError>
where
    F: FnOnce(&ChangeSet, bool),
{
    let parent = repo::head_commit(repo)?;
    let base = parent
        .as_ref()
        .map(Commit::tree)
        .transpose()
        .map_err(|source| CommitError::ResolveHead {
            branch: TARGET_REF,
            source,
        })?;

    let mut index = repo.index().map_err(CommitError::Index)?;
    let changes = stage_database(repo, &mut index, database, base.as_ref())?;

    if changes.is_empty() {
        tracing::info!(database, "no changes to commit");
        return Ok(CommitOutcome::NoChanges);
    }

    let signature = Signature::now(&output.author_name, &output.author_email)
        .map_err(CommitError::Signature)?;
    let tree_id = index.write_tree().map_err(CommitError::WriteTree)?;
    let tree = repo.find_tree(tree_id).map_err(CommitError::WriteTree)?;
    let message = commit_message(database, &changes);

    before_commit(&changes, parent.is_none());

    let parents: Vec<&Commit<'_>> = parent.iter().collect();
    let id = repo
        .commit(
            Some(TARGET_REF),
            &signature,
            &signature,
            &message,
            &tree,
            &parents,
        )
        .map_err(CommitError::Commit)?;
    index.write().map_err(CommitError::WriteIndex)?;

    let parent = parent.as_ref().map(Commit::id);
    tracing::info!(
        database,
        commit = %id,
        files = changes.len(),
        initial = parent.is_none(),
        "committed procedure changes"
    );
    Ok(CommitOutcome::Committed {
        id,
        parent,
        changes,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn output(dir: &Path) -> OutputConfig {
        OutputConfig {
            dir: dir.to_path_buf(),
            author_name: "spkeeper".into(),
            author_email: "spkeeper@example.com".into(),
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn message_lists_paths_in_order() {
        let changes = ChangeSet(vec!["orders/b.sql".into(), "orders/a.sql".into()]);
        assert_eq!(
            commit_message("orders", &changes),
            "Update with procedures from database 'orders'\n\n\
             These files have changed:\n\n\
             orders/b.sql\norders/a.sql"
        );
    }

    #[test]
    fn staging_is_limited_to_the_database_directory() {
        let root = TempDir::new().unwrap();
        let repo = repo::open_or_init(root.path()).unwrap();
        write(root.path(), "orders/GetOrder.sql", "SELECT 1");
        write(root.path(), "billing/Charge.sql", "SELECT 2");
        write(root.path(), "orders_archive/Old.sql", "SELECT 0");

        let mut index = repo.index().unwrap();
        let changes = stage_database(&repo, &mut index, "orders", None).unwrap();
        assert_eq!(changes.paths(), ["orders/GetOrder.sql".to_string()]);
        assert!(index.get_path(Path::new("billing/Charge.sql"), 0).is_none());
        assert!(index.get_path(Path::new("orders_archive/Old.sql"), 0).is_none());
    }

    #[test]
    fn pathspec_escapes_glob_characters() {
        assert_eq!(directory_pathspec("orders"), "orders/*");
        assert_eq!(directory_pathspec("db[1]"), "db\\[1\\]/*");
        assert_eq!(directory_pathspec("a*b?"), "a\\*b\\?/*");
        assert_eq!(directory_pathspec("!neg"), "\\!neg/*");
    }

    #[test]
    fn database_name_with_glob_characters_is_matched_literally() {
        let root = TempDir::new().unwrap();
        let repo = repo::open_or_init(root.path()).unwrap();
        write(root.path(), "db[1]/GetOrder.sql", "SELECT 1");
        write(root.path(), "db1/Other.sql", "SELECT 2");

        let outcome = commit_changes(&repo, "db[1]", &output(root.path())).unwrap();
        let CommitOutcome::Committed { changes, .. } = outcome else {
            panic!("expected a commit");
        };
        assert_eq!(changes.paths(), ["db[1]/GetOrder.sql".to_string()]);
    }

    #[test]
    fn nothing_written_when_unchanged() {
        let root = TempDir::new().unwrap();
        let repo = repo::open_or_init(root.path()).unwrap();
        write(root.path(), "orders/GetOrder.sql", "SELECT 1");

        let first = commit_changes(&repo, "orders", &output(root.path())).unwrap();
        assert!(matches!(first, CommitOutcome::Committed { parent: None, .. }));

        write(root.path(), "orders/GetOrder.sql", "SELECT 1");
        let second = commit_changes(&repo, "orders", &output(root.path())).unwrap();
        assert_eq!(second, CommitOutcome::NoChanges);
    }

    #[test]
    fn removed_file_is_not_a_change() {
        let root = TempDir::new().unwrap();
        let repo = repo::open_or_init(root.path()).unwrap();
        write(root.path(), "orders/GetOrder.sql", "SELECT 1");
        write(root.path(), "orders/Old.sql", "SELECT 0");
        commit_changes(&repo, "orders", &output(root.path())).unwrap();

        fs::remove_file(root.path().join("orders/Old.sql")).unwrap();
        let outcome = commit_changes(&repo, "orders", &output(root.path())).unwrap();
        assert_eq!(outcome, CommitOutcome::NoChanges);
    }

    #[test]
    fn empty_author_is_rejected_before_committing() {
        let root = TempDir::new().unwrap();
        let repo = repo::open_or_init(root.path()).unwrap();
        write(root.path(), "orders/GetOrder.sql", "SELECT 1");
        let mut out = output(root.path());
        out.author_name.clear();
        let err = commit_changes(&repo, "orders", &out).unwrap_err();
        assert!(matches!(err, CommitError::Signature(_)), "got: {err}");
        assert!(repo::head_commit(&repo).unwrap().is_none());

        let reopened = Repository::open(root.path()).unwrap();
        let index = reopened.index().unwrap();
        assert!(
            index.get_path(Path::new("orders/GetOrder.sql"), 0).is_none(),
            "a failed commit must not persist the staged index"
        );
    }

    #[test]
    fn failed_commit_is_retried_on_next_run() {
        let root = TempDir::new().unwrap();
        let repo = repo::open_or_init(root.path()).unwrap();
        write(root.path(), "orders/GetOrder.sql", "SELECT 1");

        let mut bad = output(root.path());
        bad.author_name = "a<b".into();
        let err = commit_changes(&repo, "orders", &bad).unwrap_err();
        assert!(matches!(err, CommitError::Signature(_)), "got: {err}");

        let outcome = commit_changes(&repo, "orders", &output(root.path())).unwrap();
        let CommitOutcome::Committed { id, parent, changes } = outcome else {
            panic!("expected a commit");
        };
        assert!(parent.is_none());
        assert_eq!(changes.paths(), ["orders/GetOrder.sql".to_string()]);
        assert_eq!(repo::head_commit(&repo).unwrap().map(|c| c.id()), Some(id));
    }

    #[test]
    fn staged_but_uncommitted_entries_are_still_changes() {
        let root = TempDir::new().unwrap();
        let repo = repo::open_or_init(root.path()).unwrap();
        write(root.path(), "orders/GetOrder.sql", "SELECT 1");
        commit_changes(&repo, "orders", &output(root.path())).unwrap();

        write(root.path(), "orders/GetOrder.sql", "SELECT 2");
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("orders/GetOrder.sql")).unwrap();
        index.write().unwrap();

        let outcome = commit_changes(&repo, "orders", &output(root.path())).unwrap();
        let CommitOutcome::Committed { changes, parent, .. } = outcome else {
            panic!("expected a commit");
        };
        assert!(parent.is_some());
        assert_eq!(changes.paths(), ["orders/GetOrder.sql".to_string()]);
    }

    #[test]
    fn before_commit_sees_changes_and_initial_flag() {
        let root = TempDir::new().unwrap();
        let repo = repo::open_or_init(root.path()).unwrap();
        write(root.path(), "orders/GetOrder.sql", "SELECT 1");

        let mut seen = None;
        commit_changes_with(&repo, "orders", &output(root.path()), |changes, initial| {
            assert!(repo::head_commit(&repo).unwrap().is_none(), "hook runs before the commit");
            seen = Some((changes.len(), initial));
        })
        .unwrap();
        assert_eq!(seen, Some((1, true)));

        write(root.path(), "orders/GetOrder.sql", "SELECT 2");
        let mut seen = None;
        commit_changes_with(&repo, "orders", &output(root.path()), |changes, initial| {
            seen = Some((changes.len(), initial));
        })
        .unwrap();
        assert_eq!(seen, Some((1, false)));
    }

    #[test]
    fn hook_is_not_called_without_changes() {
        let root = TempDir::new().unwrap();
        let repo = repo::open_or_init(root.path()).unwrap();
        let mut called = false;
        let outcome = commit_changes_with(&repo, "orders", &output(root.path()), |_, _| {
            called = true;
        })
        .unwrap();
        assert_eq!(outcome, CommitOutcome::NoChanges);
        assert!(!called);
    }
}
