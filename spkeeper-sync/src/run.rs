//! Sync entrypoint shared by every caller: list → save → commit.

use spkeeper_core::Config;

use crate::commit::{self, ChangeSet, CommitOutcome};
use crate::error::SyncError;
use crate::pipeline::{self, SaveSettings, SaveSummary};
use crate::repo;
use crate::source::ProcedureSource;

/// Outcome of one full run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Procedures the database reported.
    pub listed: usize,
    pub saved: SaveSummary,
    /// Procedures that could not be saved and count against the run.
    pub failed: usize,
    pub commit: CommitOutcome,
}

impl RunReport {
    /// True when every listed procedure was saved or deliberately skipped.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Milestones reported while a run is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress<'a> {
    /// Listing succeeded; nothing has been written yet.
    Saving { procedures: usize },
    /// Everything is staged; the commit object is about to be created.
    Committing { changes: &'a ChangeSet, initial: bool },
}

/// Run one sync of the configured database.
///
/// Per-procedure failures do not stop the run: whatever was saved is still
/// committed and the failures are reported through [`RunReport::failed`].
/// Listing, output-directory and commit failures are returned as errors.
pub fn run<S>(config: &Config, source: &S) -> Result<RunReport, SyncError>
where
    S: ProcedureSource + ?Sized,
{
    run_with_progress(config, source, |_| {})
}

/// [`run`], calling `on_progress` at each [`Progress`] milestone.
pub fn run_with_progress<S, F>(
    config: &Config,
    source: &S,
    mut on_progress: F,
) -> Result<RunReport, SyncError>
where
    S: ProcedureSource + ?Sized,
    F: FnMut(Progress<'_>),
{
    let names = source.list_procedure_names()?;
    tracing::info!(
        database = %config.db.database,
        procedures = names.len(),
        "saving stored procedures"
    );
    on_progress(Progress::Saving {
        procedures: names.len(),
    });

    let settings = SaveSettings::from_config(config);
    let (saved, failed) = match pipeline::save_all(source, &names, &settings) {
        Ok(summary) => (summary, 0),
        Err(SyncError::ProcedureFailures { failed, summary }) => (summary, failed),
        Err(e) => return Err(e),
    };

    let repo = repo::open_or_init(&config.output.dir)?;
    let commit = commit::commit_changes_with(
        &repo,
        &config.db.database,
        &config.output,
        |changes, initial| on_progress(Progress::Committing { changes, initial }),
    )?;

    Ok(RunReport {
        listed: names.len(),
        saved,
        failed,
        commit,
    })
}
