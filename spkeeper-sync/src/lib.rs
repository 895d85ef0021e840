//! # spkeeper-sync
//!
//! Bounded save pipeline and change-aware committer.
//!
//! Call [`run`](run::run) to list, save and commit every stored procedure of the
//! configured database, or use [`save_all`] and [`commit_changes`] separately.

pub mod commit;
pub mod error;
pub mod pipeline;
pub mod repo;
pub mod run;
pub mod source;
pub mod writer;

pub use commit::{commit_changes, commit_changes_with, commit_message, ChangeSet, CommitOutcome};
pub use error::{CommitError, FetchError, ListError, SaveError, SyncError};
pub use pipeline::{save_all, SaveOutcome, SaveSettings, SaveSummary};
pub use run::{Progress, RunReport};
pub use source::{MemorySource, ProcedureSource};
