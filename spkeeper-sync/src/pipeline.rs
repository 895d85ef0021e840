//! Bounded save pipeline.
//!
//! ```text
//!            ┌──────────┐
//!  names ──► │ work rx  │ ──► worker 1 ─┐
//!  (all N,   │(unbounded│ ──► worker 2 ─┼──► results ──► aggregator (caller thread)
//!  closed)   │ channel) │ ──► worker W ─┘                 exactly N outcomes
//!            └──────────┘
//! ```
//!
//! Every name is delivered to exactly one worker. Each worker holds at most one
//! database fetch and one open file at a time, so W bounds both. A failing
//! procedure never stops the batch; the aggregator counts it and moves on. A
//! panic while saving one procedure is caught and reported as its failure.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};

use spkeeper_core::{Config, ProcedureName, UnreadablePolicy};

use crate::error::{io_err, FetchError, SaveError, SyncError};
use crate::source::ProcedureSource;
use crate::writer;

// ---------------------------------------------------------------------------
// Settings and results
// ---------------------------------------------------------------------------

/// Where and how wide a save batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSettings {
    /// Per-database output directory, created if absent.
    pub dir: PathBuf,
    /// Maximum number of concurrent fetch-and-write operations.
    pub workers: usize,
    pub unreadable: UnreadablePolicy,
}

impl SaveSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dir: config.procedures_dir(),
            workers: config.workers,
            unreadable: config.unreadable,
        }
    }
}

/// Result of saving one procedure.
#[derive(Debug)]
pub enum SaveOutcome {
    Saved { name: ProcedureName, path: PathBuf },
    Failed { name: ProcedureName, error: SaveError },
}

/// What a batch wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveSummary {
    /// Files written, sorted.
    pub saved: Vec<PathBuf>,
    /// Unreadable procedures left out under [`UnreadablePolicy::Warn`].
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// save_all
// ---------------------------------------------------------------------------

/// Save every procedure in `names` under `settings.dir`.
///
/// Blocks until all N outcomes are in. Returns
/// [`SyncError::ProcedureFailures`] when at least one procedure failed; its
/// summary still lists every file that was written. Failing to create the
/// output directory is returned as [`SyncError::Io`] before any work starts.
pub fn save_all<S>(
    source: &S,
    names: &[ProcedureName],
    settings: &SaveSettings,
) -> Result<SaveSummary, SyncError>
where
    S: ProcedureSource + ?Sized,
{
    std::fs::create_dir_all(&settings.dir).map_err(|e| io_err(&settings.dir, e))?;

    if names.is_empty() {
        return Ok(SaveSummary::default());
    }

    let workers = settings.workers.clamp(1, names.len());
    tracing::debug!(procedures = names.len(), workers, "starting save workers");

    let (work_tx, work_rx) = channel::unbounded::<ProcedureName>();
    for name in names {
        // `work_rx` is alive, so an unbounded send cannot fail.
        let _ = work_tx.send(name.clone());
    }
    drop(work_tx);

    let (result_tx, result_rx) = channel::unbounded::<SaveOutcome>();
    let mut tally = Tally::new(settings.unreadable);

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let names = work_rx.clone();
                let results = result_tx.clone();
                let dir = settings.dir.as_path();
                scope.spawn(move || worker(source, dir, names, results))
            })
            .collect();
        drop(result_tx);

        for _ in 0..names.len() {
            match result_rx.recv() {
                Ok(outcome) => tally.record(outcome),
                // Every worker is gone; whatever is still missing is counted below.
                Err(_) => break,
            }
        }

        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("save worker panicked");
            }
        }
    });

    tally.finish(names.len())
}

fn worker<S>(source: &S, dir: &Path, names: Receiver<ProcedureName>, results: Sender<SaveOutcome>)
where
    S: ProcedureSource + ?Sized,
{
    for name in names.iter() {
        let saved = panic::catch_unwind(AssertUnwindSafe(|| {
            writer::save_procedure(source, &name, dir)
        }))
        .unwrap_or_else(|_| Err(SaveError::Panicked { name: name.clone() }));
        let outcome = match saved {
            Ok(path) => SaveOutcome::Saved { name, path },
            Err(error) => SaveOutcome::Failed { name, error },
        };
        if results.send(outcome).is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

struct Tally {
    policy: UnreadablePolicy,
    saved: Vec<PathBuf>,
    skipped: usize,
    failed: usize,
    received: usize,
}

impl Tally {
    fn new(policy: UnreadablePolicy) -> Self {
        Self {
            policy,
            saved: Vec::new(),
            skipped: 0,
            failed: 0,
            received: 0,
        }
    }

    fn record(&mut self, outcome: SaveOutcome) {
        self.received += 1;
        match outcome {
            SaveOutcome::Saved { path, .. } => self.saved.push(path),
            SaveOutcome::Failed { name, error } if self.tolerates(&error) => {
                tracing::warn!(procedure = %name, error = %error, "skipping unreadable procedure");
                self.skipped += 1;
            }
            SaveOutcome::Failed { name, error } => {
                tracing::error!(procedure = %name, error = %error, "failed to save procedure");
                self.failed += 1;
            }
        }
    }

    fn tolerates(&self, error: &SaveError) -> bool {
        self.policy == UnreadablePolicy::Warn
            && matches!(error, SaveError::Fetch(FetchError::MalformedRow { .. }))
    }

    fn finish(mut self, expected: usize) -> Result<SaveSummary, SyncError> {
        let lost = expected.saturating_sub(self.received);
        if lost > 0 {
            tracing::error!(lost, "procedures were never reported by a save worker");
            self.failed += lost;
        }

        self.saved.sort();
        let summary = SaveSummary {
            saved: self.saved,
            skipped: self.skipped,
        };
        if self.failed > 0 {
            return Err(SyncError::ProcedureFailures {
                failed: self.failed,
                summary,
            });
        }
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ListError;
    use crate::source::MemorySource;
    use rstest::rstest;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn settings(root: &Path, workers: usize) -> SaveSettings {
        SaveSettings {
            dir: root.join("orders"),
            workers,
            unreadable: UnreadablePolicy::Fail,
        }
    }

    fn names(source: &MemorySource) -> Vec<ProcedureName> {
        source.list_procedure_names().unwrap()
    }

    fn source_with(n: usize, failing: &[usize]) -> MemorySource {
        let mut source = MemorySource::new();
        for i in 0..n {
            let name = format!("proc_{i:02}");
            if failing.contains(&i) {
                source = source.with_unavailable(&name, "connection reset");
            } else {
                source.set_procedure(&name, [format!("-- {name}\n"), format!("SELECT {i}")]);
            }
        }
        source
    }

    /// Wraps a source and records the peak number of concurrent fetches.
    struct Gauge<'a> {
        inner: &'a MemorySource,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ProcedureSource for Gauge<'_> {
        fn list_procedure_names(&self) -> Result<Vec<ProcedureName>, ListError> {
            self.inner.list_procedure_names()
        }

        fn fetch_procedure_body(&self, name: &ProcedureName) -> Result<Vec<String>, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            let body = self.inner.fetch_procedure_body(name);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            body
        }
    }

    /// Panics when asked for one particular procedure.
    struct Explosive<'a> {
        inner: &'a MemorySource,
        fuse: &'static str,
    }

    impl ProcedureSource for Explosive<'_> {
        fn list_procedure_names(&self) -> Result<Vec<ProcedureName>, ListError> {
            self.inner.list_procedure_names()
        }

        fn fetch_procedure_body(&self, name: &ProcedureName) -> Result<Vec<String>, FetchError> {
            if name.as_str() == self.fuse {
                panic!("driver blew up on {name}");
            }
            self.inner.fetch_procedure_body(name)
        }
    }

    #[test]
    fn empty_batch_is_a_noop_success() {
        let root = TempDir::new().unwrap();
        let summary = save_all(&MemorySource::new(), &[], &settings(root.path(), 5)).unwrap();
        assert_eq!(summary, SaveSummary::default());
        assert!(root.path().join("orders").is_dir());
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(5)]
    fn all_succeeding_writes_one_file_per_name(#[case] workers: usize) {
        let root = TempDir::new().unwrap();
        let source = source_with(12, &[]);
        let summary = save_all(&source, &names(&source), &settings(root.path(), workers)).unwrap();

        assert_eq!(summary.saved.len(), 12);
        for i in 0..12 {
            let path = root.path().join("orders").join(format!("proc_{i:02}.sql"));
            assert_eq!(
                fs::read_to_string(&path).unwrap(),
                format!("-- proc_{i:02}\nSELECT {i}")
            );
        }
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(5)]
    fn failures_are_counted_regardless_of_worker_count(#[case] workers: usize) {
        let root = TempDir::new().unwrap();
        let source = source_with(10, &[0, 4, 9]);
        let err = save_all(&source, &names(&source), &settings(root.path(), workers)).unwrap_err();

        match err {
            SyncError::ProcedureFailures { failed, summary } => {
                assert_eq!(failed, 3);
                assert_eq!(summary.saved.len(), 7);
            }
            other => panic!("expected ProcedureFailures, got {other:?}"),
        }
        let files = fs::read_dir(root.path().join("orders")).unwrap().count();
        assert_eq!(files, 7);
    }

    #[test]
    fn every_name_failing_still_reports_all() {
        let root = TempDir::new().unwrap();
        let source = source_with(4, &[0, 1, 2, 3]);
        let err = save_all(&source, &names(&source), &settings(root.path(), 2)).unwrap_err();
        assert!(matches!(err, SyncError::ProcedureFailures { failed: 4, .. }));
    }

    #[test]
    fn warn_policy_skips_only_malformed_rows() {
        let root = TempDir::new().unwrap();
        let source = MemorySource::new()
            .with_procedure("ok", ["SELECT 1"])
            .with_malformed("unreadable", "NULL definition")
            .with_unavailable("broken", "permission denied");
        let mut s = settings(root.path(), 2);
        s.unreadable = UnreadablePolicy::Warn;

        let err = save_all(&source, &names(&source), &s).unwrap_err();
        match err {
            SyncError::ProcedureFailures { failed, summary } => {
                assert_eq!(failed, 1);
                assert_eq!(summary.skipped, 1);
                assert_eq!(summary.saved, vec![root.path().join("orders").join("ok.sql")]);
            }
            other => panic!("expected ProcedureFailures, got {other:?}"),
        }
    }

    #[test]
    fn warn_policy_with_only_malformed_rows_succeeds() {
        let root = TempDir::new().unwrap();
        let source = MemorySource::new()
            .with_procedure("ok", ["SELECT 1"])
            .with_malformed("unreadable", "NULL definition");
        let mut s = settings(root.path(), 2);
        s.unreadable = UnreadablePolicy::Warn;

        let summary = save_all(&source, &names(&source), &s).unwrap();
        assert_eq!(summary.saved.len(), 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn fail_policy_counts_malformed_rows() {
        let root = TempDir::new().unwrap();
        let source = MemorySource::new().with_malformed("unreadable", "NULL definition");
        let err = save_all(&source, &names(&source), &settings(root.path(), 1)).unwrap_err();
        assert!(matches!(err, SyncError::ProcedureFailures { failed: 1, .. }));
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    fn concurrency_never_exceeds_worker_count(#[case] workers: usize) {
        let root = TempDir::new().unwrap();
        let inner = source_with(12, &[]);
        let gauge = Gauge {
            inner: &inner,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        save_all(&gauge, &names(&inner), &settings(root.path(), workers)).unwrap();
        let peak = gauge.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= workers, "peak {peak} with {workers} workers");
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    fn panicking_fetch_fails_only_that_procedure(#[case] workers: usize) {
        let root = TempDir::new().unwrap();
        let inner = source_with(6, &[]);
        let source = Explosive {
            inner: &inner,
            fuse: "proc_03",
        };
        let err = save_all(&source, &names(&inner), &settings(root.path(), workers)).unwrap_err();

        match err {
            SyncError::ProcedureFailures { failed, summary } => {
                assert_eq!(failed, 1);
                assert_eq!(summary.saved.len(), 5);
            }
            other => panic!("expected ProcedureFailures, got {other:?}"),
        }
        let dir = root.path().join("orders");
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 5);
        assert!(!dir.join("proc_03.sql").exists());
    }

    #[test]
    fn missing_outcomes_count_as_failures() {
        let mut tally = Tally::new(UnreadablePolicy::Fail);
        tally.record(SaveOutcome::Saved {
            name: "a".into(),
            path: PathBuf::from("a.sql"),
        });

        match tally.finish(3) {
            Err(SyncError::ProcedureFailures { failed, summary }) => {
                assert_eq!(failed, 2);
                assert_eq!(summary.saved, vec![PathBuf::from("a.sql")]);
            }
            other => panic!("expected ProcedureFailures, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_names_each_write() {
        let root = TempDir::new().unwrap();
        let source = MemorySource::new().with_procedure("p", ["SELECT 1"]);
        let dupes = vec![ProcedureName::from("p"), ProcedureName::from("p")];
        let summary = save_all(&source, &dupes, &settings(root.path(), 2)).unwrap();
        assert_eq!(summary.saved.len(), 2);
        assert_eq!(
            fs::read_to_string(root.path().join("orders").join("p.sql")).unwrap(),
            "SELECT 1"
        );
    }

    #[test]
    fn unusable_output_directory_is_fatal() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("orders"), "not a directory").unwrap();
        let source = source_with(2, &[]);
        let err = save_all(&source, &names(&source), &settings(root.path(), 2)).unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }), "got: {err}");
    }
}
