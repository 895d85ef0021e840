//! `spkeeper sync` — write every procedure to disk and commit the changes.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use spkeeper_core::{config::PartialOutputConfig, Config, PartialConfig, UnreadablePolicy};
use spkeeper_db::MySqlSource;
use spkeeper_sync::{run, CommitOutcome, Progress, RunReport};

use super::ConnectionArgs;

/// Arguments for `spkeeper sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Output root: holds the repository and one directory per database.
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Commit author name [default: spkeeper].
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    /// Commit author email [default: spkeeper@example.com].
    #[arg(long, short = 'e')]
    pub email: Option<String>,

    /// Number of concurrent fetch-and-write workers [default: 5].
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Warn about procedures whose definition cannot be read instead of failing the run.
    #[arg(long)]
    pub warn_unreadable: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let config = self.resolve().context("invalid configuration")?;

        let max_connections = u32::try_from(config.workers).unwrap_or(u32::MAX);
        let source = MySqlSource::connect(&config.db, max_connections)
            .context("database connection failed")?;

        let report = run::run_with_progress(&config, &source, |event| {
            println!("{}", progress_line(event));
        })
        .with_context(|| format!("sync failed for database '{}'", config.db.database))?;
        print_report(&config, &report);

        if !report.is_complete() {
            bail!(
                "{} errors occurred while saving stored procedures",
                report.failed
            );
        }
        Ok(())
    }

    fn resolve(&self) -> Result<Config> {
        let flags = PartialConfig {
            database: self.connection.db_layer(),
            output: PartialOutputConfig {
                dir: self.output.clone(),
                author_name: self.name.clone(),
                author_email: self.email.clone(),
            },
            workers: self.workers,
            unreadable: self.warn_unreadable.then_some(UnreadablePolicy::Warn),
        };
        Ok(self.connection.layered(flags)?.build()?)
    }
}

fn progress_line(event: Progress<'_>) -> String {
    match event {
        Progress::Saving { procedures } => format!("Saving {procedures} stored procedures"),
        Progress::Committing {
            changes,
            initial: false,
        } => format!("{} Committing updates to {} files", "✎".yellow(), changes.len()),
        Progress::Committing {
            changes,
            initial: true,
        } => format!(
            "{} Creating initial commit containing {} files",
            "✎".yellow(),
            changes.len()
        ),
    }
}

fn print_report(config: &Config, report: &RunReport) {
    let database = &config.db.database;
    println!(
        "Saved {} of {} stored procedures from '{database}'",
        report.saved.saved.len(),
        report.listed
    );
    if report.saved.skipped > 0 {
        println!("  {} unreadable procedures skipped", report.saved.skipped);
    }

    match &report.commit {
        CommitOutcome::NoChanges => println!("{} No changes to commit", "✓".green()),
        CommitOutcome::Committed { id, changes, .. } => {
            let short = &id.to_string()[..7];
            println!("{} Committed {} files ({short})", "✓".green(), changes.len());
            for path in changes.paths() {
                println!("  ✎  {path}");
            }
        }
    }

    if report.failed > 0 {
        eprintln!(
            "{} {} procedures could not be saved; see errors above",
            "✗".red(),
            report.failed
        );
    }
}
