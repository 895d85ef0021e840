//! spkeeper — snapshot stored procedures into a git repository.
//!
//! # Usage
//!
//! ```text
//! spkeeper sync -d <database> -o <dir> [-H host] [-P port] [-u user] [-p password]
//!               [-n name] [-e email] [-w workers] [--warn-unreadable] [--config file]
//! spkeeper list -d <database> [-H host] [-P port] [-u user] [-p password] [--config file]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{list::ListArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "spkeeper",
    version,
    about = "Keep stored procedure definitions under version control",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write every stored procedure to disk and commit what changed.
    Sync(SyncArgs),

    /// Print the names of all stored procedures in the database.
    List(ListArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::List(args) => args.run(),
    }
}

/// Diagnostics go to stderr; stdout carries progress and results only.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
