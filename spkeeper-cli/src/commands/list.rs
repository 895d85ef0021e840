//! `spkeeper list` — print procedure names.

use anyhow::{Context, Result};
use clap::Args;

use spkeeper_core::PartialConfig;
use spkeeper_db::MySqlSource;
use spkeeper_sync::ProcedureSource;

use super::ConnectionArgs;

/// Arguments for `spkeeper list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl ListArgs {
    pub fn run(self) -> Result<()> {
        let flags = PartialConfig {
            database: self.connection.db_layer(),
            ..Default::default()
        };
        let db = self
            .connection
            .layered(flags)?
            .database
            .build()
            .context("invalid configuration")?;

        let source = MySqlSource::connect(&db, 1).context("database connection failed")?;
        let mut names = source
            .list_procedure_names()
            .context("procedure listing failed")?;
        names.sort();

        for name in &names {
            println!("{name}");
        }
        Ok(())
    }
}
