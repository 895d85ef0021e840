//! MySQL procedure source.
//!
//! `sqlx` is async; save workers are plain threads. The source owns its own
//! multi-thread runtime and every trait call blocks on it, so any number of
//! workers can issue queries concurrently, each on its own pooled connection.

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Executor, Row};
use tokio::runtime::Runtime;

use spkeeper_core::{DbConfig, ProcedureName};
use spkeeper_sync::{FetchError, ListError, ProcedureSource};

use crate::error::DbError;

const LIST_PROCEDURES: &str = "SELECT ROUTINE_NAME FROM information_schema.ROUTINES \
     WHERE ROUTINE_TYPE = 'PROCEDURE' AND ROUTINE_SCHEMA = ? \
     ORDER BY ROUTINE_NAME";

/// Column of `SHOW CREATE PROCEDURE` holding the definition. NULL when the
/// connected user may not read it.
const DEFINITION_COLUMN: &str = "Create Procedure";

pub struct MySqlSource {
    pool: MySqlPool,
    database: String,
    runtime: Runtime,
}

impl MySqlSource {
    /// Connect to the configured server with a pool of `max_connections`.
    pub fn connect(config: &DbConfig, max_connections: u32) -> Result<Self, DbError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(DbError::Runtime)?;

        let pool = runtime
            .block_on(
                MySqlPoolOptions::new()
                    .max_connections(max_connections.max(1))
                    .connect_with(connect_options(config)),
            )
            .map_err(|source| DbError::Connect {
                host: config.host.clone(),
                port: config.port,
                database: config.database.clone(),
                source,
            })?;

        tracing::debug!(host = %config.host, database = %config.database, "connected");
        Ok(Self {
            pool,
            database: config.database.clone(),
            runtime,
        })
    }
}

impl Drop for MySqlSource {
    fn drop(&mut self) {
        self.runtime.block_on(self.pool.close());
    }
}

impl ProcedureSource for MySqlSource {
    fn list_procedure_names(&self) -> Result<Vec<ProcedureName>, ListError> {
        let rows = self
            .runtime
            .block_on(
                sqlx::query(LIST_PROCEDURES)
                    .bind(self.database.as_str())
                    .fetch_all(&self.pool),
            )
            .map_err(|e| ListError(Box::new(e)))?;

        rows.iter()
            .map(|row| {
                let raw: Vec<u8> = row.try_get(0).map_err(|e| ListError(Box::new(e)))?;
                String::from_utf8(raw)
                    .map(ProcedureName::from)
                    .map_err(|e| ListError(Box::new(e)))
            })
            .collect()
    }

    fn fetch_procedure_body(&self, name: &ProcedureName) -> Result<Vec<String>, FetchError> {
        let sql = show_create_procedure(&self.database, name.as_str());
        // Text protocol: not every server accepts SHOW statements as prepared statements.
        let rows = self
            .runtime
            .block_on(self.pool.fetch_all(sql.as_str()))
            .map_err(|e| FetchError::Query {
                name: name.clone(),
                source: Box::new(e),
            })?;

        if rows.is_empty() {
            return Err(FetchError::MalformedRow {
                name: name.clone(),
                reason: "no definition rows returned".to_string(),
            });
        }
        rows.iter().map(|row| definition_fragment(name, row)).collect()
    }
}

fn definition_fragment(name: &ProcedureName, row: &MySqlRow) -> Result<String, FetchError> {
    let malformed = |reason: String| FetchError::MalformedRow {
        name: name.clone(),
        reason,
    };
    let raw: Option<Vec<u8>> = row
        .try_get(DEFINITION_COLUMN)
        .map_err(|e| malformed(e.to_string()))?;
    let raw = raw.ok_or_else(|| {
        malformed("definition is NULL; the user may lack privileges to read it".to_string())
    })?;
    String::from_utf8(raw).map_err(|e| malformed(e.to_string()))
}

pub(crate) fn connect_options(config: &DbConfig) -> MySqlConnectOptions {
    let options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .database(&config.database);
    if config.password.is_empty() {
        options
    } else {
        options.password(&config.password)
    }
}

/// `SHOW CREATE PROCEDURE` for a schema-qualified, quoted name.
pub(crate) fn show_create_procedure(database: &str, procedure: &str) -> String {
    format!(
        "SHOW CREATE PROCEDURE {}.{}",
        quote_ident(database),
        quote_ident(procedure)
    )
}

/// Backtick-quote an identifier, doubling embedded backticks.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}
