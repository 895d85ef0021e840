use thiserror::Error;

/// Errors establishing the database collaborator.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to start database runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to connect to {host}:{port}/{database}: {source}")]
    Connect {
        host: String,
        port: u16,
        database: String,
        #[source]
        source: sqlx::Error,
    },
}
