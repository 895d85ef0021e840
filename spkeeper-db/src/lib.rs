//! # spkeeper-db
//!
//! MySQL-backed [`ProcedureSource`](spkeeper_sync::ProcedureSource).

mod error;
pub mod mysql;

pub use error::DbError;
pub use mysql::MySqlSource;
