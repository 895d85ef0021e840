//! spkeeper core library — domain types, configuration, errors.
//!
//! - [`types`] — newtypes and small domain enums
//! - [`config`] — layered [`Config`] loading and validation
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, DbConfig, OutputConfig, PartialConfig};
pub use error::ConfigError;
pub use types::{ProcedureName, UnreadablePolicy};
