//! The database seam: where procedure names and bodies come from.

use std::collections::BTreeMap;

use spkeeper_core::ProcedureName;

use crate::error::{FetchError, ListError};

/// A database that stores procedures.
///
/// Implementations are shared read-only across save workers, so every method
/// takes `&self` and must be safe to call from several threads at once.
pub trait ProcedureSource: Sync {
    /// Names of every stored procedure. No ordering is guaranteed.
    fn list_procedure_names(&self) -> Result<Vec<ProcedureName>, ListError>;

    /// Full definition of `name` as ordered text fragments.
    fn fetch_procedure_body(&self, name: &ProcedureName) -> Result<Vec<String>, FetchError>;
}

#[derive(Debug, Clone)]
enum MemoryEntry {
    Body(Vec<String>),
    Malformed(String),
    Unavailable(String),
}

/// In-memory [`ProcedureSource`], listing procedures in name order.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    procedures: BTreeMap<ProcedureName, MemoryEntry>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_procedure<I, F>(mut self, name: &str, fragments: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.set_procedure(name, fragments);
        self
    }

    /// A procedure whose definition row cannot be read.
    pub fn with_malformed(mut self, name: &str, reason: &str) -> Self {
        self.procedures.insert(
            ProcedureName::from(name),
            MemoryEntry::Malformed(reason.to_string()),
        );
        self
    }

    /// A procedure whose fetch query fails outright.
    pub fn with_unavailable(mut self, name: &str, reason: &str) -> Self {
        self.procedures.insert(
            ProcedureName::from(name),
            MemoryEntry::Unavailable(reason.to_string()),
        );
        self
    }

    /// Insert or replace a procedure body.
    pub fn set_procedure<I, F>(&mut self, name: &str, fragments: I)
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.procedures.insert(
            ProcedureName::from(name),
            MemoryEntry::Body(fragments.into_iter().map(Into::into).collect()),
        );
    }
}

impl ProcedureSource for MemorySource {
    fn list_procedure_names(&self) -> Result<Vec<ProcedureName>, ListError> {
        Ok(self.procedures.keys().cloned().collect())
    }

    fn fetch_procedure_body(&self, name: &ProcedureName) -> Result<Vec<String>, FetchError> {
        match self.procedures.get(name) {
            Some(MemoryEntry::Body(fragments)) => Ok(fragments.clone()),
            Some(MemoryEntry::Malformed(reason)) => Err(FetchError::MalformedRow {
                name: name.clone(),
                reason: reason.clone(),
            }),
            Some(MemoryEntry::Unavailable(reason)) => Err(FetchError::Query {
                name: name.clone(),
                source: reason.clone().into(),
            }),
            None => Err(FetchError::Query {
                name: name.clone(),
                source: "no such procedure".into(),
            }),
        }
    }
}
