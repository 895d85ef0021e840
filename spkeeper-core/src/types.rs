//! Domain types shared across spkeeper crates.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of a stored procedure, unique within one database.
///
/// Opaque: no ordering is implied by the source that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcedureName(pub String);

impl ProcedureName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name the procedure is written to: `<name>.sql`.
    pub fn file_name(&self) -> String {
        format!("{}.sql", self.0)
    }

    /// Whether the name can be used as a single path component.
    pub fn is_path_safe(&self) -> bool {
        is_path_component(&self.0)
    }
}

impl fmt::Display for ProcedureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProcedureName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProcedureName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How a procedure whose definition row cannot be read is accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnreadablePolicy {
    /// Count it as a failed procedure.
    #[default]
    Fail,
    /// Log a warning and leave it out of the failure count.
    Warn,
}

impl fmt::Display for UnreadablePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnreadablePolicy::Fail => write!(f, "fail"),
            UnreadablePolicy::Warn => write!(f, "warn"),
        }
    }
}

/// True when `s` is non-empty, is not `.`/`..`, and has no path separator.
pub(crate) fn is_path_component(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\'])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
