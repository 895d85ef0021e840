//! Fetch-and-write of a single procedure.
//!
//! 1. Reject names that cannot be a single file name.
//! 2. Fetch the whole body from the source.
//! 3. Create/truncate `<dir>/<name>.sql`.
//! 4. Write every fragment verbatim, in order, through a buffer.
//! 5. Flush.
//!
//! The fetch happens before the file is opened: a failed fetch leaves any
//! previous version of the file untouched.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use spkeeper_core::ProcedureName;

use crate::error::SaveError;
use crate::source::ProcedureSource;

/// Fetch `name` from `source` and write it to `<dir>/<name>.sql`.
///
/// Returns the path written.
pub fn save_procedure<S>(source: &S, name: &ProcedureName, dir: &Path) -> Result<PathBuf, SaveError>
where
    S: ProcedureSource + ?Sized,
{
    if !name.is_path_safe() {
        return Err(SaveError::InvalidName { name: name.clone() });
    }

    let fragments = source.fetch_procedure_body(name)?;
    let path = dir.join(name.file_name());

    tracing::info!(procedure = %name, path = %path.display(), "writing procedure");
    write_fragments(&path, &fragments).map_err(|e| SaveError::Io {
        path: path.clone(),
        source: e,
    })?;
    Ok(path)
}

fn write_fragments(path: &Path, fragments: &[String]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    for fragment in fragments {
        w.write_all(fragment.as_bytes())?;
    }
    w.flush()
}
