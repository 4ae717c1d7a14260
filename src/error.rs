//src/error.rs

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AttritionError>;

/// Everything that can abort a sample. Parse problems and join misses are
/// not errors; they are skipped or counted.
#[derive(Debug, Error)]
pub enum AttritionError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed writing attrition table {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("timed out after {waited:?} waiting for cache lock {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("rank report {path} is not in top-down order: taxon {tax_id} at line {line} has a stale {rank} ancestor")]
    OutOfOrderReport {
        path: PathBuf,
        line: usize,
        tax_id: String,
        rank: char,
    },
}

impl AttritionError {
    pub(crate) fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        AttritionError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Attach a path to a bare `io::Result`.
pub(crate) trait IoContext<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| AttritionError::io(path, e))
    }
}
