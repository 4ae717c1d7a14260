//src/classification.rs

use std::io::BufRead;
use std::path::Path;

use ahash::AHashMap;

use crate::error::{IoContext, Result};
use crate::fastq::{normalize_read_id, open_maybe_gz};

/// Status flag the classifier writes for reads it assigned to a taxon.
pub const CLASSIFIED: &str = "C";

/// Normalized read id -> taxid, fully materialized before any read stream is
/// scanned so that lookups during streaming are O(1).
#[derive(Debug, Default, Clone)]
pub struct ClassificationIndex {
    read_to_taxid: AHashMap<String, String>,
}

impl ClassificationIndex {
    /// Build from the classifier's per-read output:
    /// ```text
    /// <C|U>\t<read header>\t<taxid>\t...
    /// ```
    /// Rows with fewer than three fields are skipped. A repeated read id
    /// replaces the earlier assignment.
    pub fn from_reader<R: BufRead, P: AsRef<Path>>(
        reader: R,
        source: P,
        classified_only: bool,
    ) -> Result<Self> {
        let source = source.as_ref();
        let mut read_to_taxid = AHashMap::new();

        for line_result in reader.lines() {
            let line = line_result.with_path(source)?;
            if line.trim().is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.trim_end_matches('\r').split('\t').collect();
            if parts.len() < 3 {
                continue;
            }
            if classified_only && parts[0] != CLASSIFIED {
                continue;
            }
            let read_id = normalize_read_id(parts[1]);
            read_to_taxid.insert(read_id.to_string(), parts[2].to_string());
        }

        Ok(Self { read_to_taxid })
    }

    /// Load a classification file, plain or `.gz`.
    pub fn load<P: AsRef<Path>>(path: P, classified_only: bool) -> Result<Self> {
        let path = path.as_ref();
        let index = Self::from_reader(open_maybe_gz(path)?, path, classified_only)?;
        log::info!(
            "{}: indexed {} read(s){}",
            path.display(),
            index.len(),
            if classified_only { " (classified only)" } else { "" }
        );
        Ok(index)
    }

    pub fn taxid(&self, read_id: &str) -> Option<&str> {
        self.read_to_taxid.get(read_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.read_to_taxid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_to_taxid.is_empty()
    }

    pub fn read_ids(&self) -> impl Iterator<Item = &str> {
        self.read_to_taxid.keys().map(String::as_str)
    }
}
