// src/lib.rs
pub mod attrition;
pub mod classification;
pub mod composition;
pub mod config;
pub mod error;
pub mod fastq;
pub mod lineage;
pub mod refcache;
pub mod types;

use std::path::{Path, PathBuf};

use crate::attrition::{attrition_rows, write_attrition_csv, AttritionAggregator, IngestStats};
use crate::classification::ClassificationIndex;
use crate::config::AttritionConfig;
use crate::lineage::{parse_report, LineageStats};
use crate::types::{AttritionRow, Partition};

pub use crate::config::{CacheConfig, FingerprintMode, StaleRankPolicy};
pub use crate::error::{AttritionError, Result};
pub use crate::refcache::ReferenceCache;

/// Input and output locations for one sample.
#[derive(Debug, Clone)]
pub struct SampleInputs {
    /// Rank-annotated taxonomy report.
    pub report: PathBuf,
    /// Per-read classification output.
    pub classifications: PathBuf,
    pub mapped_reads: PathBuf,
    pub unmapped_reads: PathBuf,
    /// Where the attrition table is written.
    pub output: PathBuf,
}

/// What `run_sample` did, for logging and callers that want the numbers.
#[derive(Debug, Clone)]
pub struct AttritionSummary {
    pub lineage_stats: LineageStats,
    pub indexed_reads: usize,
    pub mapped: IngestStats,
    pub unmapped: IngestStats,
    pub rows: Vec<AttritionRow>,
    /// Lineages left out by `min_reads`.
    pub filtered_lineages: usize,
    pub output: PathBuf,
}

/// Build the attrition table for one sample: lineages from the report, the
/// read index from the classifications, then the mapped and unmapped reads
/// streamed into one accumulator. Any I/O failure aborts the sample before
/// the table is written.
pub fn run_sample(inputs: &SampleInputs, config: &AttritionConfig) -> Result<AttritionSummary> {
    let (lineages, lineage_stats) = parse_report(&inputs.report, config.stale_ranks)?;
    let index = ClassificationIndex::load(&inputs.classifications, config.classified_only)?;
    if index.is_empty() {
        log::warn!(
            "{}: no reads indexed, the attrition table will be empty",
            inputs.classifications.display()
        );
    }

    let mut aggregator = AttritionAggregator::new(&index, &lineages);
    let mapped = aggregator.ingest_path(Partition::Mapped, &inputs.mapped_reads)?;
    let unmapped = aggregator.ingest_path(Partition::Unmapped, &inputs.unmapped_reads)?;

    let table = aggregator.into_table();
    let rows = attrition_rows(&table, config.min_reads);
    let filtered_lineages = table.len() - rows.len();
    write_attrition_csv(&inputs.output, &rows)?;

    if filtered_lineages > 0 {
        log::info!(
            "{} lineage(s) below {} read(s) left out",
            filtered_lineages,
            config.min_reads
        );
    }

    Ok(AttritionSummary {
        lineage_stats,
        indexed_reads: index.len(),
        mapped,
        unmapped,
        rows,
        filtered_lineages,
        output: inputs.output.clone(),
    })
}

/// `<outdir>/<sample>/<sample>_attrition_lineage.csv`
pub fn default_output_path<P: AsRef<Path>>(outdir: P, sample: &str) -> PathBuf {
    outdir
        .as_ref()
        .join(sample)
        .join(format!("{sample}_attrition_lineage.csv"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_follows_sample_layout() {
        assert_eq!(
            default_output_path("out", "S1"),
            PathBuf::from("out/S1/S1_attrition_lineage.csv")
        );
    }
}
