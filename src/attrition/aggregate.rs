// src/attrition/aggregate.rs

use std::path::Path;

use ahash::AHashMap;

use crate::classification::ClassificationIndex;
use crate::composition::gc_fraction;
use crate::error::Result;
use crate::fastq::FastqReader;
use crate::lineage::LineageMap;
use crate::types::{LineageCounts, Partition};

/// lineage string -> running counts, shared by both partitions of a sample.
pub type LineageTable = AHashMap<String, LineageCounts>;

/// What happened to the records of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub partition: Partition,
    pub records: u64,
    /// Records that landed in a lineage bucket.
    pub assigned: u64,
    /// Read id absent from the classification index.
    pub unindexed_reads: u64,
    /// Taxid has no genus/species lineage (higher rank, unclassified, unknown).
    pub unlabelled_taxa: u64,
}

impl IngestStats {
    fn new(partition: Partition) -> Self {
        Self {
            partition,
            records: 0,
            assigned: 0,
            unindexed_reads: 0,
            unlabelled_taxa: 0,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.unindexed_reads + self.unlabelled_taxa
    }
}

/// Joins read streams against the classification index and lineage map,
/// accumulating one table across every `ingest` call.
pub struct AttritionAggregator<'a> {
    index: &'a ClassificationIndex,
    lineages: &'a LineageMap,
    table: LineageTable,
}

impl<'a> AttritionAggregator<'a> {
    pub fn new(index: &'a ClassificationIndex, lineages: &'a LineageMap) -> Self {
        Self {
            index,
            lineages,
            table: LineageTable::default(),
        }
    }

    /// Stream every record of `reader` into the table under `partition`.
    /// Records whose read or taxon cannot be resolved are dropped.
    pub fn ingest(&mut self, partition: Partition, reader: &mut FastqReader) -> Result<IngestStats> {
        let mut stats = IngestStats::new(partition);

        while let Some(record) = reader.next_record()? {
            stats.records += 1;

            let Some(taxid) = self.index.taxid(record.read_id()) else {
                stats.unindexed_reads += 1;
                continue;
            };
            let lineage = match self.lineages.get(taxid) {
                Some(l) if !l.is_empty() => l,
                _ => {
                    stats.unlabelled_taxa += 1;
                    continue;
                }
            };

            let gc = gc_fraction(record.seq);
            match self.table.get_mut(lineage.as_str()) {
                Some(counts) => counts.record(partition, gc),
                None => {
                    let mut counts = LineageCounts::default();
                    counts.record(partition, gc);
                    self.table.insert(lineage.clone(), counts);
                }
            }
            stats.assigned += 1;
        }

        log::info!(
            "{} ({}): {} records, {} assigned, {} without classification, {} without genus/species lineage",
            reader.path().display(),
            partition,
            stats.records,
            stats.assigned,
            stats.unindexed_reads,
            stats.unlabelled_taxa
        );
        Ok(stats)
    }

    pub fn ingest_path<P: AsRef<Path>>(&mut self, partition: Partition, path: P) -> Result<IngestStats> {
        let mut reader = FastqReader::open(path)?;
        self.ingest(partition, &mut reader)
    }

    pub fn table(&self) -> &LineageTable {
        &self.table
    }

    pub fn into_table(self) -> LineageTable {
        self.table
    }
}
