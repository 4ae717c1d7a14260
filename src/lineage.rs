//src/lineage.rs

use std::io::BufRead;
use std::path::{Path, PathBuf};

use ahash::AHashMap;

use crate::config::StaleRankPolicy;
use crate::error::{AttritionError, IoContext, Result};
use crate::fastq::open_maybe_gz;
use crate::types::Rank;

/// taxid -> `d__...;k__...;...;g__...(;s__...)`
pub type LineageMap = AHashMap<String, String>;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LineageStats {
    pub rows: usize,
    pub skipped_rows: usize,
    pub lineages: usize,
    /// Genus/species rows that inherited an ancestor from an earlier branch.
    pub stale_lineages: usize,
}

#[derive(Debug, Clone)]
struct Slot {
    label: String,
    /// Row number at which the slot was last written.
    seen_at: usize,
}

/// The rank ladder: most recent qualified label per rank, for one pass over
/// one report. Relies on the report being in top-down, depth-first order.
#[derive(Debug)]
pub struct LineageBuilder {
    ladder: [Option<Slot>; 8],
    policy: StaleRankPolicy,
    source: PathBuf,
    map: LineageMap,
    stats: LineageStats,
}

impl LineageBuilder {
    pub fn new(policy: StaleRankPolicy) -> Self {
        Self {
            ladder: Default::default(),
            policy,
            source: PathBuf::new(),
            map: LineageMap::default(),
            stats: LineageStats::default(),
        }
    }

    /// Path reported in out-of-order errors.
    pub fn with_source<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.source = path.as_ref().to_path_buf();
        self
    }

    /// Feed one report line. Lines with fewer than six tab-separated fields
    /// are skipped.
    pub fn push_line(&mut self, line: &str) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }
        self.stats.rows += 1;
        let row_no = self.stats.rows;

        let parts: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();
        if parts.len() < 6 {
            self.stats.skipped_rows += 1;
            return Ok(());
        }

        let Some(rank) = Rank::from_code(parts[3]) else {
            return Ok(());
        };
        let tax_id = parts[4];
        let name = parts[5].trim();

        self.ladder[rank.index()] = Some(Slot {
            label: format!("{}{}", rank.prefix(), name),
            seen_at: row_no,
        });

        if rank.is_terminal() {
            let lineage = self.join_ladder(rank, tax_id, row_no)?;
            self.map.insert(tax_id.to_string(), lineage);
        }
        Ok(())
    }

    fn join_ladder(&mut self, upto: Rank, tax_id: &str, row_no: usize) -> Result<String> {
        let mut lineage = String::new();
        let mut newest_ancestor = 0usize;
        let mut stale: Option<Rank> = None;

        for rank in Rank::ALL.iter().take(upto.index() + 1) {
            let Some(slot) = &self.ladder[rank.index()] else {
                continue;
            };
            if slot.seen_at < newest_ancestor && stale.is_none() {
                stale = Some(*rank);
            }
            newest_ancestor = newest_ancestor.max(slot.seen_at);

            if !lineage.is_empty() {
                lineage.push(';');
            }
            lineage.push_str(&slot.label);
        }

        if let Some(rank) = stale {
            self.stats.stale_lineages += 1;
            match self.policy {
                StaleRankPolicy::Ignore => {}
                StaleRankPolicy::Warn => log::debug!(
                    "taxon {tax_id} (row {row_no}) carries a stale {} ancestor: {lineage}",
                    rank.code()
                ),
                StaleRankPolicy::Fail => {
                    return Err(AttritionError::OutOfOrderReport {
                        path: self.source.clone(),
                        line: row_no,
                        tax_id: tax_id.to_string(),
                        rank: rank.code(),
                    })
                }
            }
        }
        Ok(lineage)
    }

    pub fn finish(mut self) -> (LineageMap, LineageStats) {
        self.stats.lineages = self.map.len();
        if self.policy == StaleRankPolicy::Warn && self.stats.stale_lineages > 0 {
            log::warn!(
                "{}: {} lineage(s) built from ancestors of an earlier branch; is the report in top-down order?",
                self.source.display(),
                self.stats.stale_lineages
            );
        }
        (self.map, self.stats)
    }
}

/// Build the taxid -> lineage map from any line source.
pub fn build_lineage_map<R: BufRead, P: AsRef<Path>>(
    reader: R,
    source: P,
    policy: StaleRankPolicy,
) -> Result<(LineageMap, LineageStats)> {
    let source = source.as_ref();
    let mut builder = LineageBuilder::new(policy).with_source(source);
    for line_result in reader.lines() {
        let line = line_result.with_path(source)?;
        builder.push_line(&line)?;
    }
    Ok(builder.finish())
}

/// Parse a rank report (plain or `.gz`) into a taxid -> lineage map.
pub fn parse_report<P: AsRef<Path>>(
    path: P,
    policy: StaleRankPolicy,
) -> Result<(LineageMap, LineageStats)> {
    let path = path.as_ref();
    let reader = open_maybe_gz(path)?;
    let (map, stats) = build_lineage_map(reader, path, policy)?;
    log::info!(
        "{}: {} report rows, {} genus/species lineages",
        path.display(),
        stats.rows,
        stats.lineages
    );
    Ok((map, stats))
}
