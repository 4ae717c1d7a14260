// src/attrition/table.rs

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{AttritionError, IoContext, Result};
use crate::types::AttritionRow;

use super::LineageTable;

pub const HEADER: [&str; 5] = [
    "Lineage",
    "Total Count",
    "Mapped Read Proportion",
    "Unmapped Read Proportion",
    "Average GC Content",
];

/// Filter by `min_reads`, then order by total descending with the lineage
/// string breaking ties. Lineages with no reads are never emitted.
pub fn attrition_rows(table: &LineageTable, min_reads: u64) -> Vec<AttritionRow> {
    let mut kept: Vec<(&String, &_)> = table
        .iter()
        .filter(|(_, c)| c.total > 0 && c.total >= min_reads)
        .collect();
    kept.sort_by(|(la, ca), (lb, cb)| cb.total.cmp(&ca.total).then_with(|| la.cmp(lb)));

    kept.into_iter()
        .map(|(lineage, c)| AttritionRow {
            lineage: lineage.clone(),
            total: c.total,
            mapped_proportion: c.mapped_proportion(),
            unmapped_proportion: c.unmapped_proportion(),
            average_gc: c.average_gc(),
        })
        .collect()
}

/// Plain decimal in shortest round-trip form, keeping a `.0` on integral values.
pub fn format_decimal(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// Write the header and one CSV row per lineage.
pub fn write_attrition_table<W: Write>(rows: &[AttritionRow], writer: W) -> std::result::Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(HEADER)?;
    for row in rows {
        out.write_record([
            row.lineage.clone(),
            row.total.to_string(),
            format_decimal(row.mapped_proportion),
            format_decimal(row.unmapped_proportion),
            format_decimal(row.average_gc),
        ])?;
    }
    out.flush()?;
    Ok(())
}

/// Write the table to `path`, creating parent directories as needed.
pub fn write_attrition_csv<P: AsRef<Path>>(path: P, rows: &[AttritionRow]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    let file = File::create(path).with_path(path)?;
    write_attrition_table(rows, BufWriter::new(file)).map_err(|source| AttritionError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("wrote {} lineage row(s) to {}", rows.len(), path.display());
    Ok(())
}
