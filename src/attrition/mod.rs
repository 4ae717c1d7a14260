pub mod aggregate;
pub mod table;

pub use aggregate::{AttritionAggregator, IngestStats, LineageTable};
pub use table::{attrition_rows, format_decimal, write_attrition_csv, write_attrition_table, HEADER};
