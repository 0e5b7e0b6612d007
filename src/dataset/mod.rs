pub mod cleaning;
pub mod loader;
pub mod record;

pub use cleaning::{build_records, impute_column_means, ImputationSummary};
pub use loader::{load_delivery_rows, RawRow};
pub use record::{parse_month, CostEfficiency, DeliveryMetrics, FormatError, Record};

use anyhow::{Context, Result};
use std::path::Path;

/// Loads the CSV, imputes numeric gaps and builds the cleaned record set.
pub fn load_records(csv_path: &Path) -> Result<Vec<Record>> {
    let mut rows = load_delivery_rows(csv_path)?;
    let summary = impute_column_means(&mut rows);
    for (column, filled) in summary.filled.iter().filter(|(_, n)| *n > 0) {
        tracing::debug!(column, filled, "imputed missing values with column mean");
    }
    if summary.total() > 0 {
        tracing::info!(cells = summary.total(), "filled missing numeric cells with column means");
    }

    let records = build_records(rows)
        .with_context(|| format!("Failed to build records from {:?}", csv_path))?;
    tracing::info!(records = records.len(), "delivery records ready");
    Ok(records)
}
