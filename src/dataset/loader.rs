use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::path::Path;

// Expected column headers
pub const MONTH_COL: &str = "Month";
pub const REGION_COL: &str = "Region";
pub const VENDOR_COL: &str = "Vendor";
pub const PACKAGE_COUNT_COL: &str = "Package_Count";
pub const DRIVER_HOURS_COL: &str = "Driver_Hours";
pub const MILEAGE_COL: &str = "Mileage";
pub const FUEL_USED_COL: &str = "Fuel_Used";
pub const DELIVERY_COST_COL: &str = "Delivery_Cost";

/// One CSV row as read from disk, before imputation. Numeric cells that are
/// empty or unparseable are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub row_index: usize,
    pub month: String,
    pub region: String,
    pub vendor: String,
    pub package_count: Option<f64>,
    pub driver_hours: Option<f64>,
    pub mileage: Option<f64>,
    pub fuel_used: Option<f64>,
    pub delivery_cost: Option<f64>,
}

fn parse_optional_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn column_index(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| anyhow::anyhow!("Column '{}' not found", name))
}

pub fn load_delivery_rows(csv_path: &Path) -> Result<Vec<RawRow>> {
    if !csv_path.exists() {
        return Err(anyhow::anyhow!("Delivery dataset not found at: {:?}", csv_path));
    }

    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open delivery dataset at {:?}", csv_path))?;
    let mut rdr = ReaderBuilder::new().has_headers(true).flexible(true).from_reader(file);

    let headers = rdr.headers()?.clone();

    let month_idx = column_index(&headers, MONTH_COL)?;
    let region_idx = column_index(&headers, REGION_COL)?;
    let vendor_idx = column_index(&headers, VENDOR_COL)?;
    let package_idx = column_index(&headers, PACKAGE_COUNT_COL)?;
    let hours_idx = column_index(&headers, DRIVER_HOURS_COL)?;
    let mileage_idx = column_index(&headers, MILEAGE_COL)?;
    let fuel_idx = column_index(&headers, FUEL_USED_COL)?;
    let cost_idx = column_index(&headers, DELIVERY_COST_COL)?;

    let mut rows = Vec::new();
    for (row_index, result) in rdr.records().enumerate() {
        let record = result
            .with_context(|| format!("Failed to read record at row index {}", row_index))?;
        let text = |idx: usize| record.get(idx).unwrap_or("").trim().to_string();
        let number = |idx: usize| record.get(idx).and_then(parse_optional_f64);

        rows.push(RawRow {
            row_index,
            month: text(month_idx),
            region: text(region_idx),
            vendor: text(vendor_idx),
            package_count: number(package_idx),
            driver_hours: number(hours_idx),
            mileage: number(mileage_idx),
            fuel_used: number(fuel_idx),
            delivery_cost: number(cost_idx),
        });
    }

    if rows.is_empty() {
        return Err(anyhow::anyhow!("No delivery rows loaded from {:?}", csv_path));
    }

    tracing::debug!(rows = rows.len(), path = ?csv_path, "loaded delivery rows");
    Ok(rows)
}
