use crate::dataset::loader::{
    DELIVERY_COST_COL, DRIVER_HOURS_COL, FUEL_USED_COL, MILEAGE_COL, PACKAGE_COUNT_COL, REGION_COL,
    VENDOR_COL,
};
use crate::dataset::{FormatError, Record};

/// Natural-language rendering of exactly one [`Record`].
pub type Document = String;

/// Renders `value` rounded to `decimals` places the way a rounded float prints:
/// trailing zeros dropped, but always at least one fractional digit.
/// Non-finite values render as `nan`, `inf` or `-inf`.
pub fn render_rounded(value: f64, decimals: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let fixed = format!("{:.*}", decimals, value);
    match fixed.split_once('.') {
        Some((whole, frac)) => {
            let frac = frac.trim_end_matches('0');
            let frac = if frac.is_empty() { "0" } else { frac };
            let whole = if whole == "-0" { "0" } else { whole };
            format!("{whole}.{frac}")
        }
        None => format!("{fixed}.0"),
    }
}

fn finite(row: usize, field: &'static str, value: f64) -> Result<f64, FormatError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FormatError::InvalidField {
            row,
            field,
            value: value.to_string(),
        })
    }
}

fn non_empty<'a>(row: usize, field: &'static str, value: &'a str) -> Result<&'a str, FormatError> {
    let value = value.trim();
    if value.is_empty() {
        Err(FormatError::MissingField { row, field })
    } else {
        Ok(value)
    }
}

/// Renders one record into the fixed sentence template used for retrieval.
pub fn format_record(record: &Record) -> Result<Document, FormatError> {
    let row = record.source_row;
    let m = &record.metrics;

    let vendor = non_empty(row, VENDOR_COL, &record.vendor)?;
    let region = non_empty(row, REGION_COL, &record.region)?;
    let package_count = finite(row, PACKAGE_COUNT_COL, m.package_count)?;
    if package_count < 0.0 {
        return Err(FormatError::InvalidField {
            row,
            field: PACKAGE_COUNT_COL,
            value: package_count.to_string(),
        });
    }
    let driver_hours = finite(row, DRIVER_HOURS_COL, m.driver_hours)?;
    let mileage = finite(row, MILEAGE_COL, m.mileage)?;
    let fuel_used = finite(row, FUEL_USED_COL, m.fuel_used)?;
    let delivery_cost = finite(row, DELIVERY_COST_COL, m.delivery_cost)?;

    Ok(format!(
        "In {}, Vendor {} handled {} packages in the {} region. \
         The driver worked {} hours, traveled {} miles, and used {} gallons of fuel. \
         The total delivery cost was ${}.",
        record.month.format("%B %Y"),
        vendor,
        package_count.trunc() as u64,
        region,
        render_rounded(driver_hours, 1),
        render_rounded(mileage, 1),
        render_rounded(fuel_used, 1),
        render_rounded(delivery_cost, 2),
    ))
}
