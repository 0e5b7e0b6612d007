use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a row cannot be turned into a well-formed record or document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("row {row}: required field '{field}' is missing")]
    MissingField { row: usize, field: &'static str },
    #[error("row {row}: field '{field}' has invalid value '{value}'")]
    InvalidField {
        row: usize,
        field: &'static str,
        value: String,
    },
}

/// Raw operational measurements of one delivery record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeliveryMetrics {
    pub package_count: f64,
    pub driver_hours: f64,
    pub mileage: f64,
    pub fuel_used: f64,
    pub delivery_cost: f64,
}

/// Per-unit cost features derived from [`DeliveryMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostEfficiency {
    pub cost_per_package: f64,
    pub cost_per_mile: f64,
    pub cost_per_hour: f64,
}

impl CostEfficiency {
    pub fn derive(metrics: &DeliveryMetrics) -> Self {
        Self {
            cost_per_package: metrics.delivery_cost / metrics.package_count,
            cost_per_mile: metrics.delivery_cost / metrics.mileage,
            cost_per_hour: metrics.delivery_cost / metrics.driver_hours,
        }
    }
}

/// One cleaned delivery observation. `month` is always the first day of the month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub source_row: usize,
    pub month: NaiveDate,
    pub region: String,
    pub vendor: String,
    pub metrics: DeliveryMetrics,
    pub efficiency: CostEfficiency,
}

impl Record {
    pub fn new(
        source_row: usize,
        month: NaiveDate,
        region: impl Into<String>,
        vendor: impl Into<String>,
        metrics: DeliveryMetrics,
    ) -> Self {
        Self {
            source_row,
            month,
            region: region.into(),
            vendor: vendor.into(),
            efficiency: CostEfficiency::derive(&metrics),
            metrics,
        }
    }
}

// Formats tried in order; day-less formats get a day appended before parsing.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d %B %Y", "%d %b %Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parses the dataset's `Month` column and normalizes it to the first of the month.
pub fn parse_month(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let candidates = [raw.to_string(), format!("{raw}-01"), format!("1 {raw}")];
    let parsed = candidates.iter().find_map(|candidate| {
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(candidate, fmt).ok())
    });
    let parsed = parsed.or_else(|| {
        DATETIME_FORMATS.iter().find_map(|fmt| {
            chrono::NaiveDateTime::parse_from_str(raw, fmt)
                .ok()
                .map(|dt| dt.date())
        })
    })?;

    parsed.with_day(1)
}
