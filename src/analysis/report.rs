use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::stats::{mean, pearson, welch_t_test, Alternative, TTestResult};
use crate::dataset::Record;
use crate::rag::formatter::render_rounded;

/// Months in each of the two windows compared by the trend tests.
pub const TREND_WINDOW_MONTHS: usize = 6;

/// Increase the cost investigation set out to confirm, in percent.
pub const CLAIMED_COST_INCREASE_PCT: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    PackageCount,
    DriverHours,
    Mileage,
    FuelUsed,
    DeliveryCost,
    CostPerPackage,
    CostPerMile,
    CostPerHour,
}

impl RecordField {
    pub const COST_DRIVERS: [RecordField; 4] = [
        RecordField::Mileage,
        RecordField::FuelUsed,
        RecordField::DriverHours,
        RecordField::PackageCount,
    ];
    pub const EFFICIENCY: [RecordField; 3] = [
        RecordField::CostPerPackage,
        RecordField::CostPerMile,
        RecordField::CostPerHour,
    ];

    pub fn value(self, record: &Record) -> f64 {
        let m = &record.metrics;
        let e = &record.efficiency;
        match self {
            RecordField::PackageCount => m.package_count,
            RecordField::DriverHours => m.driver_hours,
            RecordField::Mileage => m.mileage,
            RecordField::FuelUsed => m.fuel_used,
            RecordField::DeliveryCost => m.delivery_cost,
            RecordField::CostPerPackage => e.cost_per_package,
            RecordField::CostPerMile => e.cost_per_mile,
            RecordField::CostPerHour => e.cost_per_hour,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RecordField::PackageCount => "package count",
            RecordField::DriverHours => "driver hours",
            RecordField::Mileage => "mileage",
            RecordField::FuelUsed => "fuel used",
            RecordField::DeliveryCost => "delivery cost",
            RecordField::CostPerPackage => "cost per package",
            RecordField::CostPerMile => "cost per mile",
            RecordField::CostPerHour => "cost per hour",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Region,
    Vendor,
}

/// Mean of `field` per calendar month, ordered by month.
pub fn monthly_means(records: &[Record], field: RecordField) -> BTreeMap<NaiveDate, f64> {
    let mut buckets: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for record in records {
        buckets.entry(record.month).or_default().push(field.value(record));
    }
    buckets
        .into_iter()
        .filter_map(|(month, values)| mean(&values).map(|m| (month, m)))
        .collect()
}

pub fn grouped_means(
    records: &[Record],
    key: GroupKey,
    field: RecordField,
) -> BTreeMap<String, f64> {
    let mut buckets: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for record in records {
        let group = match key {
            GroupKey::Region => record.region.as_str(),
            GroupKey::Vendor => record.vendor.as_str(),
        };
        buckets.entry(group).or_default().push(field.value(record));
    }
    buckets
        .into_iter()
        .filter_map(|(group, values)| mean(&values).map(|m| (group.to_string(), m)))
        .collect()
}

/// Pearson correlation of delivery cost with each of `fields`.
pub fn correlations_with_cost(
    records: &[Record],
    fields: &[RecordField],
) -> Vec<(RecordField, Option<f64>)> {
    let cost: Vec<f64> = records.iter().map(|r| r.metrics.delivery_cost).collect();
    fields
        .iter()
        .map(|&field| {
            let values: Vec<f64> = records.iter().map(|r| field.value(r)).collect();
            (field, pearson(&values, &cost))
        })
        .collect()
}

pub fn field_means(records: &[Record], fields: &[RecordField]) -> Vec<(RecordField, Option<f64>)> {
    fields
        .iter()
        .map(|&field| {
            let values: Vec<f64> = records.iter().map(|r| field.value(r)).collect();
            (field, mean(&values))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowComparison {
    pub previous_months: Vec<NaiveDate>,
    pub recent_months: Vec<NaiveDate>,
    pub previous_mean: f64,
    pub recent_mean: f64,
    /// `None` when the previous window averages to zero.
    pub percent_change: Option<f64>,
    /// `None` when the t statistic is undefined (constant windows).
    pub test: Option<TTestResult>,
}

/// Compares the last `window` months of `monthly` against the `window` months
/// before them, testing the recent window against the previous one.
///
/// Needs at least `2 * window` months; returns `None` otherwise.
pub fn compare_recent_windows(
    monthly: &BTreeMap<NaiveDate, f64>,
    window: usize,
    alternative: Alternative,
) -> Option<WindowComparison> {
    if window == 0 || monthly.len() < 2 * window {
        return None;
    }
    let tail: Vec<(NaiveDate, f64)> = monthly
        .iter()
        .skip(monthly.len() - 2 * window)
        .map(|(&month, &value)| (month, value))
        .collect();
    let (previous, recent) = tail.split_at(window);
    let previous_values: Vec<f64> = previous.iter().map(|(_, v)| *v).collect();
    let recent_values: Vec<f64> = recent.iter().map(|(_, v)| *v).collect();

    let previous_mean = mean(&previous_values)?;
    let recent_mean = mean(&recent_values)?;
    let percent_change =
        (previous_mean != 0.0).then(|| (recent_mean - previous_mean) / previous_mean * 100.0);

    Some(WindowComparison {
        previous_months: previous.iter().map(|(m, _)| *m).collect(),
        recent_months: recent.iter().map(|(m, _)| *m).collect(),
        previous_mean,
        recent_mean,
        percent_change,
        test: welch_t_test(&recent_values, &previous_values, alternative),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostReport {
    pub records: usize,
    pub monthly_cost: BTreeMap<NaiveDate, f64>,
    pub monthly_packages: BTreeMap<NaiveDate, f64>,
    pub cost_by_region: BTreeMap<String, f64>,
    pub cost_by_vendor: BTreeMap<String, f64>,
    pub cost_correlations: Vec<(RecordField, Option<f64>)>,
    pub efficiency_means: Vec<(RecordField, Option<f64>)>,
    pub cost_trend: Option<WindowComparison>,
    pub volume_trend: Option<WindowComparison>,
}

pub fn cost_report(records: &[Record]) -> CostReport {
    let monthly_cost = monthly_means(records, RecordField::DeliveryCost);
    let monthly_packages = monthly_means(records, RecordField::PackageCount);
    let cost_trend =
        compare_recent_windows(&monthly_cost, TREND_WINDOW_MONTHS, Alternative::Greater);
    let volume_trend =
        compare_recent_windows(&monthly_packages, TREND_WINDOW_MONTHS, Alternative::TwoSided);
    if cost_trend.is_none() {
        tracing::warn!(
            months = monthly_cost.len(),
            needed = 2 * TREND_WINDOW_MONTHS,
            "not enough months for trend tests"
        );
    }

    CostReport {
        records: records.len(),
        cost_by_region: grouped_means(records, GroupKey::Region, RecordField::DeliveryCost),
        cost_by_vendor: grouped_means(records, GroupKey::Vendor, RecordField::DeliveryCost),
        cost_correlations: correlations_with_cost(records, &RecordField::COST_DRIVERS),
        efficiency_means: field_means(records, &RecordField::EFFICIENCY),
        monthly_cost,
        monthly_packages,
        cost_trend,
        volume_trend,
    }
}

fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| render_rounded(v, decimals))
}

fn write_trend(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    months: usize,
    trend: &Option<WindowComparison>,
) -> fmt::Result {
    writeln!(f, "{title}")?;
    let Some(trend) = trend else {
        // Overlapping windows would share months, so no test is run at all.
        return writeln!(
            f,
            "  not computable: {months} months available, \
             two non-overlapping {w}-month windows need {}",
            2 * TREND_WINDOW_MONTHS,
            w = TREND_WINDOW_MONTHS
        );
    };
    writeln!(
        f,
        "  previous {} months: {}  recent {} months: {}  change: {}%",
        trend.previous_months.len(),
        render_rounded(trend.previous_mean, 2),
        trend.recent_months.len(),
        render_rounded(trend.recent_mean, 2),
        fmt_opt(trend.percent_change, 2)
    )?;
    match &trend.test {
        Some(t) => writeln!(
            f,
            "  Welch t-test ({}): t = {}, df = {}, p = {}",
            t.alternative,
            render_rounded(t.t_statistic, 4),
            render_rounded(t.degrees_of_freedom, 2),
            render_rounded(t.p_value, 4)
        ),
        None => writeln!(f, "  Welch t-test: not computable (constant windows)"),
    }
}

impl fmt::Display for CostReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Delivery cost analysis ({} records)", self.records)?;
        writeln!(f)?;
        writeln!(f, "Monthly averages (cost, packages):")?;
        for (month, cost) in &self.monthly_cost {
            let packages = self.monthly_packages.get(month).copied();
            writeln!(
                f,
                "  {}  ${}  {}",
                month.format("%Y-%m"),
                render_rounded(*cost, 2),
                fmt_opt(packages, 1)
            )?;
        }

        writeln!(f)?;
        writeln!(f, "Average cost by region:")?;
        for (region, cost) in &self.cost_by_region {
            writeln!(f, "  {region}: ${}", render_rounded(*cost, 2))?;
        }
        writeln!(f, "Average cost by vendor:")?;
        for (vendor, cost) in &self.cost_by_vendor {
            writeln!(f, "  {vendor}: ${}", render_rounded(*cost, 2))?;
        }

        writeln!(f)?;
        writeln!(f, "Correlation with delivery cost:")?;
        for (field, r) in &self.cost_correlations {
            writeln!(f, "  {}: {}", field.label(), fmt_opt(*r, 3))?;
        }
        writeln!(f, "Average efficiency:")?;
        for (field, value) in &self.efficiency_means {
            writeln!(f, "  {}: {}", field.label(), fmt_opt(*value, 2))?;
        }

        writeln!(f)?;
        write_trend(
            f,
            "Delivery cost, recent vs previous months:",
            self.monthly_cost.len(),
            &self.cost_trend,
        )?;
        if let Some(change) = self.cost_trend.as_ref().and_then(|t| t.percent_change) {
            writeln!(
                f,
                "  observed {}% against a claimed {}% increase",
                render_rounded(change, 2),
                render_rounded(CLAIMED_COST_INCREASE_PCT, 1)
            )?;
        }
        write_trend(
            f,
            "Package volume, recent vs previous months:",
            self.monthly_packages.len(),
            &self.volume_trend,
        )
    }
}
