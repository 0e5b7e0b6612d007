use super::loader::{
    RawRow, DELIVERY_COST_COL, DRIVER_HOURS_COL, FUEL_USED_COL, MILEAGE_COL, MONTH_COL,
    PACKAGE_COUNT_COL, REGION_COL, VENDOR_COL,
};
use super::record::{parse_month, DeliveryMetrics, FormatError, Record};

/// How many cells were filled per numeric column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImputationSummary {
    pub filled: Vec<(&'static str, usize)>,
}

impl ImputationSummary {
    pub fn total(&self) -> usize {
        self.filled.iter().map(|(_, n)| n).sum()
    }
}

fn column_mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0_f64, 0_usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Replaces every missing numeric cell with the mean of the present values in
/// its column. Columns with no values at all are left untouched.
pub fn impute_column_means(rows: &mut [RawRow]) -> ImputationSummary {
    let mut summary = ImputationSummary::default();

    macro_rules! impute {
        ($field:ident, $col:expr) => {
            let mut filled = 0;
            if let Some(mean) = column_mean(rows.iter().map(|r| r.$field)) {
                for row in rows.iter_mut().filter(|r| r.$field.is_none()) {
                    row.$field = Some(mean);
                    filled += 1;
                }
            }
            summary.filled.push(($col, filled));
        };
    }
    impute!(package_count, PACKAGE_COUNT_COL);
    impute!(driver_hours, DRIVER_HOURS_COL);
    impute!(mileage, MILEAGE_COL);
    impute!(fuel_used, FUEL_USED_COL);
    impute!(delivery_cost, DELIVERY_COST_COL);

    summary
}

fn required_text(row: usize, field: &'static str, value: String) -> Result<String, FormatError> {
    if value.is_empty() {
        Err(FormatError::MissingField { row, field })
    } else {
        Ok(value)
    }
}

fn required_number(
    row: usize,
    field: &'static str,
    value: Option<f64>,
) -> Result<f64, FormatError> {
    value.ok_or(FormatError::MissingField { row, field })
}

/// Turns an imputed raw row into an immutable [`Record`].
pub fn build_record(raw: RawRow) -> Result<Record, FormatError> {
    let row = raw.row_index;
    let month_text = required_text(row, MONTH_COL, raw.month)?;
    let month = parse_month(&month_text).ok_or(FormatError::InvalidField {
        row,
        field: MONTH_COL,
        value: month_text,
    })?;

    let metrics = DeliveryMetrics {
        package_count: required_number(row, PACKAGE_COUNT_COL, raw.package_count)?,
        driver_hours: required_number(row, DRIVER_HOURS_COL, raw.driver_hours)?,
        mileage: required_number(row, MILEAGE_COL, raw.mileage)?,
        fuel_used: required_number(row, FUEL_USED_COL, raw.fuel_used)?,
        delivery_cost: required_number(row, DELIVERY_COST_COL, raw.delivery_cost)?,
    };

    Ok(Record::new(
        row,
        month,
        required_text(row, REGION_COL, raw.region)?,
        required_text(row, VENDOR_COL, raw.vendor)?,
        metrics,
    ))
}

pub fn build_records(rows: Vec<RawRow>) -> Result<Vec<Record>, FormatError> {
    rows.into_iter().map(build_record).collect()
}
