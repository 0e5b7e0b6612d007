pub mod report;
pub mod stats;

pub use report::{cost_report, CostReport, RecordField, WindowComparison};
pub use stats::{welch_t_test, Alternative, TTestResult};
