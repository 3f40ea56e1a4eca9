//! Report building: the per-term pivot table, its spreadsheet flattening
//! and the per-subject student summary.

pub mod aggregate;
pub mod sheet;
pub mod summary;
pub mod tabular;

pub use aggregate::{build_report, ReportRequest};
pub use sheet::Sheet;
pub use summary::{student_summary, SummaryRequest};
pub use tabular::TabularOutput;
