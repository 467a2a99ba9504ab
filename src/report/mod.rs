//! Report aggregation
//! - tested_range.rs: tested version ranges and their CSV store
//! - summary.rs: per-group pass/fail summary, rendered as JUnit XML
//! - error.rs: ReportError

pub mod error;
pub mod summary;
pub mod tested_range;

pub use error::ReportError;
pub use summary::{CaseRecord, CaseStatus, SuiteSummary, SummaryReport};
pub use tested_range::{RangeKey, RangeReport, TestedRange};
