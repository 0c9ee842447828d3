//! Output module for run reports and URL lists
//!
//! This module handles:
//! - The JSON run report and its frontier-derived totals
//! - Checkpointing the report and the sorted URL list to disk
//! - Printing statistics from a saved report

mod report;
mod sink;
pub mod stats;
mod traits;

pub use report::{RunReport, RunStatus, Totals};
pub use sink::FileSink;
pub use stats::{load_report, print_statistics};
pub use traits::{NullSink, OutputError, OutputResult, ReportSink};
