//! Output sink trait and error types

use crate::frontier::FrontierSnapshot;
use crate::output::report::RunReport;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination for run reports and URL lists
///
/// Called at every phase boundary and once at the end of the run, so
/// implementations must tolerate being written repeatedly.
pub trait ReportSink: Send + Sync {
    fn checkpoint(&self, report: &RunReport, snapshot: &FrontierSnapshot) -> OutputResult<()>;
}

/// Sink that discards everything, used by dry runs and tests
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn checkpoint(&self, _report: &RunReport, _snapshot: &FrontierSnapshot) -> OutputResult<()> {
        Ok(())
    }
}
