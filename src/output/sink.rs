//! File-backed report sink

use crate::config::OutputConfig;
use crate::frontier::FrontierSnapshot;
use crate::output::report::RunReport;
use crate::output::traits::{OutputResult, ReportSink};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes the JSON report and the sorted URL list
///
/// Both files are replaced atomically: content goes to a sibling temp file
/// that is then renamed over the target, so readers never see a partial file.
#[derive(Debug, Clone)]
pub struct FileSink {
    report_path: PathBuf,
    urls_path: PathBuf,
}

impl FileSink {
    pub fn new(report_path: impl Into<PathBuf>, urls_path: impl Into<PathBuf>) -> Self {
        Self {
            report_path: report_path.into(),
            urls_path: urls_path.into(),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(&config.report_path, &config.urls_path)
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    pub fn urls_path(&self) -> &Path {
        &self.urls_path
    }
}

impl ReportSink for FileSink {
    fn checkpoint(&self, report: &RunReport, snapshot: &FrontierSnapshot) -> OutputResult<()> {
        let json = serde_json::to_string_pretty(report)?;
        write_atomic(&self.report_path, json.as_bytes())?;

        let mut list = String::new();
        for url in &snapshot.discovered {
            list.push_str(url);
            list.push('\n');
        }
        write_atomic(&self.urls_path, list.as_bytes())?;

        debug!(
            "Checkpoint written: {} URLs to {}",
            snapshot.discovered.len(),
            self.urls_path.display()
        );
        Ok(())
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> OutputResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "output".into());
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}
