//! The JSON run report

use crate::crawler::{RetryReport, SchedulerReport, StageStats, Strategy};
use crate::frontier::{DiscoverySource, FrontierSnapshot};
use crate::phases::PhaseReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }
}

/// Frontier totals at the time the report was written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub discovered: usize,
    pub crawled: usize,
    pub successful: usize,
    pub failed: usize,
    pub pending: usize,
}

impl Totals {
    pub fn from_snapshot(snapshot: &FrontierSnapshot) -> Self {
        let crawled = snapshot.crawled.len();
        let failed = snapshot.failed.len();
        Self {
            discovered: snapshot.discovered.len(),
            crawled,
            successful: crawled - failed,
            failed,
            pending: snapshot.discovered.len() - crawled,
        }
    }
}

/// Everything known about a harvest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub base_url: String,
    pub domain: String,
    pub config_hash: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub totals: Totals,
    pub urls_by_source: BTreeMap<DiscoverySource, usize>,
    pub stage_stats: BTreeMap<Strategy, StageStats>,
    pub phases: Vec<PhaseReport>,
    pub crawl_runs: Vec<SchedulerReport>,
    pub retry: Option<RetryReport>,
}

impl RunReport {
    pub fn new(base_url: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            domain: domain.into(),
            config_hash: None,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            totals: Totals::default(),
            urls_by_source: BTreeMap::new(),
            stage_stats: BTreeMap::new(),
            phases: Vec::new(),
            crawl_runs: Vec::new(),
            retry: None,
        }
    }

    /// Refreshes the frontier-derived fields
    pub fn refresh(&mut self, snapshot: &FrontierSnapshot, stage_stats: BTreeMap<Strategy, StageStats>) {
        self.totals = Totals::from_snapshot(snapshot);
        self.urls_by_source = snapshot.counts_by_source();
        self.stage_stats = stage_stats;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.status = RunStatus::Completed;
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }
}
