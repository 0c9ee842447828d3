//! Crawler module for page fetching and recursive link following
//!
//! This module contains the core crawling logic, including:
//! - The fetch escalation ladder and its pluggable engines
//! - Content validation and link extraction
//! - Adaptive batch scheduling driven by site health
//! - The multi-stage retry pass
//! - Overall harvest coordination

mod coordinator;
mod engine;
mod extractor;
mod health;
mod ladder;
mod retry;
mod scheduler;
mod strategy;
mod validity;

pub use coordinator::Coordinator;
pub use engine::{build_http_client, EngineError, EngineResponse, FetchEngine, HttpEngine};
pub use extractor::{resolve_link, LinkExtractor};
pub use health::{
    BatchSample, BatchSizer, HealthTracker, MemoryProbe, ProcMemoryProbe, SizeChange,
};
pub use ladder::{EscalationLadder, LadderOutcome, StageRun, StageStats};
pub use retry::{RetryPass, RetryReport, RetryStageReport};
pub use scheduler::{AdaptiveScheduler, CrawlBudget, CrawlContext, SchedulerReport, StopReason};
pub use strategy::{ordered_strategies, EscalationMode, StageProfile, Strategy};
pub use validity::{ContentValidator, FetchOutcome, FetchResult, PageContent, RejectReason};

use crate::config::Config;
use crate::output::RunReport;

/// Runs a complete harvest with the built-in HTTP engine
///
/// This is the main entry point for a harvest. It will:
/// 1. Build the filter, ladder and shared frontier
/// 2. Run every enabled discovery phase in order
/// 3. Crawl whatever is still pending and retry failures
/// 4. Write the run report and URL list
pub async fn harvest(config: Config, config_hash: Option<String>) -> crate::Result<RunReport> {
    let mut coordinator = Coordinator::new(config)?.with_config_hash(config_hash);
    coordinator.run().await
}
