//! Multi-stage retry pass over failed URLs
//!
//! | Stage | URLs | Grouping               | Timeout | Delay               | Strategy         |
//! |-------|------|------------------------|---------|---------------------|------------------|
//! | A     | 50   | micro-batches of 5     | 50s     | 0.5s/URL, 1s/batch  | headless-default |
//! | B     | 30   | one at a time          | 45s     | 0.2s                | plain-http       |
//! | C     | 10   | one at a time          | 70s     | 2s                  | headless-default |
//!
//! Each stage takes the URLs that are still failing after the previous one.

use crate::config::{RetryConfig, RetryStageConfig};
use crate::crawler::scheduler::CrawlContext;
use crate::crawler::strategy::Strategy;
use crate::frontier::DiscoverySource;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryStageReport {
    pub stage: String,
    pub strategy: Strategy,
    pub attempted: usize,
    pub recovered: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryReport {
    pub initial_failed: usize,
    pub attempted: usize,
    pub recovered: usize,
    pub still_failed: usize,
    pub new_urls: usize,
    pub stages: Vec<RetryStageReport>,
}

#[derive(Debug, Clone)]
pub struct RetryPass {
    config: RetryConfig,
}

impl RetryPass {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, ctx: &CrawlContext) -> RetryReport {
        let mut report = RetryReport {
            initial_failed: ctx.frontier.lock().await.failed_count(),
            ..Default::default()
        };

        if !self.config.enabled || report.initial_failed == 0 {
            report.still_failed = report.initial_failed;
            return report;
        }

        info!(
            "Retry pass over {} failed URLs (cap {})",
            report.initial_failed,
            self.config.total_cap()
        );

        for (name, stage) in ["A", "B", "C"].into_iter().zip(self.config.stages()) {
            let stage_report = self.run_stage(ctx, name, stage, &mut report).await;
            info!(
                "Retry stage {}: {}/{} recovered",
                name, stage_report.recovered, stage_report.attempted
            );
            report.attempted += stage_report.attempted;
            report.recovered += stage_report.recovered;
            report.stages.push(stage_report);
        }

        report.still_failed = ctx.frontier.lock().await.failed_count();
        report
    }

    async fn run_stage(
        &self,
        ctx: &CrawlContext,
        name: &str,
        stage: &RetryStageConfig,
        report: &mut RetryReport,
    ) -> RetryStageReport {
        let mut stage_report = RetryStageReport {
            stage: name.to_string(),
            strategy: stage.strategy,
            attempted: 0,
            recovered: 0,
        };

        let claimed = {
            let mut frontier = ctx.frontier.lock().await;
            let candidates: Vec<String> = frontier
                .failed_urls()
                .into_iter()
                .take(stage.max_urls)
                .collect();
            frontier.claim_retry(&candidates)
        };
        if claimed.is_empty() {
            return stage_report;
        }

        let profile = ctx
            .ladder
            .profile(stage.strategy)
            .with_timeout(Duration::from_secs(stage.timeout_secs));
        let concurrency = stage.concurrency.max(1);
        let batches: Vec<&[String]> = claimed.chunks(stage.batch_size.max(1)).collect();
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            for group in batch.chunks(concurrency) {
                {
                    let mut frontier = ctx.frontier.lock().await;
                    for url in group {
                        frontier.record_retry(url);
                    }
                }

                let run = ctx
                    .ladder
                    .run_stage(group, &profile, concurrency, &ctx.extractor)
                    .await;
                stage_report.attempted += group.len();

                let mut frontier = ctx.frontier.lock().await;
                for url in group {
                    match run.results.get(url).filter(|r| r.success()) {
                        Some(result) => {
                            frontier.mark_recovered(url);
                            stage_report.recovered += 1;
                            let kept = ctx.filter.retain(&result.extracted_links, Some(url.as_str()));
                            let depth = frontier.depth(url) + 1;
                            report.new_urls += frontier
                                .add_discovered_at(kept, DiscoverySource::Retry, depth)
                                .len();
                            debug!("Recovered {} in retry stage {}", url, name);
                        }
                        None => frontier.mark_crawled(url, false),
                    }
                }
                drop(frontier);

                if stage.per_url_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(stage.per_url_delay_ms)).await;
                }
            }

            if stage.batch_pause_ms > 0 && index + 1 < batch_count {
                tokio::time::sleep(Duration::from_millis(stage.batch_pause_ms)).await;
            }
        }

        stage_report
    }
}
