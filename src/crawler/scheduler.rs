//! Adaptive batch scheduler for recursive crawling
//!
//! This module handles:
//! - The breadth-first work queue of `(url, depth)` pairs
//! - Claiming batches in the shared frontier before fetching
//! - Feeding extracted links back into the frontier and the queue
//! - Page, depth and stagnation budgets
//! - Batch sizing driven by [`BatchSizer`]

use crate::config::SchedulerConfig;
use crate::crawler::extractor::LinkExtractor;
use crate::crawler::health::{BatchSample, BatchSizer, MemoryProbe};
use crate::crawler::ladder::EscalationLadder;
use crate::frontier::{DiscoverySource, SharedFrontier};
use crate::url::UrlFilter;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Shared pieces every crawl-like operation needs
#[derive(Debug, Clone)]
pub struct CrawlContext {
    pub frontier: SharedFrontier,
    pub ladder: Arc<EscalationLadder>,
    pub extractor: Arc<LinkExtractor>,
    pub filter: Arc<UrlFilter>,
}

/// Limits for one scheduler run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlBudget {
    /// Stop once the frontier holds this many crawled URLs
    pub max_pages: usize,
    /// Links found deeper than this are recorded but not fetched
    pub max_depth: u32,
    /// A batch with no new URLs ends the run when fewer than this remain queued
    pub stagnation_threshold: usize,
}

impl From<&SchedulerConfig> for CrawlBudget {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            max_depth: config.max_depth,
            stagnation_threshold: config.stagnation_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    #[default]
    QueueEmpty,
    MaxPages,
    Stagnation,
}

/// Summary of one scheduler run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerReport {
    pub batches: usize,
    pub urls_fetched: usize,
    pub successes: usize,
    pub failures: usize,
    pub new_urls: usize,
    /// URLs discovered beyond `max-depth` and left unfetched
    pub depth_limited: usize,
    pub final_batch_size: usize,
    pub emergency_activations: usize,
    pub last_health: f64,
    pub stop_reason: StopReason,
}

/// Breadth-first crawler that adapts its batch size to site health
#[derive(Debug)]
pub struct AdaptiveScheduler {
    sizer: BatchSizer,
    batches_run: usize,
}

impl AdaptiveScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            sizer: BatchSizer::new(config),
            batches_run: 0,
        }
    }

    pub fn with_memory_probe(config: SchedulerConfig, memory: Box<dyn MemoryProbe>) -> Self {
        Self {
            sizer: BatchSizer::with_memory_probe(config, memory),
            batches_run: 0,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.sizer.size()
    }

    /// Batches run over the scheduler's lifetime; sizing state carries over between runs
    pub fn batches_run(&self) -> usize {
        self.batches_run
    }

    /// Crawls everything pending in the frontier until a budget is hit
    pub async fn run(&mut self, ctx: &CrawlContext, budget: CrawlBudget) -> SchedulerReport {
        let mut report = SchedulerReport::default();
        let activations_before = self.sizer.emergency_activations();

        let (within, held_back): (Vec<(String, u32)>, Vec<(String, u32)>) = ctx
            .frontier
            .lock()
            .await
            .pending_with_depth()
            .into_iter()
            .partition(|(_, depth)| *depth <= budget.max_depth);
        let mut queue = VecDeque::from(within);
        info!(
            "Recursive crawl starting with {} queued URLs ({} beyond max depth)",
            queue.len(),
            held_back.len()
        );

        loop {
            if queue.is_empty() {
                report.stop_reason = StopReason::QueueEmpty;
                break;
            }

            let crawled = ctx.frontier.lock().await.crawled_count();
            if crawled >= budget.max_pages {
                info!("Page budget of {} reached", budget.max_pages);
                report.stop_reason = StopReason::MaxPages;
                break;
            }
            let take = self.sizer.size().min(budget.max_pages - crawled).max(1);

            let mut candidates: Vec<(String, u32)> = Vec::with_capacity(take);
            let mut seen = HashSet::new();
            while candidates.len() < take {
                match queue.pop_front() {
                    Some((url, depth)) => {
                        if seen.insert(url.clone()) {
                            candidates.push((url, depth));
                        }
                    }
                    None => break,
                }
            }

            let claimed = {
                let mut frontier = ctx.frontier.lock().await;
                frontier.claim(candidates.iter().map(|(url, _)| url.as_str()))
            };
            if claimed.is_empty() {
                continue;
            }
            let claimed_set: HashSet<&str> = claimed.iter().map(|s| s.as_str()).collect();
            let batch: Vec<(String, u32)> = candidates
                .into_iter()
                .filter(|(url, _)| claimed_set.contains(url.as_str()))
                .collect();

            self.batches_run += 1;
            report.batches += 1;
            let started = Instant::now();
            let outcome = ctx
                .ladder
                .fetch_with_escalation(&claimed, &ctx.extractor)
                .await;
            let elapsed = started.elapsed();

            let mut successes = 0;
            let mut new_in_batch = 0;
            {
                let mut frontier = ctx.frontier.lock().await;
                for (url, depth) in &batch {
                    let result = outcome.results.get(url);
                    let success = result.is_some_and(|r| r.success());

                    if let Some(result) = result.filter(|r| r.success()) {
                        successes += 1;
                        let kept = ctx.filter.retain(&result.extracted_links, Some(url.as_str()));
                        let child_depth = depth + 1;
                        let delta =
                            frontier.add_discovered_at(kept, DiscoverySource::Crawl, child_depth);
                        new_in_batch += delta.len();

                        if child_depth <= budget.max_depth {
                            queue.extend(delta.into_iter().map(|u| (u, child_depth)));
                        } else {
                            report.depth_limited += delta.len();
                        }
                    }
                    frontier.mark_crawled(url, success);
                }
            }

            let failures = batch.len() - successes;
            report.urls_fetched += batch.len();
            report.successes += successes;
            report.failures += failures;
            report.new_urls += new_in_batch;

            let sample = BatchSample {
                success_rate: successes as f64 / batch.len() as f64,
                elapsed,
                failure_count: failures,
            };
            let change = self.sizer.observe(self.batches_run, sample);
            info!(
                "Batch {}: {}/{} ok, {} new URLs, {} queued, {:.1}s, next size {}",
                self.batches_run,
                successes,
                batch.len(),
                new_in_batch,
                queue.len(),
                elapsed.as_secs_f64(),
                self.sizer.size()
            );
            debug!(
                "Sizer: {:?}, health {:.2}",
                change,
                self.sizer.last_health()
            );

            if new_in_batch == 0 && !queue.is_empty() && queue.len() < budget.stagnation_threshold {
                info!(
                    "No new URLs and only {} queued: stopping crawl",
                    queue.len()
                );
                report.stop_reason = StopReason::Stagnation;
                break;
            }
        }

        report.final_batch_size = self.sizer.size();
        report.emergency_activations = self.sizer.emergency_activations() - activations_before;
        report.last_health = self.sizer.last_health();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilterConfig, LadderConfig};
    use crate::crawler::engine::{EngineError, EngineResponse, FetchEngine};
    use crate::crawler::strategy::{StageProfile, Strategy};
    use crate::frontier::{self, FrontierStore, UrlState};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Serves a fixed link graph over plain HTTP only
    struct GraphEngine {
        pages: HashMap<String, Vec<String>>,
    }

    #[async_trait]
    impl FetchEngine for GraphEngine {
        async fn prepare(&self, _profile: &StageProfile) -> Result<(), EngineError> {
            Ok(())
        }

        async fn fetch(
            &self,
            url: &str,
            _profile: &StageProfile,
        ) -> Result<EngineResponse, EngineError> {
            match self.pages.get(url) {
                Some(links) => {
                    let anchors: String = links
                        .iter()
                        .map(|l| format!("<a href=\"{}\">link</a>", l))
                        .collect();
                    Ok(EngineResponse {
                        status_code: 200,
                        content: format!("<html><body>{}{}</body></html>", anchors, "x".repeat(120)),
                        markdown: None,
                        links: Vec::new(),
                    })
                }
                None => Ok(EngineResponse {
                    status_code: 500,
                    content: String::new(),
                    markdown: None,
                    links: Vec::new(),
                }),
            }
        }
    }

    fn u(path: &str) -> String {
        format!("https://example.test{}", path)
    }

    fn context(pages: &[(&str, &[&str])]) -> CrawlContext {
        let pages = pages
            .iter()
            .map(|(page, links)| (u(page), links.iter().map(|l| u(l)).collect()))
            .collect();
        let mut ladder_config = LadderConfig::default();
        ladder_config.strategies = vec![Strategy::PlainHttp];

        let mut store = FrontierStore::new();
        store.add_discovered([u("/")], DiscoverySource::Seed);

        CrawlContext {
            frontier: frontier::shared(store),
            ladder: Arc::new(EscalationLadder::with_engine(
                &ladder_config,
                Arc::new(GraphEngine { pages }),
            )),
            extractor: Arc::new(LinkExtractor::new()),
            filter: Arc::new(UrlFilter::new("example.test", FilterConfig::default())),
        }
    }

    fn budget() -> CrawlBudget {
        CrawlBudget::from(&SchedulerConfig::default())
    }

    #[tokio::test]
    async fn test_crawls_link_graph() {
        let ctx = context(&[
            ("/", &["/a.html", "/b.html"]),
            ("/a.html", &["/c.html", "/logo.png"]),
            ("/b.html", &["/a.html"]),
            ("/c.html", &[]),
        ]);
        let mut scheduler = AdaptiveScheduler::new(SchedulerConfig::default());
        let report = scheduler.run(&ctx, budget()).await;

        assert_eq!(report.stop_reason, StopReason::QueueEmpty);
        assert_eq!(report.urls_fetched, 4);
        assert_eq!(report.failures, 0);
        assert_eq!(report.new_urls, 3);

        let frontier = ctx.frontier.lock().await;
        assert_eq!(frontier.len(), 4);
        assert_eq!(frontier.crawled_count(), 4);
        assert_eq!(frontier.state(&u("/c.html")), UrlState::Crawled);
        assert!(frontier.pending().is_empty());
    }

    #[tokio::test]
    async fn test_failed_pages_are_marked() {
        let ctx = context(&[("/", &["/missing.html"])]);
        let mut scheduler = AdaptiveScheduler::new(SchedulerConfig::default());
        let report = scheduler.run(&ctx, budget()).await;

        assert_eq!(report.failures, 1);
        let frontier = ctx.frontier.lock().await;
        assert_eq!(frontier.state(&u("/missing.html")), UrlState::Failed);
        assert_eq!(frontier.failed_urls(), vec![u("/missing.html")]);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let ctx = context(&[
            ("/", &["/1.html"]),
            ("/1.html", &["/2.html"]),
            ("/2.html", &["/3.html"]),
        ]);
        let mut scheduler = AdaptiveScheduler::new(SchedulerConfig::default());
        let mut budget = budget();
        budget.max_depth = 1;
        let report = scheduler.run(&ctx, budget).await;

        assert_eq!(report.depth_limited, 1);
        let frontier = ctx.frontier.lock().await;
        assert_eq!(frontier.state(&u("/1.html")), UrlState::Crawled);
        assert_eq!(frontier.state(&u("/2.html")), UrlState::Queued);
        assert_eq!(frontier.state(&u("/3.html")), UrlState::Unknown);
    }

    #[tokio::test]
    async fn test_page_budget() {
        let links: Vec<String> = (0..20).map(|i| format!("/p{}.html", i)).collect();
        let link_refs: Vec<&str> = links.iter().map(|s| s.as_str()).collect();
        let ctx = context(&[("/", &link_refs)]);

        let mut config = SchedulerConfig::default();
        config.min_batch_size = 1;
        config.initial_batch_size = 4;
        let mut scheduler = AdaptiveScheduler::new(config.clone());
        let mut budget = CrawlBudget::from(&config);
        budget.max_pages = 6;
        let report = scheduler.run(&ctx, budget).await;

        assert_eq!(report.stop_reason, StopReason::MaxPages);
        assert_eq!(ctx.frontier.lock().await.crawled_count(), 6);
    }

    #[tokio::test]
    async fn test_stagnation_stop() {
        let ctx = context(&[("/", &["/a.html", "/b.html"]), ("/a.html", &[]), ("/b.html", &[])]);
        let mut config = SchedulerConfig::default();
        config.min_batch_size = 1;
        config.initial_batch_size = 1;
        let mut scheduler = AdaptiveScheduler::new(config.clone());
        let report = scheduler.run(&ctx, CrawlBudget::from(&config)).await;

        // batch 1 finds a and b, batch 2 finds nothing with one URL left
        assert_eq!(report.stop_reason, StopReason::Stagnation);
        assert_eq!(report.batches, 2);
        let frontier = ctx.frontier.lock().await;
        assert_eq!(frontier.state(&u("/b.html")), UrlState::Queued);
    }

    #[tokio::test]
    async fn test_skips_urls_claimed_elsewhere() {
        let ctx = context(&[("/", &[]), ("/other.html", &[])]);
        {
            let mut frontier = ctx.frontier.lock().await;
            frontier.add_discovered([u("/other.html")], DiscoverySource::Sitemap);
            frontier.claim([u("/other.html")]);
        }
        let mut scheduler = AdaptiveScheduler::new(SchedulerConfig::default());
        let report = scheduler.run(&ctx, budget()).await;

        assert_eq!(report.urls_fetched, 1);
        let frontier = ctx.frontier.lock().await;
        assert_eq!(frontier.state(&u("/other.html")), UrlState::InFlight);
    }

    #[tokio::test]
    async fn test_depth_limit_holds_across_runs() {
        let ctx = context(&[
            ("/", &["/1.html"]),
            ("/1.html", &["/2.html"]),
            ("/2.html", &["/3.html"]),
            ("/3.html", &[]),
        ]);
        let mut scheduler = AdaptiveScheduler::new(SchedulerConfig::default());
        let mut budget = budget();
        budget.max_depth = 1;

        scheduler.run(&ctx, budget).await;
        let second = scheduler.run(&ctx, budget).await;

        assert_eq!(second.urls_fetched, 0);
        let frontier = ctx.frontier.lock().await;
        assert_eq!(frontier.state(&u("/1.html")), UrlState::Crawled);
        assert_eq!(frontier.state(&u("/2.html")), UrlState::Queued);
        assert_eq!(frontier.depth(&u("/2.html")), 2);
        assert_eq!(frontier.state(&u("/3.html")), UrlState::Unknown);
    }
}
