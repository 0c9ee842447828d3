//! Discovery phases
//!
//! Each phase is a [`PhaseDriver`]: a discovery technique that produces
//! candidate URLs and feeds them into the shared frontier. Phases that guess
//! URLs (directories, parents, patterns, form queries, LLM suggestions) confirm each
//! guess with a fetch through the ladder before it is kept.

pub mod directory;
pub mod form_search;
pub mod llm;
pub mod parent;
pub mod pattern;
pub mod robots;
pub mod sitemap;

pub use directory::DirectoryPhase;
pub use form_search::FormSearchPhase;
pub use llm::LlmPhase;
pub use parent::ParentPhase;
pub use pattern::PatternPhase;
pub use robots::RobotsPhase;
pub use sitemap::{parse_sitemap, ParsedSitemap, SitemapPhase};

use crate::config::Config;
use crate::crawler::{CrawlContext, FetchResult, PageContent};
use crate::frontier::DiscoverySource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// Summary of one phase run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: String,
    /// URLs this phase added to the frontier
    pub new_urls: usize,
    /// Guessed URLs fetched to check whether they exist
    pub candidates_tested: usize,
    /// Guessed URLs that turned out to exist
    pub candidates_found: usize,
    pub elapsed_secs: f64,
    pub note: Option<String>,
}

impl PhaseReport {
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            new_urls: 0,
            candidates_tested: 0,
            candidates_found: 0,
            elapsed_secs: 0.0,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_secs = elapsed.as_secs_f64();
        self
    }

    /// Folds a probe run into the counters
    pub fn absorb(&mut self, probe: &ProbeOutcome) {
        self.new_urls += probe.new_urls;
        self.candidates_tested += probe.tested;
        self.candidates_found += probe.found;
    }
}

/// A discovery technique feeding the shared frontier
#[async_trait]
pub trait PhaseDriver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Provenance recorded for URLs this phase discovers
    fn source(&self) -> DiscoverySource;

    /// Runs the phase; failures are reported in the result, never raised
    async fn run(&self, ctx: &PhaseContext) -> PhaseReport;
}

/// Counts from [`PhaseContext::probe_candidates`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub tested: usize,
    pub found: usize,
    /// Found candidates plus the new links extracted from them
    pub new_urls: usize,
}

/// Everything a phase needs to reach the frontier and the network
#[derive(Debug)]
pub struct PhaseContext {
    pub crawl: CrawlContext,
    pub base: Url,
    pub config: Arc<Config>,
    sitemaps_seen: Mutex<HashSet<String>>,
}

impl PhaseContext {
    pub fn new(crawl: CrawlContext, base: Url, config: Arc<Config>) -> Self {
        Self {
            crawl,
            base,
            config,
            sitemaps_seen: Mutex::new(HashSet::new()),
        }
    }

    /// The target's host, as used by the filter
    pub fn domain(&self) -> &str {
        self.crawl.filter.domain()
    }

    /// Fetches documents through the ladder without touching the frontier
    pub async fn fetch_documents(&self, urls: &[String]) -> BTreeMap<String, FetchResult> {
        self.crawl
            .ladder
            .fetch_with_escalation(urls, &self.crawl.extractor)
            .await
            .results
    }

    /// Fetches one document through the ladder without touching the frontier
    pub async fn fetch_document(&self, url: &str) -> Option<PageContent> {
        let mut results = self.fetch_documents(&[url.to_string()]).await;
        results
            .remove(url)
            .and_then(|result| match result.outcome {
                crate::crawler::FetchOutcome::Ok(content) => Some(content),
                _ => None,
            })
    }

    /// Filters `urls` and adds them to the frontier without fetching them
    ///
    /// Returns the number of URLs that were new.
    pub async fn add_urls<I, S>(&self, urls: I, source_url: Option<&str>, source: DiscoverySource) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let kept = self.crawl.filter.retain(urls, source_url);
        if kept.is_empty() {
            return 0;
        }
        self.crawl
            .frontier
            .lock()
            .await
            .add_discovered(kept, source)
            .len()
    }

    /// Checks guessed URLs and keeps the ones that exist
    ///
    /// Candidates are filtered and already-known URLs skipped. The rest are
    /// claimed and fetched through the ladder in chunks. A candidate that
    /// fetches successfully is recorded as crawled along with the links found
    /// on it; one that does not is dropped from the frontier again.
    pub async fn probe_candidates<I, S>(&self, candidates: I, source: DiscoverySource) -> ProbeOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut outcome = ProbeOutcome::default();
        let filtered = self.crawl.filter.retain(candidates, None);
        let fresh: Vec<String> = {
            let frontier = self.crawl.frontier.lock().await;
            filtered
                .into_iter()
                .filter(|url| !frontier.contains(url))
                .collect()
        };
        if fresh.is_empty() {
            return outcome;
        }

        let chunk_size = self.config.phases.probe_batch_size.max(1);
        for chunk in fresh.chunks(chunk_size) {
            let claimed = self.crawl.frontier.lock().await.claim_as(chunk, source);
            if claimed.is_empty() {
                continue;
            }

            let results = self.fetch_documents(&claimed).await;
            outcome.tested += claimed.len();

            let mut frontier = self.crawl.frontier.lock().await;
            for url in &claimed {
                match results.get(url).filter(|r| r.success()) {
                    Some(result) => {
                        outcome.found += 1;
                        outcome.new_urls += 1;
                        frontier.mark_crawled(url, true);
                        let kept = self
                            .crawl
                            .filter
                            .retain(&result.extracted_links, Some(url.as_str()));
                        outcome.new_urls += frontier.add_discovered_at(kept, source, 1).len();
                    }
                    None => {
                        frontier.release(url);
                        frontier.forget_unconfirmed(url, source);
                    }
                }
            }
            debug!(
                "Probed {} candidates, {} found so far",
                outcome.tested, outcome.found
            );
        }
        outcome
    }

    /// Snapshot of every discovered URL
    pub async fn discovered_urls(&self) -> Vec<String> {
        self.crawl.frontier.lock().await.sorted_urls()
    }

    /// Crawled URLs that fetched successfully
    pub async fn successful_urls(&self) -> Vec<String> {
        self.crawl.frontier.lock().await.successful_urls()
    }

    /// Records a sitemap document as visited; false if it already was
    pub async fn mark_sitemap_seen(&self, url: &str) -> bool {
        self.sitemaps_seen.lock().await.insert(url.to_string())
    }
}

/// Runs `driver` and stamps its report with the elapsed time
pub async fn run_timed(driver: &dyn PhaseDriver, ctx: &PhaseContext) -> PhaseReport {
    let started = Instant::now();
    let report = driver.run(ctx).await;
    report.with_elapsed(started.elapsed())
}
