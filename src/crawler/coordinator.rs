//! Harvest coordinator - runs every discovery phase against one frontier
//!
//! This module owns the run-wide pieces and sequences the work:
//! - Building the filter, ladder, extractor and shared frontier
//! - Seeding the frontier with the base URL
//! - Running the enabled phases in order, each under an optional time limit
//! - Crawling what the phases found, then retrying failures
//! - Writing a checkpoint through the report sink after every step

use crate::config::{validate, Config};
use crate::crawler::engine::{FetchEngine, HttpEngine};
use crate::crawler::extractor::LinkExtractor;
use crate::crawler::ladder::EscalationLadder;
use crate::crawler::retry::RetryPass;
use crate::crawler::scheduler::{AdaptiveScheduler, CrawlBudget, CrawlContext};
use crate::frontier::{self, DiscoverySource, FrontierStore, SharedFrontier};
use crate::llm::{client_from_config, LlmClient};
use crate::output::{FileSink, ReportSink, RunReport};
use crate::phases::{
    run_timed, DirectoryPhase, FormSearchPhase, LlmPhase, ParentPhase, PatternPhase,
    PhaseContext, PhaseDriver, PhaseReport, RobotsPhase, SitemapPhase,
};
use crate::url::{extract_domain, normalize_str, UrlFilter};
use crate::ConfigError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use url::Url;

/// Main harvest coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    ctx: PhaseContext,
    scheduler: AdaptiveScheduler,
    sink: Box<dyn ReportSink>,
    llm_client: Option<Arc<dyn LlmClient>>,
    config_hash: Option<String>,
}

impl Coordinator {
    /// Creates a coordinator that fetches with the built-in HTTP engine
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Config) -> crate::Result<Self> {
        Self::with_engine(config, Arc::new(HttpEngine::new()))
    }

    /// Creates a coordinator backed by `engine`
    ///
    /// Reports go to the files named in `[output]` and the LLM client is
    /// built from `[llm]`; both can be replaced before [`run`](Self::run).
    pub fn with_engine(config: Config, engine: Arc<dyn FetchEngine>) -> crate::Result<Self> {
        validate(&config)?;

        let base = Url::parse(&config.target.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.target.base_url, e)))?;
        let domain = extract_domain(&base)
            .ok_or_else(|| ConfigError::InvalidUrl(format!("{} has no host", base)))?;

        let crawl = CrawlContext {
            frontier: frontier::shared(FrontierStore::new()),
            ladder: Arc::new(EscalationLadder::with_engine(&config.ladder, engine)),
            extractor: Arc::new(LinkExtractor::new()),
            filter: Arc::new(UrlFilter::new(domain, config.filter.clone())),
        };

        let sink = Box::new(FileSink::from_config(&config.output));
        let llm_client = if config.phases.llm.enabled {
            client_from_config(&config.llm)
        } else {
            None
        };
        let scheduler = AdaptiveScheduler::new(config.scheduler.clone());

        let config = Arc::new(config);
        Ok(Self {
            ctx: PhaseContext::new(crawl, base, Arc::clone(&config)),
            config,
            scheduler,
            sink,
            llm_client,
            config_hash: None,
        })
    }

    pub fn with_sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_llm_client(mut self, client: Option<Arc<dyn LlmClient>>) -> Self {
        self.llm_client = client;
        self
    }

    /// Records the hash of the config file in the run report
    pub fn with_config_hash(mut self, hash: Option<String>) -> Self {
        self.config_hash = hash;
        self
    }

    /// The run's shared frontier
    pub fn frontier(&self) -> SharedFrontier {
        Arc::clone(&self.ctx.crawl.frontier)
    }

    /// Runs the complete harvest
    ///
    /// Phase failures are recorded in the report and never abort the run;
    /// only sink I/O errors are returned.
    pub async fn run(&mut self) -> crate::Result<RunReport> {
        let started = Instant::now();
        let mut report = RunReport::new(self.ctx.base.as_str(), self.ctx.domain());
        report.config_hash = self.config_hash.clone();
        info!("Starting harvest of {}", self.ctx.base);

        self.seed().await;
        self.checkpoint(&mut report).await?;

        let phases = self.config.phases.clone();
        if phases.robots.enabled {
            self.run_phase(&RobotsPhase, &mut report).await?;
        }
        if phases.sitemap.enabled {
            self.run_phase(&SitemapPhase, &mut report).await?;
        }
        if phases.crawl.enabled {
            self.run_crawl("crawl", &mut report).await?;
        }
        if phases.directory.enabled {
            self.run_phase(&DirectoryPhase, &mut report).await?;
        }
        if phases.parent.enabled {
            self.run_phase(&ParentPhase, &mut report).await?;
        }
        if phases.pattern.enabled {
            self.run_phase(&PatternPhase, &mut report).await?;
        }
        if phases.form_search.enabled {
            self.run_phase(&FormSearchPhase, &mut report).await?;
        }
        if phases.llm.enabled {
            let llm = LlmPhase::new(self.llm_client.clone());
            self.run_phase(&llm, &mut report).await?;
        }
        if phases.crawl.enabled {
            self.run_crawl("final-crawl", &mut report).await?;
        }

        let retry = RetryPass::new(self.config.retry.clone())
            .run(&self.ctx.crawl)
            .await;
        if retry.attempted > 0 {
            info!(
                "Retry pass recovered {}/{} URLs, {} still failed",
                retry.recovered, retry.attempted, retry.still_failed
            );
        }
        report.retry = Some(retry);

        report.finish();
        self.checkpoint(&mut report).await?;

        info!(
            "Harvest completed: {} URLs discovered, {} crawled, {} failed in {:?}",
            report.totals.discovered,
            report.totals.crawled,
            report.totals.failed,
            started.elapsed()
        );
        Ok(report)
    }

    async fn seed(&self) {
        let seed =
            normalize_str(self.ctx.base.as_str()).unwrap_or_else(|| self.ctx.base.to_string());
        self.ctx
            .crawl
            .frontier
            .lock()
            .await
            .add_discovered([seed], DiscoverySource::Seed);
    }

    fn phase_timeout(&self) -> Option<Duration> {
        self.config.phases.phase_timeout_secs.map(Duration::from_secs)
    }

    async fn run_phase(&self, driver: &dyn PhaseDriver, report: &mut RunReport) -> crate::Result<()> {
        info!("Phase {} starting", driver.name());
        let started = Instant::now();

        let phase_report = match self.phase_timeout() {
            Some(limit) => match tokio::time::timeout(limit, run_timed(driver, &self.ctx)).await {
                Ok(phase_report) => phase_report,
                Err(_) => {
                    self.after_timeout(driver.name(), limit, Some(driver.source()))
                        .await;
                    PhaseReport::new(driver.name())
                        .with_note(format!("timed out after {}s", limit.as_secs()))
                        .with_elapsed(started.elapsed())
                }
            },
            None => run_timed(driver, &self.ctx).await,
        };

        info!(
            "Phase {} finished: {} new URLs in {:.1}s",
            phase_report.phase, phase_report.new_urls, phase_report.elapsed_secs
        );
        report.phases.push(phase_report);
        self.checkpoint(report).await
    }

    async fn run_crawl(&mut self, label: &str, report: &mut RunReport) -> crate::Result<()> {
        info!("Phase {} starting", label);
        let started = Instant::now();
        let budget = CrawlBudget::from(&self.config.scheduler);
        let limit = self.phase_timeout();

        let crawl = self.scheduler.run(&self.ctx.crawl, budget);
        let outcome = match limit {
            Some(limit) => tokio::time::timeout(limit, crawl).await.ok(),
            None => Some(crawl.await),
        };

        let mut phase_report = PhaseReport::new(label);
        match outcome {
            Some(crawl_report) => {
                phase_report.new_urls = crawl_report.new_urls;
                phase_report = phase_report.with_note(format!(
                    "{} batches, {} fetched, stopped: {:?}",
                    crawl_report.batches, crawl_report.urls_fetched, crawl_report.stop_reason
                ));
                report.crawl_runs.push(crawl_report);
            }
            None => {
                let secs = limit.map(|l| l.as_secs()).unwrap_or_default();
                self.after_timeout(label, Duration::from_secs(secs), None)
                    .await;
                phase_report = phase_report.with_note(format!("timed out after {}s", secs));
            }
        }

        let phase_report = phase_report.with_elapsed(started.elapsed());
        info!(
            "Phase {} finished: {} new URLs in {:.1}s",
            label, phase_report.new_urls, phase_report.elapsed_secs
        );
        report.phases.push(phase_report);
        self.checkpoint(report).await
    }

    /// Releases URLs claimed by a cancelled step
    ///
    /// With a `source`, released guesses that phase added are dropped again;
    /// everything else goes back to the queue.
    async fn after_timeout(&self, name: &str, limit: Duration, source: Option<DiscoverySource>) {
        let mut frontier = self.ctx.crawl.frontier.lock().await;
        let released = frontier.release_all();
        let forgotten = match source {
            Some(source) => released
                .iter()
                .filter(|url| frontier.forget_unconfirmed(url, source))
                .count(),
            None => 0,
        };
        warn!(
            "Phase {} timed out after {:?}, {} in-flight URLs released, {} unconfirmed dropped",
            name,
            limit,
            released.len(),
            forgotten
        );
    }

    async fn checkpoint(&self, report: &mut RunReport) -> crate::Result<()> {
        let snapshot = self.ctx.crawl.frontier.lock().await.snapshot();
        report.refresh(&snapshot, self.ctx.crawl.ladder.stats());
        self.sink.checkpoint(report, &snapshot)?;
        Ok(())
    }
}
