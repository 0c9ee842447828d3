//! The fetch escalation ladder
//!
//! A batch of URLs is tried with the cheapest strategy first and escalates to
//! heavier strategies only when a stage yields nothing usable.
//!
//! # Escalation modes
//!
//! | Mode      | Stage succeeds for ≥ 1 URL          | URL fails at a stage          |
//! |-----------|-------------------------------------|-------------------------------|
//! | `batch`   | stop; every URL keeps this stage's result | batch moves on only if all failed |
//! | `per-url` | successful URLs are settled         | that URL alone moves on       |

use crate::config::LadderConfig;
use crate::crawler::engine::{EngineError, FetchEngine, HttpEngine};
use crate::crawler::extractor::LinkExtractor;
use crate::crawler::strategy::{ordered_strategies, EscalationMode, StageProfile, Strategy};
use crate::crawler::validity::{ContentValidator, FetchOutcome, FetchResult, RejectReason};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Attempt counters for one stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStats {
    pub attempted: u64,
    pub successful: u64,
    pub failed: u64,
    pub timeouts: u64,
    /// Times the stage could not run at all
    pub stage_errors: u64,
}

impl StageStats {
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.successful as f64 / self.attempted as f64
        }
    }

    fn merge(&mut self, other: &StageStats) {
        self.attempted += other.attempted;
        self.successful += other.successful;
        self.failed += other.failed;
        self.timeouts += other.timeouts;
        self.stage_errors += other.stage_errors;
    }
}

/// Results of running a batch through the ladder
#[derive(Debug, Clone, Default)]
pub struct LadderOutcome {
    pub results: BTreeMap<String, FetchResult>,
    /// First stage that produced a usable result, if any
    pub winning_stage: Option<Strategy>,
}

impl LadderOutcome {
    pub fn success_count(&self) -> usize {
        self.results.values().filter(|r| r.success()).count()
    }

    pub fn successes(&self) -> impl Iterator<Item = &FetchResult> {
        self.results.values().filter(|r| r.success())
    }
}

/// Results of a single stage
#[derive(Debug, Clone, Default)]
pub struct StageRun {
    pub results: BTreeMap<String, FetchResult>,
    pub stats: StageStats,
    /// Set when `prepare` failed and no URL was attempted
    pub stage_error: Option<String>,
}

impl StageRun {
    pub fn any_success(&self) -> bool {
        self.results.values().any(|r| r.success())
    }
}

pub struct EscalationLadder {
    engine: Arc<dyn FetchEngine>,
    config: LadderConfig,
    strategies: Vec<Strategy>,
    validator: ContentValidator,
    stats: Mutex<BTreeMap<Strategy, StageStats>>,
}

impl std::fmt::Debug for EscalationLadder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationLadder")
            .field("strategies", &self.strategies)
            .field("mode", &self.config.escalation_mode)
            .finish()
    }
}

impl EscalationLadder {
    /// Ladder backed by the built-in [`HttpEngine`]
    pub fn new(config: &LadderConfig) -> Self {
        Self::with_engine(config, Arc::new(HttpEngine::new()))
    }

    pub fn with_engine(config: &LadderConfig, engine: Arc<dyn FetchEngine>) -> Self {
        Self {
            engine,
            config: config.clone(),
            strategies: ordered_strategies(&config.strategies),
            validator: ContentValidator::new(config),
            stats: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn mode(&self) -> EscalationMode {
        self.config.escalation_mode
    }

    /// Profile for `strategy`, whether or not the ladder runs it
    pub fn profile(&self, strategy: Strategy) -> StageProfile {
        StageProfile::new(strategy, &self.config)
    }

    /// Cumulative per-stage counters since the ladder was built
    pub fn stats(&self) -> BTreeMap<Strategy, StageStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record_stats(&self, strategy: Strategy, run: &StageStats) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.entry(strategy).or_default().merge(run);
    }

    /// Fetches `urls` with a single stage, up to `concurrency` at a time
    pub async fn run_stage(
        &self,
        urls: &[String],
        profile: &StageProfile,
        concurrency: usize,
        extractor: &LinkExtractor,
    ) -> StageRun {
        let strategy = profile.strategy;
        let mut run = StageRun::default();

        if let Err(e) = self.engine.prepare(profile).await {
            warn!("Stage {} unavailable: {}", strategy, e);
            run.stats.stage_errors = 1;
            let reason = e.to_string();
            for url in urls {
                run.results.insert(
                    url.clone(),
                    FetchResult::failure(
                        url.as_str(),
                        strategy,
                        FetchOutcome::Rejected(RejectReason::StageUnavailable(reason.clone())),
                    ),
                );
            }
            run.stage_error = Some(reason);
            self.record_stats(strategy, &run.stats);
            return run;
        }

        let semaphore = Semaphore::new(concurrency.max(1));
        let fetches = urls.iter().map(|url| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.ok();
                let outcome = self.fetch_one(url, profile).await;
                (url, outcome)
            }
        });

        for (url, outcome) in join_all(fetches).await {
            run.stats.attempted += 1;
            match &outcome {
                FetchOutcome::Ok(_) => run.stats.successful += 1,
                FetchOutcome::Timeout => {
                    run.stats.failed += 1;
                    run.stats.timeouts += 1;
                }
                _ => run.stats.failed += 1,
            }
            debug!("[{}] {} -> {}", strategy, url, outcome.label());

            let extracted_links = match &outcome {
                FetchOutcome::Ok(content) => extractor.extract_links(content, url),
                _ => Default::default(),
            };
            run.results.insert(
                url.clone(),
                FetchResult {
                    url: url.clone(),
                    strategy,
                    outcome,
                    extracted_links,
                },
            );
        }

        self.record_stats(strategy, &run.stats);
        run
    }

    async fn fetch_one(&self, url: &str, profile: &StageProfile) -> FetchOutcome {
        match tokio::time::timeout(profile.timeout, self.engine.fetch(url, profile)).await {
            Err(_) => FetchOutcome::Timeout,
            Ok(Err(EngineError::Timeout)) => FetchOutcome::Timeout,
            Ok(Err(EngineError::StageUnavailable(reason))) => {
                FetchOutcome::Rejected(RejectReason::StageUnavailable(reason))
            }
            Ok(Err(EngineError::Network(e))) => FetchOutcome::NetworkError(e),
            Ok(Ok(response)) => self.validator.validate(response, profile),
        }
    }

    /// Runs `urls` through the configured stages
    ///
    /// Every input URL has exactly one entry in the returned results.
    pub async fn fetch_with_escalation(
        &self,
        urls: &[String],
        extractor: &LinkExtractor,
    ) -> LadderOutcome {
        let mut outcome = LadderOutcome::default();
        if urls.is_empty() {
            return outcome;
        }

        if self.strategies.is_empty() {
            for url in urls {
                outcome.results.insert(
                    url.clone(),
                    FetchResult::failure(
                        url.as_str(),
                        Strategy::PlainHttp,
                        FetchOutcome::Rejected(RejectReason::StageUnavailable(
                            "no strategies configured".to_string(),
                        )),
                    ),
                );
            }
            return outcome;
        }

        match self.config.escalation_mode {
            EscalationMode::Batch => self.escalate_batch(urls, extractor).await,
            EscalationMode::PerUrl => self.escalate_per_url(urls, extractor).await,
        }
    }

    async fn escalate_batch(&self, urls: &[String], extractor: &LinkExtractor) -> LadderOutcome {
        let mut outcome = LadderOutcome::default();

        for &strategy in &self.strategies {
            let profile = self.profile(strategy);
            let run = self
                .run_stage(urls, &profile, self.config.max_concurrent, extractor)
                .await;
            let succeeded = run.any_success();

            outcome.results = run.results;
            if succeeded {
                info!(
                    "Stage {} ({}) succeeded for {}/{} URLs",
                    strategy.stage_number(),
                    strategy,
                    run.stats.successful,
                    urls.len()
                );
                outcome.winning_stage = Some(strategy);
                break;
            }
            debug!(
                "Stage {} ({}) produced no usable result, escalating",
                strategy.stage_number(),
                strategy
            );
        }

        if outcome.winning_stage.is_none() {
            warn!("All {} stages failed for {} URLs", self.strategies.len(), urls.len());
        }
        outcome
    }

    async fn escalate_per_url(&self, urls: &[String], extractor: &LinkExtractor) -> LadderOutcome {
        let mut outcome = LadderOutcome::default();
        let mut remaining: Vec<String> = urls.to_vec();

        for &strategy in &self.strategies {
            if remaining.is_empty() {
                break;
            }
            let profile = self.profile(strategy);
            let run = self
                .run_stage(&remaining, &profile, self.config.max_concurrent, extractor)
                .await;

            if run.any_success() && outcome.winning_stage.is_none() {
                outcome.winning_stage = Some(strategy);
            }

            remaining.clear();
            for (url, result) in run.results {
                if !result.success() {
                    remaining.push(url.clone());
                }
                outcome.results.insert(url, result);
            }
            debug!(
                "Stage {} ({}): {} URLs still failing",
                strategy.stage_number(),
                strategy,
                remaining.len()
            );
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::engine::EngineResponse;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const PAGE: &str = "<html><body><a href=\"/child.html\">child</a>\
        lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor \
        incididunt ut labore et dolore magna aliqua</body></html>";

    /// Succeeds only for the given (strategy, url) pairs and counts calls
    #[derive(Default)]
    struct ScriptedEngine {
        succeed: HashSet<(Strategy, String)>,
        unavailable: HashSet<Strategy>,
        slow: HashSet<Strategy>,
        calls: Mutex<HashMap<Strategy, usize>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedEngine {
        fn calls(&self, strategy: Strategy) -> usize {
            self.calls.lock().unwrap().get(&strategy).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl FetchEngine for ScriptedEngine {
        async fn prepare(&self, profile: &StageProfile) -> Result<(), EngineError> {
            if self.unavailable.contains(&profile.strategy) {
                return Err(EngineError::StageUnavailable("not installed".to_string()));
            }
            Ok(())
        }

        async fn fetch(
            &self,
            url: &str,
            profile: &StageProfile,
        ) -> Result<EngineResponse, EngineError> {
            *self.calls.lock().unwrap().entry(profile.strategy).or_insert(0) += 1;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            if self.slow.contains(&profile.strategy) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let ok = self.succeed.contains(&(profile.strategy, url.to_string()));
            Ok(EngineResponse {
                status_code: if ok { 200 } else { 500 },
                content: PAGE.to_string(),
                markdown: None,
                links: Vec::new(),
            })
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://example.test/{}.html", i)).collect()
    }

    fn ladder(engine: Arc<ScriptedEngine>, mode: EscalationMode) -> EscalationLadder {
        let mut config = LadderConfig::default();
        config.escalation_mode = mode;
        config.max_concurrent = 2;
        EscalationLadder::with_engine(&config, engine)
    }

    #[tokio::test]
    async fn test_first_stage_success_short_circuits() {
        let batch = urls(3);
        let mut engine = ScriptedEngine::default();
        engine.succeed.insert((Strategy::PlainHttp, batch[0].clone()));
        let engine = Arc::new(engine);

        let ladder = ladder(engine.clone(), EscalationMode::Batch);
        let outcome = ladder
            .fetch_with_escalation(&batch, &LinkExtractor::new())
            .await;

        assert_eq!(outcome.winning_stage, Some(Strategy::PlainHttp));
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.success_count(), 1);
        assert_eq!(engine.calls(Strategy::PlainHttp), 3);
        for strategy in &Strategy::ALL[1..] {
            assert_eq!(engine.calls(*strategy), 0, "{} was invoked", strategy);
        }

        let winner = &outcome.results[&batch[0]];
        assert!(winner
            .extracted_links
            .contains("https://example.test/child.html"));
    }

    #[tokio::test]
    async fn test_batch_escalates_until_a_stage_works() {
        let batch = urls(2);
        let mut engine = ScriptedEngine::default();
        engine.succeed.insert((Strategy::Stealth, batch[1].clone()));
        let engine = Arc::new(engine);

        let ladder = ladder(engine.clone(), EscalationMode::Batch);
        let outcome = ladder
            .fetch_with_escalation(&batch, &LinkExtractor::new())
            .await;

        assert_eq!(outcome.winning_stage, Some(Strategy::Stealth));
        assert_eq!(outcome.results[&batch[0]].strategy, Strategy::Stealth);
        assert!(!outcome.results[&batch[0]].success());
        assert_eq!(engine.calls(Strategy::Undetected), 0);

        let stats = ladder.stats();
        assert_eq!(stats[&Strategy::PlainHttp].failed, 2);
        assert_eq!(stats[&Strategy::Stealth].successful, 1);
    }

    #[tokio::test]
    async fn test_all_stages_fail_keeps_last_outcome() {
        let batch = urls(3);
        let engine = Arc::new(ScriptedEngine::default());
        let ladder = ladder(engine.clone(), EscalationMode::Batch);
        let outcome = ladder
            .fetch_with_escalation(&batch, &LinkExtractor::new())
            .await;

        assert_eq!(outcome.winning_stage, None);
        assert_eq!(outcome.success_count(), 0);
        for result in outcome.results.values() {
            assert_eq!(result.strategy, Strategy::HttpFallback);
            assert_eq!(
                result.outcome,
                FetchOutcome::Rejected(RejectReason::HttpStatus(500))
            );
        }
        for strategy in Strategy::ALL {
            assert_eq!(engine.calls(strategy), 3);
        }
    }

    #[tokio::test]
    async fn test_stage_error_is_skipped() {
        let batch = urls(1);
        let mut engine = ScriptedEngine::default();
        engine.unavailable.insert(Strategy::PlainHttp);
        engine.succeed.insert((Strategy::HeadlessDefault, batch[0].clone()));
        let engine = Arc::new(engine);

        let ladder = ladder(engine.clone(), EscalationMode::Batch);
        let outcome = ladder
            .fetch_with_escalation(&batch, &LinkExtractor::new())
            .await;

        assert_eq!(outcome.winning_stage, Some(Strategy::HeadlessDefault));
        assert_eq!(engine.calls(Strategy::PlainHttp), 0);
        assert_eq!(ladder.stats()[&Strategy::PlainHttp].stage_errors, 1);
    }

    #[tokio::test]
    async fn test_per_url_mode_only_escalates_failures() {
        let batch = urls(3);
        let mut engine = ScriptedEngine::default();
        engine.succeed.insert((Strategy::PlainHttp, batch[0].clone()));
        engine.succeed.insert((Strategy::HeadlessDefault, batch[1].clone()));
        let engine = Arc::new(engine);

        let ladder = ladder(engine.clone(), EscalationMode::PerUrl);
        let outcome = ladder
            .fetch_with_escalation(&batch, &LinkExtractor::new())
            .await;

        assert_eq!(outcome.success_count(), 2);
        assert_eq!(outcome.winning_stage, Some(Strategy::PlainHttp));
        assert_eq!(outcome.results[&batch[1]].strategy, Strategy::HeadlessDefault);
        assert_eq!(engine.calls(Strategy::PlainHttp), 3);
        assert_eq!(engine.calls(Strategy::HeadlessDefault), 2);
        assert_eq!(engine.calls(Strategy::Stealth), 1);
        assert_eq!(outcome.results[&batch[2]].strategy, Strategy::HttpFallback);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let batch = urls(8);
        let engine = Arc::new(ScriptedEngine::default());
        let ladder = ladder(engine.clone(), EscalationMode::Batch);
        let profile = ladder.profile(Strategy::PlainHttp);
        ladder
            .run_stage(&batch, &profile, 2, &LinkExtractor::new())
            .await;
        assert!(engine.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_timeout_becomes_outcome() {
        let batch = urls(2);
        let mut engine = ScriptedEngine::default();
        engine.slow.insert(Strategy::PlainHttp);
        let engine = Arc::new(engine);
        let ladder = ladder(engine, EscalationMode::Batch);
        let profile = ladder
            .profile(Strategy::PlainHttp)
            .with_timeout(Duration::from_millis(50));

        let run = ladder
            .run_stage(&batch, &profile, 2, &LinkExtractor::new())
            .await;
        assert_eq!(run.stats.timeouts, 2);
        assert!(run
            .results
            .values()
            .all(|r| r.outcome == FetchOutcome::Timeout));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let engine = Arc::new(ScriptedEngine::default());
        let ladder = ladder(engine.clone(), EscalationMode::Batch);
        let outcome = ladder.fetch_with_escalation(&[], &LinkExtractor::new()).await;
        assert!(outcome.results.is_empty());
        assert_eq!(engine.calls(Strategy::PlainHttp), 0);
    }
}
