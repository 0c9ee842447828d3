//! Fetch strategies and the per-stage profiles derived from configuration

use crate::config::LadderConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One rung of the escalation ladder
///
/// Variants are declared in ladder order; `Ord` follows that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Plain HTTP GET, no rendering
    PlainHttp,
    /// Headless browser with default settings
    HeadlessDefault,
    /// Headless browser with fingerprint masking
    Stealth,
    /// Headed browser that avoids automation detection
    Undetected,
    /// Same as `Undetected`, routed through the configured proxy
    UndetectedProxy,
    /// Plain HTTP with randomized browser headers
    HttpFallback,
}

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Strategy::PlainHttp,
        Strategy::HeadlessDefault,
        Strategy::Stealth,
        Strategy::Undetected,
        Strategy::UndetectedProxy,
        Strategy::HttpFallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainHttp => "plain-http",
            Self::HeadlessDefault => "headless-default",
            Self::Stealth => "stealth",
            Self::Undetected => "undetected",
            Self::UndetectedProxy => "undetected-proxy",
            Self::HttpFallback => "http-fallback",
        }
    }

    /// Whether the stage renders pages in a browser
    pub fn is_browser(&self) -> bool {
        !matches!(self, Self::PlainHttp | Self::HttpFallback)
    }

    /// 1-based position in the ladder
    pub fn stage_number(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).map_or(0, |i| i + 1)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How URLs move down the ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscalationMode {
    /// The whole batch escalates together; the first stage with any success wins
    #[default]
    Batch,
    /// Each URL escalates on its own until it succeeds or the ladder runs out
    PerUrl,
}

/// User agent a headless browser reports before any masking
pub const HEADLESS_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
    (KHTML, like Gecko) HeadlessChrome/124.0.0.0 Safari/537.36";

/// Desktop Chrome on Windows, presented by the stealth stage
pub const STEALTH_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Desktop Chrome on macOS, presented by the undetected stages
pub const UNDETECTED_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Everything an engine needs to execute one stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageProfile {
    pub strategy: Strategy,
    pub timeout: Duration,
    pub headless: bool,
    pub stealth: bool,
    pub undetected: bool,
    pub user_agent: String,
    pub proxy: Option<String>,
    /// Pick a random user agent and Accept-Language per request
    pub randomize_headers: bool,
    /// Overlay-dismiss hook run before content is extracted (browser stages only)
    pub overlay_script: Option<String>,
    pub min_content_length: usize,
}

impl StageProfile {
    pub fn new(strategy: Strategy, config: &LadderConfig) -> Self {
        let browser = strategy.is_browser();
        let proxy = match strategy {
            Strategy::UndetectedProxy => config.proxy_url.clone(),
            _ => None,
        };

        Self {
            strategy,
            timeout: Duration::from_secs(config.timeouts.for_strategy(strategy)),
            headless: matches!(strategy, Strategy::HeadlessDefault | Strategy::Stealth),
            stealth: strategy == Strategy::Stealth,
            undetected: matches!(strategy, Strategy::Undetected | Strategy::UndetectedProxy),
            user_agent: match strategy {
                Strategy::PlainHttp | Strategy::HttpFallback => config.user_agent.clone(),
                Strategy::HeadlessDefault => HEADLESS_USER_AGENT.to_string(),
                Strategy::Stealth => STEALTH_USER_AGENT.to_string(),
                Strategy::Undetected | Strategy::UndetectedProxy => {
                    UNDETECTED_USER_AGENT.to_string()
                }
            },
            proxy,
            randomize_headers: strategy == Strategy::HttpFallback,
            overlay_script: if browser && !config.overlay_script.is_empty() {
                Some(config.overlay_script.clone())
            } else {
                None
            },
            min_content_length: if browser {
                config.min_content_length
            } else {
                config.min_http_content_length
            },
        }
    }

    /// Same profile with a different timeout, as used by the retry pass
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether this stage cannot run without a proxy
    pub fn requires_proxy(&self) -> bool {
        self.strategy == Strategy::UndetectedProxy
    }
}

/// The configured strategies in ladder order, without duplicates
pub fn ordered_strategies(configured: &[Strategy]) -> Vec<Strategy> {
    let mut strategies = configured.to_vec();
    strategies.sort();
    strategies.dedup();
    strategies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_order() {
        let mut shuffled = vec![
            Strategy::HttpFallback,
            Strategy::PlainHttp,
            Strategy::Undetected,
            Strategy::PlainHttp,
        ];
        shuffled = ordered_strategies(&shuffled);
        assert_eq!(
            shuffled,
            vec![
                Strategy::PlainHttp,
                Strategy::Undetected,
                Strategy::HttpFallback
            ]
        );
        assert_eq!(Strategy::PlainHttp.stage_number(), 1);
        assert_eq!(Strategy::HttpFallback.stage_number(), 6);
    }

    #[test]
    fn test_strategy_serde_names() {
        let parsed: Strategy = serde_json::from_str("\"undetected-proxy\"").unwrap();
        assert_eq!(parsed, Strategy::UndetectedProxy);
        assert_eq!(Strategy::HeadlessDefault.to_string(), "headless-default");

        let mode: EscalationMode = serde_json::from_str("\"per-url\"").unwrap();
        assert_eq!(mode, EscalationMode::PerUrl);
    }

    #[test]
    fn test_profile_defaults() {
        let config = LadderConfig::default();

        let plain = StageProfile::new(Strategy::PlainHttp, &config);
        assert_eq!(plain.timeout, Duration::from_secs(10));
        assert_eq!(plain.min_content_length, 10);
        assert!(plain.overlay_script.is_none());
        assert!(!plain.headless);

        let stealth = StageProfile::new(Strategy::Stealth, &config);
        assert!(stealth.headless && stealth.stealth);
        assert_eq!(stealth.min_content_length, 100);
        assert!(stealth.overlay_script.is_some());

        let fallback = StageProfile::new(Strategy::HttpFallback, &config);
        assert!(fallback.randomize_headers);
        assert_eq!(fallback.timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_browser_stages_have_their_own_identity() {
        let config = LadderConfig::default();
        let agents: Vec<String> = [
            Strategy::PlainHttp,
            Strategy::HeadlessDefault,
            Strategy::Stealth,
            Strategy::Undetected,
        ]
        .iter()
        .map(|s| StageProfile::new(*s, &config).user_agent)
        .collect();

        assert_eq!(agents[0], config.user_agent);
        for (i, a) in agents.iter().enumerate() {
            for b in &agents[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(
            StageProfile::new(Strategy::UndetectedProxy, &config).user_agent,
            UNDETECTED_USER_AGENT
        );
    }

    #[test]
    fn test_proxy_only_on_proxy_stage() {
        let mut config = LadderConfig::default();
        config.proxy_url = Some("http://proxy.test:8080".to_string());

        let undetected = StageProfile::new(Strategy::Undetected, &config);
        assert!(undetected.proxy.is_none());

        let proxied = StageProfile::new(Strategy::UndetectedProxy, &config);
        assert!(proxied.requires_proxy());
        assert_eq!(proxied.proxy.as_deref(), Some("http://proxy.test:8080"));
    }
}
