use crate::crawler::{EscalationMode, Strategy};
use serde::Deserialize;

/// Main configuration structure for url-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub ladder: LadderConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub phases: PhasesConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Builds a configuration for `base_url` with every other section defaulted
    pub fn for_target(base_url: impl Into<String>) -> Self {
        Self {
            target: TargetConfig {
                base_url: base_url.into(),
            },
            filter: FilterConfig::default(),
            ladder: LadderConfig::default(),
            scheduler: SchedulerConfig::default(),
            retry: RetryConfig::default(),
            phases: PhasesConfig::default(),
            llm: LlmConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// The site being harvested
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Root URL of the site, e.g. `https://www.city.example.jp/`
    #[serde(rename = "base-url")]
    pub base_url: String,
}

impl TargetConfig {
    /// The lowercase host of the base URL
    pub fn domain(&self) -> Option<String> {
        ::url::Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    }
}

/// URL filter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Accept `*.domain` hosts in addition to the exact domain
    #[serde(rename = "allow-subdomains")]
    pub allow_subdomains: bool,

    /// File extensions (without dot) that are never harvested
    #[serde(rename = "blocked-extensions")]
    pub blocked_extensions: Vec<String>,

    /// Longest URL accepted, in bytes
    #[serde(rename = "max-url-length")]
    pub max_url_length: usize,

    /// File names of sitemap documents; URLs ending in them are never re-queued
    #[serde(rename = "sitemap-names")]
    pub sitemap_names: Vec<String>,
}

const BLOCKED_EXTENSIONS: &[&str] = &[
    // images
    "jpg", "jpeg", "png", "gif", "svg", "webp", "bmp", "ico", "tif", "tiff",
    // styles and scripts
    "css", "js", "mjs",
    // archives
    "zip", "rar", "7z", "tar", "gz", "bz2", "xz",
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods",
    // audio and video
    "mp3", "mp4", "wav", "ogg", "avi", "mov", "wmv", "flv", "webm", "m4a",
    // fonts
    "woff", "woff2", "ttf", "eot", "otf",
    // binaries
    "exe", "dmg", "msi", "iso",
];

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            allow_subdomains: false,
            blocked_extensions: BLOCKED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            max_url_length: 2000,
            sitemap_names: vec![
                "sitemap.xml".to_string(),
                "sitemap.html".to_string(),
                "sitemap_index.xml".to_string(),
            ],
        }
    }
}

/// Fetch escalation ladder configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LadderConfig {
    /// Stages to run; always executed in ladder order
    pub strategies: Vec<Strategy>,

    #[serde(rename = "escalation-mode")]
    pub escalation_mode: EscalationMode,

    /// Simultaneous in-flight fetches within one stage
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Upstream proxy for the `undetected-proxy` stage
    #[serde(rename = "proxy-url")]
    pub proxy_url: Option<String>,

    pub timeouts: StageTimeouts,

    /// Minimum usable body length for browser stages
    #[serde(rename = "min-content-length")]
    pub min_content_length: usize,

    /// Minimum usable body length for plain HTTP stages
    #[serde(rename = "min-http-content-length")]
    pub min_http_content_length: usize,

    /// Substrings marking "not found" and error pages (case-insensitive)
    #[serde(rename = "error-indicators")]
    pub error_indicators: Vec<String>,

    /// Substrings marking warning/consent interstitials that were not dismissed
    #[serde(rename = "interstitial-markers")]
    pub interstitial_markers: Vec<String>,

    /// Script run by browser engines before content is extracted
    #[serde(rename = "overlay-script")]
    pub overlay_script: String,
}

pub(crate) const OVERLAY_SCRIPT: &str = r#"
document.querySelectorAll('[class*="overlay"], [class*="modal"], [class*="popup"], [class*="cookie"], [class*="consent"], [id*="overlay"], [id*="modal"], [id*="popup"]').forEach(el => el.remove());
document.querySelectorAll('*').forEach(el => {
    const z = parseInt(window.getComputedStyle(el).zIndex, 10);
    if (z > 999) { el.remove(); }
});
document.querySelectorAll('a, button, input[type="submit"]').forEach(el => {
    const t = (el.innerText || el.value || '').trim();
    if (/^(OK|同意|同意する|続行|Continue|Accept)$/i.test(t)) { el.click(); }
});
document.body.style.overflow = 'auto';
document.documentElement.style.overflow = 'auto';
"#;

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            strategies: Strategy::ALL.to_vec(),
            escalation_mode: EscalationMode::Batch,
            max_concurrent: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            proxy_url: None,
            timeouts: StageTimeouts::default(),
            min_content_length: 100,
            min_http_content_length: 10,
            error_indicators: vec![
                "見つかりませんでした".to_string(),
                "404 not found".to_string(),
                "page not found".to_string(),
                "error 404".to_string(),
                "エラー".to_string(),
            ],
            interstitial_markers: vec![
                "KODENSHA_080201_144032_WARNING".to_string(),
                "J-SERVER Professional".to_string(),
                "machine translation system".to_string(),
                "MESS0001".to_string(),
                "MESS0003".to_string(),
                "translated by J-SERVER".to_string(),
            ],
            overlay_script: OVERLAY_SCRIPT.trim().to_string(),
        }
    }
}

/// Per-stage fetch timeouts in seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    #[serde(rename = "plain-http")]
    pub plain_http: u64,
    #[serde(rename = "headless-default")]
    pub headless_default: u64,
    pub stealth: u64,
    pub undetected: u64,
    #[serde(rename = "undetected-proxy")]
    pub undetected_proxy: u64,
    #[serde(rename = "http-fallback")]
    pub http_fallback: u64,
}

impl StageTimeouts {
    pub fn for_strategy(&self, strategy: Strategy) -> u64 {
        match strategy {
            Strategy::PlainHttp => self.plain_http,
            Strategy::HeadlessDefault => self.headless_default,
            Strategy::Stealth => self.stealth,
            Strategy::Undetected => self.undetected,
            Strategy::UndetectedProxy => self.undetected_proxy,
            Strategy::HttpFallback => self.http_fallback,
        }
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            plain_http: 10,
            headless_default: 30,
            stealth: 45,
            undetected: 45,
            undetected_proxy: 60,
            http_fallback: 20,
        }
    }
}

/// Adaptive batch scheduler configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    #[serde(rename = "initial-batch-size")]
    pub initial_batch_size: usize,

    #[serde(rename = "min-batch-size")]
    pub min_batch_size: usize,

    #[serde(rename = "max-batch-size")]
    pub max_batch_size: usize,

    #[serde(rename = "increase-step")]
    pub increase_step: usize,

    #[serde(rename = "decrease-step")]
    pub decrease_step: usize,

    /// Batches that must pass since the last change before growing again
    #[serde(rename = "stability-window")]
    pub stability_window: usize,

    /// First batch number (1-based) at which health samples are taken
    #[serde(rename = "adaptation-start-batch")]
    pub adaptation_start_batch: usize,

    /// Minimum free memory fraction required to grow the batch size
    #[serde(rename = "memory-headroom")]
    pub memory_headroom: f64,

    /// Stop once this many URLs have been crawled
    #[serde(rename = "max-pages")]
    pub max_pages: usize,

    /// Link depth beyond which URLs are recorded but not fetched
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// A batch with no new URLs ends the crawl when fewer URLs than this remain
    #[serde(rename = "stagnation-threshold")]
    pub stagnation_threshold: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_batch_size: 500,
            min_batch_size: 400,
            max_batch_size: 650,
            increase_step: 25,
            decrease_step: 50,
            stability_window: 5,
            adaptation_start_batch: 3,
            memory_headroom: 0.2,
            max_pages: 10_000,
            max_depth: 10,
            stagnation_threshold: 10,
        }
    }
}

/// Multi-stage retry pass configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    #[serde(rename = "stage-a")]
    pub stage_a: RetryStageConfig,
    #[serde(rename = "stage-b")]
    pub stage_b: RetryStageConfig,
    #[serde(rename = "stage-c")]
    pub stage_c: RetryStageConfig,
}

impl RetryConfig {
    /// Upper bound on fetch attempts across all stages
    pub fn total_cap(&self) -> usize {
        self.stages().iter().map(|s| s.max_urls).sum()
    }

    pub fn stages(&self) -> [&RetryStageConfig; 3] {
        [&self.stage_a, &self.stage_b, &self.stage_c]
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // Micro-batches with maximum per-URL isolation
            stage_a: RetryStageConfig {
                max_urls: 50,
                batch_size: 5,
                concurrency: 1,
                timeout_secs: 50,
                per_url_delay_ms: 500,
                batch_pause_ms: 1000,
                strategy: Strategy::HeadlessDefault,
            },
            // Plain HTTP only
            stage_b: RetryStageConfig {
                max_urls: 30,
                batch_size: 1,
                concurrency: 1,
                timeout_secs: 45,
                per_url_delay_ms: 200,
                batch_pause_ms: 0,
                strategy: Strategy::PlainHttp,
            },
            // One at a time, longest timeout
            stage_c: RetryStageConfig {
                max_urls: 10,
                batch_size: 1,
                concurrency: 1,
                timeout_secs: 70,
                per_url_delay_ms: 2000,
                batch_pause_ms: 0,
                strategy: Strategy::HeadlessDefault,
            },
        }
    }
}

/// One stage of the retry pass
#[derive(Debug, Clone, Deserialize)]
pub struct RetryStageConfig {
    #[serde(rename = "max-urls")]
    pub max_urls: usize,

    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    pub concurrency: usize,

    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    #[serde(rename = "per-url-delay-ms")]
    pub per_url_delay_ms: u64,

    #[serde(rename = "batch-pause-ms")]
    pub batch_pause_ms: u64,

    pub strategy: Strategy,
}

/// Phase driver configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhasesConfig {
    /// Wall-clock limit applied to each phase, if any
    #[serde(rename = "phase-timeout-secs")]
    pub phase_timeout_secs: Option<u64>,

    /// Guessed candidates are probed through the ladder in chunks of this size
    #[serde(rename = "probe-batch-size")]
    pub probe_batch_size: usize,

    pub robots: ToggleConfig,
    pub sitemap: SitemapPhaseConfig,
    pub crawl: ToggleConfig,
    pub directory: DirectoryPhaseConfig,
    pub parent: ParentPhaseConfig,
    pub pattern: PatternPhaseConfig,
    #[serde(rename = "form-search")]
    pub form_search: FormSearchPhaseConfig,
    pub llm: ToggleConfig,
}

impl Default for PhasesConfig {
    fn default() -> Self {
        Self {
            phase_timeout_secs: None,
            probe_batch_size: 50,
            robots: ToggleConfig::default(),
            sitemap: SitemapPhaseConfig::default(),
            crawl: ToggleConfig::default(),
            directory: DirectoryPhaseConfig::default(),
            parent: ParentPhaseConfig::default(),
            pattern: PatternPhaseConfig::default(),
            form_search: FormSearchPhaseConfig::default(),
            llm: ToggleConfig::default(),
        }
    }
}

/// A phase with nothing to tune besides being switched on or off
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToggleConfig {
    pub enabled: bool,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SitemapPhaseConfig {
    pub enabled: bool,

    /// Sitemap documents fetched per run, nested ones included
    #[serde(rename = "max-sitemaps")]
    pub max_sitemaps: usize,

    /// How deep sitemap indexes are followed
    #[serde(rename = "max-nesting")]
    pub max_nesting: u32,

    /// Additional locations to try, relative to the base URL
    #[serde(rename = "extra-locations")]
    pub extra_locations: Vec<String>,
}

impl Default for SitemapPhaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_sitemaps: 50,
            max_nesting: 3,
            extra_locations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectoryPhaseConfig {
    pub enabled: bool,

    /// Extra directory paths appended to the built-in list
    #[serde(rename = "extra-paths")]
    pub extra_paths: Vec<String>,
}

impl Default for DirectoryPhaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extra_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParentPhaseConfig {
    pub enabled: bool,

    /// Ancestor directories derived per URL, shallowest first
    #[serde(rename = "max-levels")]
    pub max_levels: usize,

    #[serde(rename = "max-candidates")]
    pub max_candidates: usize,
}

impl Default for ParentPhaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_levels: 8,
            max_candidates: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatternPhaseConfig {
    pub enabled: bool,

    #[serde(rename = "max-generated")]
    pub max_generated: usize,

    /// Path shapes seen fewer times than this are not expanded
    #[serde(rename = "min-pattern-frequency")]
    pub min_pattern_frequency: usize,

    #[serde(rename = "date-patterns")]
    pub date_patterns: bool,

    #[serde(rename = "numeric-patterns")]
    pub numeric_patterns: bool,

    #[serde(rename = "language-patterns")]
    pub language_patterns: bool,
}

impl Default for PatternPhaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_generated: 2000,
            min_pattern_frequency: 2,
            date_patterns: true,
            numeric_patterns: true,
            language_patterns: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FormSearchPhaseConfig {
    pub enabled: bool,

    /// Crawled pages re-fetched to look for forms
    #[serde(rename = "max-pages-scanned")]
    pub max_pages_scanned: usize,

    #[serde(rename = "max-queries")]
    pub max_queries: usize,

    /// Pages whose pagination variants are generated
    #[serde(rename = "max-pagination-bases")]
    pub max_pagination_bases: usize,
}

impl Default for FormSearchPhaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_pages_scanned: 20,
            max_queries: 50,
            max_pagination_bases: 20,
        }
    }
}

/// LLM provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    OpenAi,
    Anthropic,
}

/// LLM-assisted path generation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,

    pub model: String,

    /// Environment variable holding the API key; a missing key selects the heuristic fallback
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Override for the provider's API endpoint
    pub endpoint: Option<String>,

    /// Requests allowed per run
    #[serde(rename = "max-requests")]
    pub max_requests: usize,

    pub temperature: f32,

    #[serde(rename = "max-tokens")]
    pub max_tokens: usize,

    /// Candidate URLs kept from all responses
    #[serde(rename = "max-urls")]
    pub max_urls: usize,

    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            endpoint: None,
            max_requests: 5,
            temperature: 0.3,
            max_tokens: 1024,
            max_urls: 200,
            timeout_secs: 60,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the JSON run report
    #[serde(rename = "report-path")]
    pub report_path: String,

    /// Path to the flat, sorted URL list
    #[serde(rename = "urls-path")]
    pub urls_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_path: "harvest-report.json".to_string(),
            urls_path: "harvest-urls.txt".to_string(),
        }
    }
}
