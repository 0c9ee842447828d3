//! LLM-assisted path generation
//!
//! A language model is asked for paths that likely exist on the site, given
//! its domain and a sample of what has been found so far. Without a client,
//! after a client error, or once the request budget is spent, a fixed list
//! of paths typical for the site's type is used instead.

use crate::frontier::DiscoverySource;
use crate::llm::{client_from_config, LlmClient};
use crate::phases::{PhaseContext, PhaseDriver, PhaseReport};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+[.)]|[-*+•])\s*").expect("valid regex"));

const SAMPLE_PATHS: usize = 10;

/// Aspects of the site asked about, one request each
const FOCUS_AREAS: &[&str] = &[
    "section index pages and their sub-pages",
    "news, event and archive listings by year or category",
    "documents, forms, reports and downloadable resources",
    "contact, access, organization and policy pages",
    "deep content pages reachable only through navigation menus",
];

const GOVERNMENT_PATHS: &[&str] = &[
    "/admin/", "/admin/index.html", "/council/", "/council/meetings.html",
    "/council/members.html", "/departments/", "/departments/list.html", "/services/",
    "/services/index.html", "/services/online.html", "/documents/", "/documents/archive.html",
    "/documents/forms.html", "/statistics/", "/statistics/annual.html",
    "/statistics/monthly.html", "/budget/", "/budget/current.html", "/budget/history.html",
    "/policies/", "/policies/index.html",
];

const CORPORATE_PATHS: &[&str] = &[
    "/api/", "/docs/", "/docs/index.html", "/support/", "/support/faq.html",
    "/support/contact.html", "/resources/", "/resources/downloads.html", "/products/",
    "/products/index.html", "/products/catalog.html", "/services/", "/services/overview.html",
    "/about/", "/about/team.html", "/about/history.html", "/contact/", "/contact/form.html",
];

const EDUCATIONAL_PATHS: &[&str] = &[
    "/students/", "/students/portal.html", "/students/services.html", "/faculty/",
    "/faculty/directory.html", "/faculty/resources.html", "/courses/", "/courses/catalog.html",
    "/courses/schedule.html", "/research/", "/research/projects.html", "/library/",
    "/library/catalog.html", "/admissions/", "/admissions/apply.html",
    "/admissions/requirements.html", "/departments/", "/departments/list.html",
];

const GENERIC_PATHS: &[&str] = &[
    "/about/", "/about/index.html", "/news/", "/news/index.html", "/contact/",
    "/contact/index.html", "/services/", "/information/", "/guide/", "/faq/", "/faq.html",
    "/guide/index.html", "/access/", "/privacy/", "/archive/", "/links/",
];

/// Kind of site, inferred from the domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteType {
    Government,
    Educational,
    Corporate,
    Generic,
}

impl SiteType {
    pub fn fallback_paths(&self) -> &'static [&'static str] {
        match self {
            Self::Government => GOVERNMENT_PATHS,
            Self::Educational => EDUCATIONAL_PATHS,
            Self::Corporate => CORPORATE_PATHS,
            Self::Generic => GENERIC_PATHS,
        }
    }
}

impl fmt::Display for SiteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Government => "government",
            Self::Educational => "educational",
            Self::Corporate => "corporate",
            Self::Generic => "generic",
        };
        f.write_str(name)
    }
}

pub fn site_type_for(domain: &str) -> SiteType {
    let domain = domain.to_ascii_lowercase();
    let labels: Vec<&str> = domain.split('.').collect();
    let has_label = |names: &[&str]| labels.iter().any(|l| names.contains(l));

    if has_label(&["gov", "go", "lg", "city", "town", "village", "pref", "metro"])
        || domain.contains("municipal")
    {
        SiteType::Government
    } else if has_label(&["edu", "ac"]) || domain.contains("university") || domain.contains("school")
    {
        SiteType::Educational
    } else if has_label(&["com", "co", "biz", "inc", "corp"]) {
        SiteType::Corporate
    } else {
        SiteType::Generic
    }
}

pub fn build_prompt(domain: &str, site_type: SiteType, sample_paths: &[String], focus: &str) -> String {
    let sample = if sample_paths.is_empty() {
        "(none yet)".to_string()
    } else {
        sample_paths.join("\n")
    };
    format!(
        "Website: {domain} ({site_type} site)\n\
         Paths already found:\n{sample}\n\n\
         List up to 30 more paths that probably exist on this site, focusing on {focus}.\n\
         Prefer .html pages and directory paths ending in '/'.\n\
         Output one path per line, starting with '/', with no commentary."
    )
}

/// Pulls candidate URLs on `base`'s host out of a model answer
///
/// Comment lines are skipped and list markers stripped. Absolute URLs are
/// kept only on the base host; absolute and relative paths are resolved
/// against the site root. Only HTML pages and directory-like URLs survive.
pub fn parse_llm_response(text: &str, base: &Url) -> BTreeSet<String> {
    let host = base.host_str().unwrap_or("");
    let mut urls = BTreeSet::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let line = LIST_MARKER.replace(line, "");
        let Some(token) = line.split_whitespace().next() else {
            continue;
        };
        let token = token.trim_matches(|c| matches!(c, '`' | '"' | '\'' | ',' | '<' | '>'));

        let resolved = if token.starts_with("http://") || token.starts_with("https://") {
            Url::parse(token)
                .ok()
                .filter(|u| u.host_str().is_some_and(|h| h.eq_ignore_ascii_case(host)))
        } else if token.starts_with('/') {
            base.join(token).ok()
        } else if token.contains('/') {
            base.join(&format!("/{}", token.trim_start_matches("./"))).ok()
        } else {
            None
        };

        let Some(mut url) = resolved else {
            continue;
        };
        url.set_fragment(None);
        if is_page_like(&url) {
            urls.insert(url.to_string());
        }
    }
    urls
}

fn is_page_like(url: &Url) -> bool {
    let path = url.path();
    let last = path.rsplit('/').next().unwrap_or("");
    let lower = last.to_ascii_lowercase();
    path.ends_with('/') || lower.ends_with(".html") || lower.ends_with(".htm") || !last.contains('.')
}

/// Asks a language model for likely paths, falling back to heuristics
pub struct LlmPhase {
    client: Option<Arc<dyn LlmClient>>,
    requests: AtomicUsize,
    cache: Mutex<HashMap<String, String>>,
}

impl LlmPhase {
    pub fn new(client: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            client,
            requests: AtomicUsize::new(0),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &crate::config::LlmConfig) -> Self {
        Self::new(client_from_config(config))
    }

    /// Requests sent so far
    pub fn requests_made(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    /// The model's answer to `prompt`, from cache when possible
    ///
    /// `None` when there is no client, the budget is spent, or the call failed.
    pub async fn complete(&self, prompt: &str, max_requests: usize) -> Option<String> {
        if let Some(cached) = self.cache.lock().await.get(prompt) {
            debug!("LLM cache hit");
            return Some(cached.clone());
        }
        let client = self.client.as_ref()?;

        let reserved = self
            .requests
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                (n < max_requests).then_some(n + 1)
            });
        if reserved.is_err() {
            debug!("LLM request budget of {} spent", max_requests);
            return None;
        }

        match client.generate(prompt).await {
            Ok(text) => {
                self.cache
                    .lock()
                    .await
                    .insert(prompt.to_string(), text.clone());
                Some(text)
            }
            Err(e) => {
                warn!("LLM request failed: {:#}", e);
                None
            }
        }
    }
}

impl fmt::Debug for LlmPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmPhase")
            .field("has_client", &self.client.is_some())
            .field("requests", &self.requests_made())
            .finish()
    }
}

#[async_trait]
impl PhaseDriver for LlmPhase {
    fn name(&self) -> &'static str {
        "llm"
    }

    fn source(&self) -> DiscoverySource {
        DiscoverySource::Llm
    }

    async fn run(&self, ctx: &PhaseContext) -> PhaseReport {
        let mut report = PhaseReport::new(self.name());
        let settings = &ctx.config.llm;
        let site_type = site_type_for(ctx.domain());

        let sample: Vec<String> = ctx
            .discovered_urls()
            .await
            .iter()
            .filter_map(|u| Url::parse(u).ok())
            .map(|u| u.path().to_string())
            .filter(|p| p != "/")
            .take(SAMPLE_PATHS)
            .collect();

        let mut suggested = BTreeSet::new();
        if self.client.is_some() {
            for focus in FOCUS_AREAS.iter().take(settings.max_requests.max(1)) {
                let prompt = build_prompt(ctx.domain(), site_type, &sample, focus);
                match self.complete(&prompt, settings.max_requests).await {
                    Some(text) => suggested.extend(parse_llm_response(&text, &ctx.base)),
                    None => break,
                }
            }
        }

        let used_fallback = suggested.is_empty();
        if used_fallback {
            info!("Using {} heuristic paths", site_type);
            suggested = site_type
                .fallback_paths()
                .iter()
                .filter_map(|p| ctx.base.join(p).ok())
                .map(|u| u.to_string())
                .collect();
        }

        let candidates: Vec<String> = suggested.into_iter().take(settings.max_urls).collect();
        let probe = ctx.probe_candidates(&candidates, self.source()).await;
        report.absorb(&probe);
        info!(
            "LLM: {} suggestions, {} exist, {} new URLs",
            candidates.len(),
            probe.found,
            probe.new_urls
        );

        let origin = if used_fallback { "heuristic" } else { "model" };
        report.with_note(format!(
            "{} site, {} {} suggestions, {} requests",
            site_type,
            candidates.len(),
            origin,
            self.requests_made()
        ))
    }
}
