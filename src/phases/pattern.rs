//! Pattern-based URL generation
//!
//! Discovered URLs are analysed for dates, numeric ids, numbered sequences,
//! language prefixes, category words, file extensions and query keys. Each
//! signal is expanded into sibling URLs that plausibly exist, and the
//! result is probed.

use crate::config::PatternPhaseConfig;
use crate::frontier::DiscoverySource;
use crate::phases::{PhaseContext, PhaseDriver, PhaseReport};
use async_trait::async_trait;
use chrono::Datelike;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use tracing::info;
use url::Url;

static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^20[0-3]\d$").expect("valid regex"));

static MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(0[1-9]|1[0-2])$").expect("valid regex"));

static PREFIXED_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z][A-Za-z_-]*?)(\d{1,6})$").expect("valid regex"));

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

const CATEGORY_WORDS: &[&str] = &["news", "blog", "article", "post", "page", "category", "tag"];

const LANGUAGE_CODES: &[&str] = &[
    "en", "ja", "zh", "ko", "fr", "de", "es", "it", "pt", "ru", "vi", "th", "id", "tl", "ne",
];

const DEFAULT_LANGUAGES: &[&str] = &["en", "ja", "zh", "ko"];

const YEAR_SECTIONS: &[&str] = &["archive", "news", "blog"];

const COMMON_FILE_NAMES: &[&str] = &[
    "index", "default", "home", "top", "about", "contact", "news", "list", "search", "info",
];

const ID_SPREAD: u64 = 5;
const SEQUENCE_SPREAD: u64 = 10;
const FIRST_ARCHIVE_YEAR: i32 = 2020;
const MAX_QUERY_PATHS: usize = 20;
const MAX_LANGUAGE_SWAPS: usize = 50;

/// Signals found in a set of URLs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlPatterns {
    pub years: BTreeSet<i32>,
    pub months: BTreeSet<u32>,
    pub languages: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub extensions: BTreeSet<String>,
    /// Query keys seen per `origin + path`
    pub query_keys: BTreeMap<String, BTreeSet<String>>,
    /// URLs grouped by path shape (digit runs replaced by `#`)
    pub shapes: BTreeMap<String, Vec<Url>>,
}

/// Collects pattern signals from `urls`
pub fn analyze(urls: &[String]) -> UrlPatterns {
    let mut patterns = UrlPatterns::default();

    for raw in urls {
        let Ok(url) = Url::parse(raw) else {
            continue;
        };
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        let mut previous_was_year = false;
        for (index, segment) in segments.iter().enumerate() {
            let (stem, ext) = split_extension(segment);
            if YEAR.is_match(stem) {
                if let Ok(year) = stem.parse() {
                    patterns.years.insert(year);
                }
                previous_was_year = true;
                continue;
            }
            if previous_was_year && MONTH.is_match(stem) {
                if let Ok(month) = stem.parse() {
                    patterns.months.insert(month);
                }
            }
            previous_was_year = false;

            if index == 0 && LANGUAGE_CODES.contains(&segment.to_ascii_lowercase().as_str()) {
                patterns.languages.insert(segment.to_ascii_lowercase());
            }
            let lower = stem.to_ascii_lowercase();
            if CATEGORY_WORDS.contains(&lower.as_str()) {
                patterns.categories.insert(lower);
            }
            if let Some(ext) = ext {
                if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                    patterns.extensions.insert(ext.to_ascii_lowercase());
                }
            }
        }

        if DIGIT_RUN.is_match(url.path()) {
            let shape = DIGIT_RUN.replace_all(url.path(), "#").into_owned();
            let mut bare = url.clone();
            bare.set_query(None);
            bare.set_fragment(None);
            patterns.shapes.entry(shape).or_default().push(bare);
        }

        if url.query().is_some() {
            let path_key = format!("{}{}", url.origin().ascii_serialization(), url.path());
            let keys = patterns.query_keys.entry(path_key).or_default();
            for (key, _) in url.query_pairs() {
                if !key.is_empty() {
                    keys.insert(key.into_owned());
                }
            }
        }
    }
    patterns
}

fn split_extension(segment: &str) -> (&str, Option<&str>) {
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (segment, None),
    }
}

/// Ordered, deduplicated candidate list with a hard cap
struct Candidates {
    urls: Vec<String>,
    seen: BTreeSet<String>,
    cap: usize,
}

impl Candidates {
    fn new(cap: usize) -> Self {
        Self {
            urls: Vec::new(),
            seen: BTreeSet::new(),
            cap,
        }
    }

    fn full(&self) -> bool {
        self.urls.len() >= self.cap
    }

    fn push(&mut self, url: String) {
        if !self.full() && self.seen.insert(url.clone()) {
            self.urls.push(url);
        }
    }

    fn push_path(&mut self, base: &Url, path: &str) {
        if let Ok(url) = base.join(path) {
            self.push(url.to_string());
        }
    }
}

/// Expands `patterns` into candidate URLs, at most `config.max_generated`
pub fn generate(
    patterns: &UrlPatterns,
    base: &Url,
    config: &PatternPhaseConfig,
    current_year: i32,
) -> Vec<String> {
    let mut out = Candidates::new(config.max_generated);

    if config.date_patterns {
        let mut years: BTreeSet<i32> = patterns.years.clone();
        years.extend(FIRST_ARCHIVE_YEAR..=current_year);
        for year in years.iter().rev() {
            out.push_path(base, &format!("/{}/", year));
            for section in YEAR_SECTIONS {
                out.push_path(base, &format!("/{}/{}/", section, year));
            }
        }
        for year in years.iter().rev().filter(|y| **y >= current_year - 2) {
            for month in 1..=12 {
                out.push_path(base, &format!("/{}/{:02}/", year, month));
                out.push_path(base, &format!("/archive/{}/{:02}/", year, month));
            }
        }
    }

    if config.numeric_patterns {
        for urls in patterns.shapes.values() {
            if urls.len() < config.min_pattern_frequency {
                continue;
            }
            for url in urls {
                for variant in numeric_variants(url) {
                    out.push(variant);
                }
            }
        }
    }

    for category in &patterns.categories {
        for suffix in ["", "index.html", "list.html", "archive/", "page/2/", "page/3/"] {
            out.push_path(base, &format!("/{}/{}", category, suffix));
        }
    }

    let mut extensions = patterns.extensions.clone();
    extensions.insert("html".to_string());
    let mut directories = vec!["/".to_string()];
    directories.extend(patterns.categories.iter().map(|c| format!("/{}/", c)));
    for directory in &directories {
        for name in COMMON_FILE_NAMES {
            for ext in &extensions {
                out.push_path(base, &format!("{}{}.{}", directory, name, ext));
            }
        }
    }

    for (path, keys) in patterns.query_keys.iter().take(MAX_QUERY_PATHS) {
        for key in keys {
            for value in 1..=5 {
                out.push(format!("{}?{}={}", path, key, value));
            }
        }
    }

    if config.language_patterns {
        let mut languages: BTreeSet<String> = patterns.languages.clone();
        languages.extend(DEFAULT_LANGUAGES.iter().map(|l| l.to_string()));
        for lang in &languages {
            out.push_path(base, &format!("/{}/", lang));
        }
        let localized = patterns
            .shapes
            .values()
            .flatten()
            .filter(|u| first_segment_language(u).is_some())
            .take(MAX_LANGUAGE_SWAPS);
        for url in localized {
            for lang in &languages {
                if let Some(swapped) = swap_language(url, lang) {
                    out.push(swapped);
                }
            }
        }
    }

    out.urls
}

/// Neighbouring ids (±5) and sequence numbers (±10) of the numbers in `url`
fn numeric_variants(url: &Url) -> Vec<String> {
    let segments: Vec<String> = match url.path_segments() {
        Some(s) => s.map(str::to_string).collect(),
        None => return Vec::new(),
    };
    let mut variants = Vec::new();

    for (index, segment) in segments.iter().enumerate() {
        let (stem, ext) = split_extension(segment);
        let suffix = ext.map(|e| format!(".{}", e)).unwrap_or_default();

        if stem.len() <= 8 && !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()) {
            if YEAR.is_match(stem) || MONTH.is_match(stem) {
                continue;
            }
            let Ok(n) = stem.parse::<u64>() else {
                continue;
            };
            for value in spread(n, ID_SPREAD) {
                let replacement = format!("{:0width$}{}", value, suffix, width = stem.len());
                variants.extend(replace_segment(url, &segments, index, &replacement));
            }
        } else if let Some(caps) = PREFIXED_NUMBER.captures(stem) {
            let (Some(prefix), Some(digits)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let Ok(n) = digits.as_str().parse::<u64>() else {
                continue;
            };
            for value in spread(n, SEQUENCE_SPREAD) {
                let replacement = format!("{}{}{}", prefix.as_str(), value, suffix);
                variants.extend(replace_segment(url, &segments, index, &replacement));
            }
        }
    }
    variants
}

fn spread(n: u64, by: u64) -> impl Iterator<Item = u64> {
    (n.saturating_sub(by)..=n.saturating_add(by)).filter(move |v| *v != n)
}

fn replace_segment(url: &Url, segments: &[String], index: usize, value: &str) -> Option<String> {
    let mut parts = segments.to_vec();
    *parts.get_mut(index)? = value.to_string();
    let mut candidate = url.clone();
    candidate.set_path(&format!("/{}", parts.join("/")));
    Some(candidate.to_string())
}

fn first_segment_language(url: &Url) -> Option<String> {
    let first = url.path_segments()?.next()?.to_ascii_lowercase();
    LANGUAGE_CODES.contains(&first.as_str()).then_some(first)
}

fn swap_language(url: &Url, lang: &str) -> Option<String> {
    let current = first_segment_language(url)?;
    if current == lang {
        return None;
    }
    let segments: Vec<String> = url.path_segments()?.map(str::to_string).collect();
    replace_segment(url, &segments, 0, lang)
}

/// Generates and probes URLs following the site's own patterns
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternPhase;

#[async_trait]
impl PhaseDriver for PatternPhase {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn source(&self) -> DiscoverySource {
        DiscoverySource::Pattern
    }

    async fn run(&self, ctx: &PhaseContext) -> PhaseReport {
        let mut report = PhaseReport::new(self.name());
        let discovered = ctx.discovered_urls().await;
        let patterns = analyze(&discovered);
        let candidates = generate(
            &patterns,
            &ctx.base,
            &ctx.config.phases.pattern,
            chrono::Utc::now().year(),
        );
        info!(
            "Patterns: {} years, {} categories, {} shapes -> {} candidates",
            patterns.years.len(),
            patterns.categories.len(),
            patterns.shapes.len(),
            candidates.len()
        );

        let probe = ctx.probe_candidates(&candidates, self.source()).await;
        report.absorb(&probe);
        report.with_note(format!("{} candidates generated", candidates.len()))
    }
}
