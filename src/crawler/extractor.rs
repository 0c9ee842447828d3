//! Link extraction from fetched pages
//!
//! This module collects every link-like reference in a page:
//! - links the engine already extracted
//! - `<a href>` and `<area href>` anchors
//! - `src`/`href`/`action` attributes of frames, scripts, forms, embeds and media
//! - `.htm(l)` paths and absolute URLs quoted inside inline scripts
//! - `<meta http-equiv="refresh">` targets
//! - markdown `[text](url)` links from the engine's markdown rendering
//!
//! No scope filtering happens here; that is the URL filter's job.

use crate::crawler::validity::PageContent;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use url::Url;

static SCRIPT_HTML_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']([^"'\s<>]*\.html?(?:[?#][^"'\s<>]*)?)["']"#).expect("valid regex")
});

static SCRIPT_ABSOLUTE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>()\\]+"#).expect("valid regex"));

static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[[^\]]*\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"]*")?\s*\)"#).expect("valid regex")
});

const RESOURCE_SELECTORS: &[(&str, &str)] = &[
    ("iframe[src]", "src"),
    ("frame[src]", "src"),
    ("script[src]", "src"),
    ("form[action]", "action"),
    ("link[href]", "href"),
    ("img[src]", "src"),
    ("embed[src]", "src"),
    ("source[src]", "src"),
];

/// Extracts absolute http(s) links from page content
#[derive(Debug, Clone, Default)]
pub struct LinkExtractor;

impl LinkExtractor {
    pub fn new() -> Self {
        Self
    }

    /// All links in `content`, resolved against `source_url`
    ///
    /// Returns an empty set when `source_url` is not an absolute URL.
    pub fn extract_links(&self, content: &PageContent, source_url: &str) -> BTreeSet<String> {
        let source = match Url::parse(source_url) {
            Ok(u) => u,
            Err(_) => return BTreeSet::new(),
        };

        let mut links = BTreeSet::new();

        for link in &content.links {
            push_resolved(&mut links, link, &source);
        }

        self.extract_from_html(&content.html, &source, &mut links);

        if let Some(markdown) = &content.markdown {
            for caps in MARKDOWN_LINK.captures_iter(markdown) {
                if let Some(m) = caps.get(1) {
                    push_resolved(&mut links, m.as_str(), &source);
                }
            }
        }

        links
    }

    /// Convenience wrapper for raw HTML
    pub fn extract_from_str(&self, html: &str, source_url: &str) -> BTreeSet<String> {
        self.extract_links(&PageContent::from_html(html), source_url)
    }

    fn extract_from_html(&self, html: &str, source: &Url, links: &mut BTreeSet<String>) {
        if html.is_empty() {
            return;
        }
        let document = Html::parse_document(html);
        let base = document_base(&document, source);

        if let Ok(selector) = Selector::parse("a[href], area[href]") {
            for element in document.select(&selector) {
                if let Some(href) = element.value().attr("href") {
                    push_resolved(links, href, &base);
                }
            }
        }

        for (css, attr) in RESOURCE_SELECTORS {
            if let Ok(selector) = Selector::parse(css) {
                for element in document.select(&selector) {
                    if let Some(value) = element.value().attr(attr) {
                        push_resolved(links, value, &base);
                    }
                }
            }
        }

        if let Ok(selector) = Selector::parse("meta[http-equiv]") {
            for element in document.select(&selector) {
                let is_refresh = element
                    .value()
                    .attr("http-equiv")
                    .is_some_and(|v| v.eq_ignore_ascii_case("refresh"));
                if !is_refresh {
                    continue;
                }
                if let Some(target) = element.value().attr("content").and_then(refresh_target) {
                    push_resolved(links, target, &base);
                }
            }
        }

        if let Ok(selector) = Selector::parse("script:not([src])") {
            for element in document.select(&selector) {
                let body: String = element.text().collect();
                for caps in SCRIPT_HTML_PATH.captures_iter(&body) {
                    if let Some(m) = caps.get(1) {
                        push_resolved(links, m.as_str(), &base);
                    }
                }
                for m in SCRIPT_ABSOLUTE_URL.find_iter(&body) {
                    push_resolved(links, m.as_str(), &base);
                }
            }
        }
    }
}

/// The URL relative links resolve against: `<base href>` if present and valid
fn document_base(document: &Html, source: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|el| el.value().attr("href"))
                .and_then(|href| source.join(href.trim()).ok())
        })
        .unwrap_or_else(|| source.clone())
}

/// The `url=` part of a meta refresh `content` attribute
fn refresh_target(content: &str) -> Option<&str> {
    let lower = content.to_ascii_lowercase();
    let idx = lower.find("url=")?;
    let target = content[idx + 4..].trim().trim_matches(|c| c == '\'' || c == '"');
    if target.is_empty() {
        None
    } else {
        Some(target)
    }
}

fn push_resolved(links: &mut BTreeSet<String>, href: &str, base: &Url) {
    if let Some(url) = resolve_link(href, base) {
        links.insert(url);
    }
}

/// Resolves a link href to an absolute URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    let mut absolute = base.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);
    Some(absolute.to_string())
}
