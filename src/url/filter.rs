//! Scope filter for candidate URLs
//!
//! The filter is intentionally permissive: junk URLs that slip through cost a
//! cheap failed fetch, while a wrongly rejected URL is lost for good.

use crate::config::FilterConfig;
use crate::url::domain::host_in_scope;
use std::collections::BTreeSet;
use url::Url;

/// Decides whether `url` belongs in the frontier of `domain`
///
/// `source` is the page (or sitemap) the URL was found on; a URL equal to its
/// source is rejected. When the source is itself a sitemap document, URLs
/// named like sitemap files are rejected too, so a sitemap never lists itself
/// or its siblings as pages. Pure and deterministic.
///
/// # Examples
///
/// ```
/// use url_harvest::config::FilterConfig;
/// use url_harvest::url::should_include;
///
/// let config = FilterConfig::default();
/// assert!(should_include("https://example.test/a.html", None, "example.test", &config));
/// assert!(!should_include("https://example.test/logo.png", None, "example.test", &config));
/// assert!(!should_include("https://other.test/a.html", None, "example.test", &config));
/// ```
pub fn should_include(
    url: &str,
    source: Option<&str>,
    domain: &str,
    config: &FilterConfig,
) -> bool {
    let url = url.trim();
    if url.is_empty() || url.len() > config.max_url_length {
        return false;
    }

    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return false,
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }

    let host = match parsed.host_str() {
        Some(h) if !h.is_empty() => h,
        _ => return false,
    };
    if !host_in_scope(host, domain, config.allow_subdomains) {
        return false;
    }

    let path = parsed.path();
    if has_blocked_extension(path, &config.blocked_extensions) {
        return false;
    }

    if let Some(source) = source {
        if is_same_page(&parsed, source) {
            return false;
        }
        if is_sitemap_document(source, &config.sitemap_names)
            && has_sitemap_name(path, &config.sitemap_names)
        {
            return false;
        }
    }

    true
}

fn has_sitemap_name(path: &str, names: &[String]) -> bool {
    let path = path.to_ascii_lowercase();
    names
        .iter()
        .any(|name| path.ends_with(&name.to_ascii_lowercase()))
}

/// Whether `source` is a sitemap: a configured sitemap name or any `.xml` file
fn is_sitemap_document(source: &str, names: &[String]) -> bool {
    match Url::parse(source) {
        Ok(source) => {
            let path = source.path();
            has_sitemap_name(path, names) || path.to_ascii_lowercase().ends_with(".xml")
        }
        Err(_) => false,
    }
}

/// Whether the final path segment ends in one of `blocked` (case-insensitive)
fn has_blocked_extension(path: &str, blocked: &[String]) -> bool {
    let segment = path.rsplit('/').next().unwrap_or("");
    match segment.rsplit_once('.') {
        Some((_, ext)) => blocked.iter().any(|b| b.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

fn is_same_page(candidate: &Url, source: &str) -> bool {
    match Url::parse(source) {
        Ok(mut source) => {
            source.set_fragment(None);
            let mut candidate = candidate.clone();
            candidate.set_fragment(None);
            source == candidate
        }
        Err(_) => false,
    }
}

/// [`should_include`] bound to one domain and configuration
#[derive(Debug, Clone)]
pub struct UrlFilter {
    domain: String,
    config: FilterConfig,
}

impl UrlFilter {
    pub fn new(domain: impl Into<String>, config: FilterConfig) -> Self {
        Self {
            domain: domain.into().to_lowercase(),
            config,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn accepts(&self, url: &str, source: Option<&str>) -> bool {
        should_include(url, source, &self.domain, &self.config)
    }

    /// Keeps the in-scope URLs of `urls`, fragments stripped
    pub fn retain<I, S>(&self, urls: I, source: Option<&str>) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        urls.into_iter()
            .filter(|u| self.accepts(u.as_ref(), source))
            .filter_map(|u| crate::url::normalize_str(u.as_ref()))
            .collect()
    }
}
