//! Robots.txt handling module
//!
//! Robots.txt is read as a map of the site: sitemap locations, allowed
//! paths and disallowed paths all point at URLs that exist. This module
//! parses the file and turns its paths into candidate URLs.

mod parser;

pub use parser::RobotsDirectives;

use std::collections::BTreeSet;
use url::Url;

const PAGE_SUFFIXES: &[&str] = &[".html", ".htm", ".php", ".asp"];

/// URL for an `Allow:` path, or None for the root and wildcard patterns
pub fn allow_to_url(path: &str, base: &Url) -> Option<String> {
    let path = path.trim();
    if path.is_empty() || path == "/" || path.contains('*') {
        return None;
    }
    base.join(path).ok().map(|u| u.to_string())
}

/// Candidate URLs hinted at by a `Disallow:` path
///
/// - `/` and patterns starting with `*` yield nothing
/// - other `*` wildcards and `$` anchors are stripped
/// - `/dir/` yields the directory, `index.html` and `index.php`
/// - `/page.html` (or `.htm`, `.php`, `.asp`) yields just the page
/// - `/name` yields `/name`, `/name/` and `/name/index.html`
pub fn disallow_to_urls(path: &str, base: &Url) -> Vec<String> {
    let path = path.trim();
    if path.is_empty() || path == "/" || path.starts_with('*') {
        return Vec::new();
    }
    let path = path.replace(['*', '$'], "");
    if path.is_empty() || path == "/" {
        return Vec::new();
    }

    let variants: Vec<String> = if path.ends_with('/') {
        vec![
            path.clone(),
            format!("{}index.html", path),
            format!("{}index.php", path),
        ]
    } else {
        let lower = path.to_ascii_lowercase();
        if PAGE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
            vec![path.clone()]
        } else {
            vec![
                path.clone(),
                format!("{}/", path),
                format!("{}/index.html", path),
            ]
        }
    };

    variants
        .iter()
        .filter_map(|p| base.join(p).ok())
        .map(|u| u.to_string())
        .collect()
}

/// Every candidate URL hinted at by `directives`
pub fn candidate_urls(directives: &RobotsDirectives, base: &Url) -> BTreeSet<String> {
    let mut urls = BTreeSet::new();
    for path in &directives.allow {
        urls.extend(allow_to_url(path, base));
    }
    for path in &directives.disallow {
        urls.extend(disallow_to_urls(path, base));
    }
    urls
}
