//! Sitemap discovery
//!
//! Sitemap documents are looked for at the usual locations and at every
//! `Sitemap:` line of robots.txt. Parsing degrades step by step:
//!
//! 1. `sitemapindex > sitemap > loc` and `urlset > url > loc`
//! 2. the same without the XML declaration
//! 3. any `<loc>` element, matched leniently
//! 4. HTML anchors (for `sitemap.html` style pages)
//! 5. bare `http(s)://` URLs anywhere in the text

use crate::crawler::resolve_link;
use crate::frontier::DiscoverySource;
use crate::phases::{PhaseContext, PhaseDriver, PhaseReport};
use crate::robots::RobotsDirectives;
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

/// Locations tried relative to the base URL
pub const SITEMAP_LOCATIONS: &[&str] = &[
    "sitemap.xml",
    "sitemap_index.xml",
    "sitemaps.xml",
    "sitemap.html",
    "sitemap/",
    "wp-sitemap.xml",
    "news-sitemap.xml",
    "video-sitemap.xml",
    "product-sitemap.xml",
    "page-sitemap.xml",
];

static XML_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*<\?xml[^>]*\?>").expect("valid regex"));

static LENIENT_LOC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<loc[^>]*>([^<]+)</loc>").expect("valid regex"));

static BARE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"'()]+[^\s<>"'().,!?;]"#).expect("valid regex")
});

/// URLs found in one sitemap document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSitemap {
    /// Page URLs
    pub pages: BTreeSet<String>,
    /// Further sitemap documents listed by a sitemap index
    pub nested: BTreeSet<String>,
}

impl ParsedSitemap {
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.nested.is_empty()
    }
}

/// Parses a sitemap document fetched from `base`
///
/// Never fails: a document nothing can be read from yields an empty result.
pub fn parse_sitemap(body: &str, base: &Url) -> ParsedSitemap {
    let body = body.trim_start_matches('\u{feff}');
    let body = body.replace("<![CDATA[", "").replace("]]>", "");

    let parsed = parse_structured(&body, base);
    if !parsed.is_empty() {
        return parsed;
    }

    if XML_DECLARATION.is_match(&body) {
        let stripped = XML_DECLARATION.replace(&body, "");
        let parsed = parse_structured(&stripped, base);
        if !parsed.is_empty() {
            return parsed;
        }
    }

    let mut parsed = ParsedSitemap::default();
    for caps in LENIENT_LOC.captures_iter(&body) {
        if let Some(loc) = caps.get(1) {
            push_loc(&mut parsed.pages, loc.as_str(), base);
        }
    }
    if !parsed.is_empty() {
        return parsed;
    }

    parsed.pages = html_anchors(&body, base);
    if !parsed.is_empty() {
        return parsed;
    }

    for m in BARE_URL.find_iter(&body) {
        push_loc(&mut parsed.pages, m.as_str(), base);
    }
    parsed
}

fn parse_structured(body: &str, base: &Url) -> ParsedSitemap {
    let document = Html::parse_document(body);
    let mut parsed = ParsedSitemap::default();

    if let Ok(selector) = Selector::parse("sitemapindex sitemap loc") {
        for loc in document.select(&selector) {
            push_loc(&mut parsed.nested, &loc.text().collect::<String>(), base);
        }
    }
    if let Ok(selector) = Selector::parse("urlset url loc") {
        for loc in document.select(&selector) {
            push_loc(&mut parsed.pages, &loc.text().collect::<String>(), base);
        }
    }
    parsed
}

fn html_anchors(body: &str, base: &Url) -> BTreeSet<String> {
    let mut urls = BTreeSet::new();
    let document = Html::parse_document(body);
    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                urls.extend(resolve_link(href, base));
            }
        }
    }
    urls
}

fn push_loc(urls: &mut BTreeSet<String>, raw: &str, base: &Url) {
    let value = raw.trim().replace("&amp;", "&");
    if value.is_empty() {
        return;
    }
    if let Some(url) = resolve_link(&value, base) {
        urls.insert(url);
    }
}

/// Counters for one [`walk_sitemaps`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SitemapWalk {
    pub documents: usize,
    pub pages_found: usize,
    pub new_urls: usize,
}

/// Fetches `roots` and every nested sitemap they list, adding page URLs
///
/// Documents are fetched level by level through the ladder. Each document is
/// fetched at most once per run, however many phases hand it over.
pub async fn walk_sitemaps(
    ctx: &PhaseContext,
    roots: Vec<String>,
    source: DiscoverySource,
) -> SitemapWalk {
    let settings = &ctx.config.phases.sitemap;
    let mut walk = SitemapWalk::default();
    let mut level = roots;
    let mut depth = 0;

    while !level.is_empty() && walk.documents < settings.max_sitemaps {
        let mut batch = Vec::new();
        for url in level {
            if walk.documents + batch.len() >= settings.max_sitemaps {
                break;
            }
            if ctx.mark_sitemap_seen(&url).await {
                batch.push(url);
            }
        }
        if batch.is_empty() {
            break;
        }
        walk.documents += batch.len();

        let results = ctx.fetch_documents(&batch).await;
        let mut next = BTreeSet::new();
        for (url, result) in results {
            let Some(content) = result.outcome.content() else {
                debug!("Sitemap {} unavailable: {}", url, result.outcome.label());
                continue;
            };
            let Ok(doc_base) = Url::parse(&url) else {
                continue;
            };
            let parsed = parse_sitemap(&content.html, &doc_base);
            walk.pages_found += parsed.pages.len();
            let added = ctx.add_urls(&parsed.pages, Some(url.as_str()), source).await;
            walk.new_urls += added;
            debug!(
                "Sitemap {}: {} pages ({} new), {} nested",
                url,
                parsed.pages.len(),
                added,
                parsed.nested.len()
            );
            if depth < settings.max_nesting {
                next.extend(parsed.nested);
            }
        }

        level = next.into_iter().collect();
        depth += 1;
    }
    walk
}

/// Discovers URLs from XML and HTML sitemaps
#[derive(Debug, Clone, Copy, Default)]
pub struct SitemapPhase;

impl SitemapPhase {
    /// Standard locations plus configured extras, resolved against `base`
    pub fn candidate_locations(base: &Url, extra: &[String]) -> Vec<String> {
        SITEMAP_LOCATIONS
            .iter()
            .copied()
            .chain(extra.iter().map(String::as_str))
            .filter_map(|loc| base.join(loc).ok())
            .map(|u| u.to_string())
            .collect()
    }
}

#[async_trait]
impl PhaseDriver for SitemapPhase {
    fn name(&self) -> &'static str {
        "sitemap"
    }

    fn source(&self) -> DiscoverySource {
        DiscoverySource::Sitemap
    }

    async fn run(&self, ctx: &PhaseContext) -> PhaseReport {
        let mut report = PhaseReport::new(self.name());
        let mut roots =
            Self::candidate_locations(&ctx.base, &ctx.config.phases.sitemap.extra_locations);

        if let Ok(robots_url) = ctx.base.join("/robots.txt") {
            if let Some(content) = ctx.fetch_document(robots_url.as_str()).await {
                let directives = RobotsDirectives::parse(&content.html);
                for sitemap in directives.sitemaps {
                    if !roots.contains(&sitemap) {
                        roots.push(sitemap);
                    }
                }
            }
        }

        let walk = walk_sitemaps(ctx, roots, self.source()).await;
        report.new_urls = walk.new_urls;
        info!(
            "Sitemaps: {} documents, {} page URLs, {} new",
            walk.documents, walk.pages_found, walk.new_urls
        );
        report.with_note(format!("{} sitemap documents fetched", walk.documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::testing::*;
    use std::sync::Arc;

    fn base() -> Url {
        Url::parse("https://example.test/").unwrap()
    }

    #[test]
    fn test_parse_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.test/a.html</loc><lastmod>2024-01-01</lastmod></url>
  <url><loc> https://example.test/b.html?x=1&amp;y=2 </loc></url>
</urlset>"#;
        let parsed = parse_sitemap(xml, &base());
        assert_eq!(
            parsed.pages.into_iter().collect::<Vec<_>>(),
            vec![
                "https://example.test/a.html",
                "https://example.test/b.html?x=1&y=2",
            ]
        );
        assert!(parsed.nested.is_empty());
    }

    #[test]
    fn test_parse_index() {
        let xml = "\u{feff}<sitemapindex>\
            <sitemap><loc>https://example.test/s1.xml</loc></sitemap>\
            <sitemap><loc><![CDATA[https://example.test/s2.xml]]></loc></sitemap>\
            </sitemapindex>";
        let parsed = parse_sitemap(xml, &base());
        assert!(parsed.pages.is_empty());
        assert_eq!(parsed.nested.len(), 2);
        assert!(parsed.nested.contains("https://example.test/s2.xml"));
    }

    #[test]
    fn test_lenient_and_fallbacks() {
        let broken = "<urlset><loc>https://example.test/x.html</loc><garbage";
        let parsed = parse_sitemap(broken, &base());
        assert!(parsed.pages.contains("https://example.test/x.html"));

        let html = r#"<html><body><ul><li><a href="/about/">About</a></li></ul></body></html>"#;
        let parsed = parse_sitemap(html, &base());
        assert!(parsed.pages.contains("https://example.test/about/"));

        let text = "Pages:\nhttps://example.test/one.html.\nhttps://example.test/two/\n";
        let parsed = parse_sitemap(text, &base());
        assert!(parsed.pages.contains("https://example.test/one.html"));
        assert!(parsed.pages.contains("https://example.test/two/"));

        assert!(parse_sitemap("", &base()).is_empty());
    }

    #[test]
    fn test_candidate_locations() {
        let locations =
            SitemapPhase::candidate_locations(&base(), &["custom/map.xml".to_string()]);
        assert_eq!(locations.len(), SITEMAP_LOCATIONS.len() + 1);
        assert_eq!(locations[0], "https://example.test/sitemap.xml");
        assert!(locations.contains(&"https://example.test/custom/map.xml".to_string()));
    }

    #[tokio::test]
    async fn test_phase_follows_index_and_robots() {
        let engine = Arc::new(SiteEngine::with_pages(&[
            (
                "https://example.test/robots.txt",
                "User-agent: *\nSitemap: https://example.test/extra-map.xml\n",
            ),
            (
                "https://example.test/sitemap_index.xml",
                "<sitemapindex><sitemap><loc>https://example.test/posts.xml</loc></sitemap></sitemapindex>",
            ),
            (
                "https://example.test/posts.xml",
                "<urlset><url><loc>https://example.test/post/1.html</loc></url></urlset>",
            ),
            (
                "https://example.test/extra-map.xml",
                "<urlset><url><loc>https://example.test/extra.html</loc></url>\
                 <url><loc>https://other.test/skip.html</loc></url></urlset>",
            ),
        ]));
        let ctx = context(engine.clone());

        let report = SitemapPhase.run(&ctx).await;
        assert_eq!(report.new_urls, 2);

        let discovered = ctx.discovered_urls().await;
        assert_eq!(
            discovered,
            vec![
                "https://example.test/extra.html",
                "https://example.test/post/1.html",
            ]
        );
        assert_eq!(ctx.crawl.frontier.lock().await.crawled_count(), 0);
    }
}
