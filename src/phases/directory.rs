//! Common directory guessing

use crate::frontier::DiscoverySource;
use crate::phases::{PhaseContext, PhaseDriver, PhaseReport};
use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::info;
use url::Url;

/// Directory paths probed on every site, by theme
pub const DIRECTORY_GROUPS: &[(&str, &[&str])] = &[
    (
        "admin",
        &[
            "admin", "administration", "management", "organization", "department",
            "division", "office", "governance", "board", "staff", "council", "mayor",
        ],
    ),
    (
        "info",
        &[
            "about", "info", "information", "profile", "overview", "history", "company",
            "corporate", "outline", "policy", "policies", "privacy", "access",
        ],
    ),
    (
        "services",
        &[
            "service", "services", "product", "products", "solution", "solutions", "program",
            "programs", "plan", "plans", "business", "industry", "shop", "store",
        ],
    ),
    (
        "resources",
        &[
            "resource", "resources", "material", "materials", "library", "archive", "archives",
            "document", "documents", "file", "files", "download", "downloads", "form", "forms",
            "publication", "publications", "report", "reports",
        ],
    ),
    (
        "news",
        &[
            "news", "notice", "notices", "announcement", "announcements", "press", "release",
            "releases", "topics", "update", "updates", "blog", "event", "events", "calendar",
            "schedule", "newsletter",
        ],
    ),
    (
        "support",
        &[
            "support", "help", "faq", "qa", "guide", "guides", "manual", "docs", "documentation",
            "howto", "contact", "contacts", "inquiry", "feedback",
        ],
    ),
    (
        "content",
        &[
            "content", "contents", "page", "pages", "article", "articles", "post", "posts",
            "category", "categories", "topic", "section", "sections", "column", "feature",
            "features", "story", "stories", "media", "gallery", "photo", "photos", "video",
            "videos",
        ],
    ),
    (
        "portal",
        &[
            "portal", "member", "members", "user", "users", "account", "mypage", "login",
            "register", "registration", "community", "citizen", "residents", "visitors",
            "tourism", "living", "life", "kids", "education", "health", "welfare", "safety",
            "environment", "culture", "sports",
        ],
    ),
    (
        "data",
        &[
            "data", "opendata", "statistics", "stats", "api", "feed", "feeds", "rss", "export",
            "bid", "procurement", "budget", "finance",
        ],
    ),
    (
        "search",
        &["search", "find", "lookup", "query", "sitemap", "index", "map", "links", "menu"],
    ),
];

/// Every directory path, deduplicated, as `/name/`
pub fn directory_paths(extra: &[String]) -> BTreeSet<String> {
    DIRECTORY_GROUPS
        .iter()
        .flat_map(|(_, names)| names.iter().map(|n| format!("/{}/", n)))
        .chain(extra.iter().map(|p| {
            let trimmed = p.trim().trim_matches('/');
            format!("/{}/", trimmed)
        }))
        .filter(|p| p != "//")
        .collect()
}

/// Directory candidates resolved against `base`
pub fn directory_candidates(base: &Url, extra: &[String]) -> BTreeSet<String> {
    directory_paths(extra)
        .iter()
        .filter_map(|path| base.join(path).ok())
        .map(|u| u.to_string())
        .collect()
}

/// Probes well-known directory names
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryPhase;

#[async_trait]
impl PhaseDriver for DirectoryPhase {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn source(&self) -> DiscoverySource {
        DiscoverySource::Directory
    }

    async fn run(&self, ctx: &PhaseContext) -> PhaseReport {
        let mut report = PhaseReport::new(self.name());
        let candidates = directory_candidates(&ctx.base, &ctx.config.phases.directory.extra_paths);
        info!("Probing {} directory candidates", candidates.len());

        let probe = ctx.probe_candidates(&candidates, self.source()).await;
        report.absorb(&probe);
        info!(
            "Directories: {}/{} exist, {} new URLs",
            probe.found, probe.tested, probe.new_urls
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::testing::*;
    use std::sync::Arc;

    #[test]
    fn test_paths_are_unique_and_plentiful() {
        let paths = directory_paths(&[]);
        let total: usize = DIRECTORY_GROUPS.iter().map(|(_, n)| n.len()).sum();
        assert!(paths.len() >= 150);
        assert!(paths.len() <= total);
        assert!(paths.contains("/news/"));
        assert!(paths.iter().all(|p| p.starts_with('/') && p.ends_with('/')));
    }

    #[test]
    fn test_extra_paths_normalized() {
        let paths = directory_paths(&["/kurashi".to_string(), "shisei/".to_string(), "/".to_string()]);
        assert!(paths.contains("/kurashi/"));
        assert!(paths.contains("/shisei/"));
        assert!(!paths.contains("//"));
    }

    #[tokio::test]
    async fn test_phase_keeps_existing_directories() {
        let engine = Arc::new(SiteEngine::with_pages(&[
            (
                "https://example.test/news/",
                &page(r#"<a href="/news/2024/item.html">item</a>"#),
            ),
            ("https://example.test/faq/", &page("")),
        ]));
        let ctx = context(engine);

        let report = DirectoryPhase.run(&ctx).await;
        assert_eq!(report.candidates_found, 2);
        assert_eq!(report.new_urls, 3);
        assert!(report.candidates_tested >= 150);
        assert_eq!(
            ctx.discovered_urls().await,
            vec![
                "https://example.test/faq/",
                "https://example.test/news/",
                "https://example.test/news/2024/item.html",
            ]
        );
    }
}
