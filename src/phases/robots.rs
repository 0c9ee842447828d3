//! robots.txt analysis
//!
//! robots.txt is mined for structure: `Sitemap:` lines go to the sitemap
//! walker, and `Allow:`/`Disallow:` paths become frontier URLs.

use crate::frontier::DiscoverySource;
use crate::phases::sitemap::walk_sitemaps;
use crate::phases::{PhaseContext, PhaseDriver, PhaseReport};
use crate::robots::{candidate_urls, RobotsDirectives};
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct RobotsPhase;

#[async_trait]
impl PhaseDriver for RobotsPhase {
    fn name(&self) -> &'static str {
        "robots"
    }

    fn source(&self) -> DiscoverySource {
        DiscoverySource::Robots
    }

    async fn run(&self, ctx: &PhaseContext) -> PhaseReport {
        let mut report = PhaseReport::new(self.name());

        let robots_url = match ctx.base.join("/robots.txt") {
            Ok(url) => url.to_string(),
            Err(e) => return report.with_note(format!("invalid robots.txt URL: {}", e)),
        };
        let Some(content) = ctx.fetch_document(&robots_url).await else {
            info!("No robots.txt at {}", robots_url);
            return report.with_note("robots.txt not available");
        };

        let directives = RobotsDirectives::parse(&content.html);
        if directives.is_empty() {
            return report.with_note("robots.txt has no usable directives");
        }

        let candidates = candidate_urls(&directives, &ctx.base);
        report.new_urls += ctx
            .add_urls(&candidates, Some(robots_url.as_str()), self.source())
            .await;

        let walk = walk_sitemaps(ctx, directives.sitemaps.clone(), self.source()).await;
        report.new_urls += walk.new_urls;

        info!(
            "robots.txt: {} allow, {} disallow, {} sitemaps, {} new URLs",
            directives.allow.len(),
            directives.disallow.len(),
            directives.sitemaps.len(),
            report.new_urls
        );

        let mut note = format!(
            "{} path candidates, {} sitemap documents",
            candidates.len(),
            walk.documents
        );
        if let Some(delay) = directives.crawl_delay {
            note.push_str(&format!(", crawl-delay {}s", delay));
        }
        report.with_note(note)
    }
}
