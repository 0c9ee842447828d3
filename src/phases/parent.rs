//! Parent directory discovery
//!
//! Every discovered URL implies the directories above it: `/a/b/c.html`
//! lives under `/a/` and `/a/b/`. Those parents are often index pages that
//! nothing links to, so they are probed directly.

use crate::frontier::DiscoverySource;
use crate::phases::{PhaseContext, PhaseDriver, PhaseReport};
use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::info;
use url::Url;

/// Ancestor directory paths of `path`, shallowest first
///
/// The path itself is never included, and at most `max_levels` ancestors are
/// returned.
pub fn parent_paths(path: &str, max_levels: usize) -> Vec<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut parents = Vec::new();
    let mut current = String::from("/");
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        if parents.len() >= max_levels {
            break;
        }
        current.push_str(segment);
        current.push('/');
        parents.push(current.clone());
    }
    parents
}

/// Parent directory URLs of every URL in `urls`, at most `max_candidates`
pub fn parent_candidates<I, S>(urls: I, max_levels: usize, max_candidates: usize) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut candidates = BTreeSet::new();
    for url in urls {
        let Ok(parsed) = Url::parse(url.as_ref()) else {
            continue;
        };
        for path in parent_paths(parsed.path(), max_levels) {
            if let Ok(parent) = parsed.join(&path) {
                candidates.insert(parent.to_string());
            }
        }
    }
    candidates.into_iter().take(max_candidates).collect()
}

/// Probes the parent directories of everything discovered so far
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentPhase;

#[async_trait]
impl PhaseDriver for ParentPhase {
    fn name(&self) -> &'static str {
        "parent"
    }

    fn source(&self) -> DiscoverySource {
        DiscoverySource::Parent
    }

    async fn run(&self, ctx: &PhaseContext) -> PhaseReport {
        let settings = &ctx.config.phases.parent;
        let mut report = PhaseReport::new(self.name());

        let discovered = ctx.discovered_urls().await;
        let candidates =
            parent_candidates(&discovered, settings.max_levels, settings.max_candidates);
        info!(
            "Derived {} parent directories from {} URLs",
            candidates.len(),
            discovered.len()
        );

        let probe = ctx.probe_candidates(&candidates, self.source()).await;
        report.absorb(&probe);
        info!(
            "Parents: {}/{} exist, {} new URLs",
            probe.found, probe.tested, probe.new_urls
        );
        report.with_note(format!(
            "{} parent directories from {} URLs",
            candidates.len(),
            discovered.len()
        ))
    }
}
