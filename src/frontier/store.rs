use crate::frontier::state::{DiscoverySource, UrlState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The shared URL bookkeeping for one harvest run
///
/// Invariants maintained by every method:
/// - `crawled ⊆ discovered`
/// - `failed ⊆ crawled`
/// - `in_flight ⊆ discovered − crawled`
/// - `retry_queue` keys ⊆ `failed`
#[derive(Debug, Default, Clone)]
pub struct FrontierStore {
    discovered: BTreeSet<String>,
    crawled: BTreeSet<String>,
    failed: BTreeSet<String>,
    retry_queue: BTreeMap<String, u32>,
    in_flight: BTreeSet<String>,
    sources: BTreeMap<String, DiscoverySource>,
    /// Link distance from the nearest root; absent means a root (depth 0)
    depths: BTreeMap<String, u32>,
}

/// Point-in-time copy of the frontier, used for persistence and reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrontierSnapshot {
    pub discovered: BTreeSet<String>,
    pub crawled: BTreeSet<String>,
    pub failed: BTreeSet<String>,
    pub retry_queue: BTreeMap<String, u32>,
    pub sources: BTreeMap<String, DiscoverySource>,
}

impl FrontierSnapshot {
    /// Number of discovered URLs first reported by each source
    pub fn counts_by_source(&self) -> BTreeMap<DiscoverySource, usize> {
        let mut counts = BTreeMap::new();
        for source in self.sources.values() {
            *counts.entry(*source).or_insert(0) += 1;
        }
        counts
    }
}

impl FrontierStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `urls` to the discovered set and returns the ones that were new
    ///
    /// Already known URLs are ignored, so calling this twice with the same set
    /// yields an empty delta the second time.
    pub fn add_discovered<I, S>(&mut self, urls: I, source: DiscoverySource) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_discovered_at(urls, source, 0)
    }

    /// Like [`add_discovered`](Self::add_discovered), recording the new URLs
    /// at link `depth` from the root they were found under
    pub fn add_discovered_at<I, S>(
        &mut self,
        urls: I,
        source: DiscoverySource,
        depth: u32,
    ) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut delta = BTreeSet::new();
        for url in urls {
            let url = url.into();
            if url.is_empty() || self.discovered.contains(&url) {
                continue;
            }
            self.discovered.insert(url.clone());
            self.sources.insert(url.clone(), source);
            if depth > 0 {
                self.depths.insert(url.clone(), depth);
            }
            delta.insert(url);
        }
        delta
    }

    /// Link depth recorded for `url`; roots and unknown URLs are 0
    pub fn depth(&self, url: &str) -> u32 {
        self.depths.get(url).copied().unwrap_or(0)
    }

    /// Records a completed fetch attempt for `url`
    ///
    /// URLs that were never discovered are added to `discovered` as well. A
    /// success clears any earlier failure record.
    pub fn mark_crawled(&mut self, url: &str, success: bool) {
        if !self.discovered.contains(url) {
            self.discovered.insert(url.to_string());
            self.sources
                .entry(url.to_string())
                .or_insert(DiscoverySource::Crawl);
        }
        self.in_flight.remove(url);
        self.crawled.insert(url.to_string());

        if success {
            self.failed.remove(url);
            self.retry_queue.remove(url);
        } else {
            self.failed.insert(url.to_string());
            self.retry_queue.entry(url.to_string()).or_insert(0);
        }
    }

    /// A failed URL was fetched by the retry pass
    pub fn mark_recovered(&mut self, url: &str) {
        self.mark_crawled(url, true);
    }

    /// Counts one more retry attempt against a failed URL
    ///
    /// Returns the new attempt count, or `None` if the URL is not failed.
    pub fn record_retry(&mut self, url: &str) -> Option<u32> {
        if !self.failed.contains(url) {
            return None;
        }
        let attempts = self.retry_queue.entry(url.to_string()).or_insert(0);
        *attempts += 1;
        Some(*attempts)
    }

    /// Claims URLs for fetching
    ///
    /// Returns, in input order and without duplicates, the URLs that are
    /// neither crawled nor already in flight. Claimed URLs are discovered if
    /// they were not yet, so the partition invariant keeps holding.
    pub fn claim<I, S>(&mut self, urls: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.claim_as(urls, DiscoverySource::Crawl)
    }

    /// Like [`claim`](Self::claim), crediting newly seen URLs to `source`
    ///
    /// Used when probing guessed candidates: a failed guess is then removed
    /// again with [`release`](Self::release) and
    /// [`forget_unconfirmed`](Self::forget_unconfirmed).
    pub fn claim_as<I, S>(&mut self, urls: I, source: DiscoverySource) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut claimed = Vec::new();
        for url in urls {
            let url = url.as_ref();
            if self.crawled.contains(url) || self.in_flight.contains(url) {
                continue;
            }
            if !self.discovered.contains(url) {
                self.discovered.insert(url.to_string());
                self.sources.entry(url.to_string()).or_insert(source);
            }
            self.in_flight.insert(url.to_string());
            claimed.push(url.to_string());
        }
        claimed
    }

    /// Claims failed URLs for a retry attempt
    ///
    /// Failed URLs are already crawled, so [`claim`](Self::claim) would refuse
    /// them; this only checks the in-flight set.
    pub fn claim_retry(&mut self, urls: &[String]) -> Vec<String> {
        let mut claimed = Vec::new();
        for url in urls {
            if self.failed.contains(url) && self.in_flight.insert(url.clone()) {
                claimed.push(url.clone());
            }
        }
        claimed
    }

    /// Drops an in-flight claim without recording an outcome
    pub fn release(&mut self, url: &str) {
        self.in_flight.remove(url);
    }

    /// Drops every in-flight claim, returning the released URLs
    ///
    /// Used after an operation was cancelled mid-fetch.
    pub fn release_all(&mut self) -> Vec<String> {
        std::mem::take(&mut self.in_flight).into_iter().collect()
    }

    /// Removes a guessed URL that turned out not to exist
    ///
    /// Only queued, unclaimed URLs first reported by `source` are forgotten;
    /// anything another phase also found stays.
    pub fn forget_unconfirmed(&mut self, url: &str, source: DiscoverySource) -> bool {
        let queued = self.discovered.contains(url)
            && !self.crawled.contains(url)
            && !self.in_flight.contains(url);
        if queued && self.sources.get(url) == Some(&source) {
            self.discovered.remove(url);
            self.sources.remove(url);
            self.depths.remove(url);
            return true;
        }
        false
    }

    /// `discovered − crawled`: the URLs still waiting for a fetch
    pub fn pending(&self) -> BTreeSet<String> {
        self.discovered.difference(&self.crawled).cloned().collect()
    }

    /// Pending URLs paired with their recorded depth
    pub fn pending_with_depth(&self) -> Vec<(String, u32)> {
        self.discovered
            .difference(&self.crawled)
            .map(|url| (url.clone(), self.depth(url)))
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.discovered.len() - self.crawled.len()
    }

    pub fn snapshot(&self) -> FrontierSnapshot {
        FrontierSnapshot {
            discovered: self.discovered.clone(),
            crawled: self.crawled.clone(),
            failed: self.failed.clone(),
            retry_queue: self.retry_queue.clone(),
            sources: self.sources.clone(),
        }
    }

    pub fn state(&self, url: &str) -> UrlState {
        if self.failed.contains(url) {
            UrlState::Failed
        } else if self.crawled.contains(url) {
            UrlState::Crawled
        } else if self.in_flight.contains(url) {
            UrlState::InFlight
        } else if self.discovered.contains(url) {
            UrlState::Queued
        } else {
            UrlState::Unknown
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.discovered.contains(url)
    }

    pub fn len(&self) -> usize {
        self.discovered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discovered.is_empty()
    }

    pub fn crawled_count(&self) -> usize {
        self.crawled.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Failed URLs ordered by fewest retry attempts first, then by URL
    pub fn failed_urls(&self) -> Vec<String> {
        let mut failed: Vec<(u32, &String)> = self
            .failed
            .iter()
            .map(|u| (self.retry_queue.get(u).copied().unwrap_or(0), u))
            .collect();
        failed.sort();
        failed.into_iter().map(|(_, u)| u.clone()).collect()
    }

    pub fn retry_attempts(&self, url: &str) -> u32 {
        self.retry_queue.get(url).copied().unwrap_or(0)
    }

    /// Crawled URLs that were fetched successfully
    pub fn successful_urls(&self) -> Vec<String> {
        self.crawled.difference(&self.failed).cloned().collect()
    }

    /// All discovered URLs, sorted
    pub fn sorted_urls(&self) -> Vec<String> {
        self.discovered.iter().cloned().collect()
    }

    pub fn discovered(&self) -> &BTreeSet<String> {
        &self.discovered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn assert_partition(store: &FrontierStore) {
        let snap = store.snapshot();
        assert!(snap.crawled.is_subset(&snap.discovered));
        assert!(snap.failed.is_subset(&snap.crawled));
        let expected: BTreeSet<String> =
            snap.discovered.difference(&snap.crawled).cloned().collect();
        assert_eq!(store.pending(), expected);
        assert_eq!(store.pending_count(), expected.len());
        for key in snap.retry_queue.keys() {
            assert!(snap.failed.contains(key));
        }
    }

    #[test]
    fn test_add_returns_delta() {
        let mut store = FrontierStore::new();
        let delta = store.add_discovered(urls(&["a", "b"]), DiscoverySource::Seed);
        assert_eq!(delta.len(), 2);

        let delta = store.add_discovered(urls(&["b", "c"]), DiscoverySource::Crawl);
        assert_eq!(delta, BTreeSet::from(["c".to_string()]));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut store = FrontierStore::new();
        let set = urls(&["https://x.test/1", "https://x.test/2"]);
        store.add_discovered(set.clone(), DiscoverySource::Sitemap);
        let before = store.snapshot();

        let delta = store.add_discovered(set, DiscoverySource::Sitemap);
        assert!(delta.is_empty());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_first_source_wins() {
        let mut store = FrontierStore::new();
        store.add_discovered(urls(&["a"]), DiscoverySource::Sitemap);
        store.add_discovered(urls(&["a"]), DiscoverySource::Crawl);
        assert_eq!(
            store.snapshot().sources.get("a"),
            Some(&DiscoverySource::Sitemap)
        );
    }

    #[test]
    fn test_mark_crawled_moves_out_of_pending() {
        let mut store = FrontierStore::new();
        store.add_discovered(urls(&["a", "b"]), DiscoverySource::Seed);
        store.mark_crawled("a", true);
        store.mark_crawled("b", false);

        assert_eq!(store.state("a"), UrlState::Crawled);
        assert_eq!(store.state("b"), UrlState::Failed);
        assert!(store.pending().is_empty());
        assert_eq!(store.failed_count(), 1);
        assert_partition(&store);
    }

    #[test]
    fn test_mark_undiscovered_url_is_allowed() {
        let mut store = FrontierStore::new();
        store.mark_crawled("ghost", false);
        assert!(store.contains("ghost"));
        assert_eq!(store.state("ghost"), UrlState::Failed);
        assert_partition(&store);
    }

    #[test]
    fn test_claim_prevents_double_fetch() {
        let mut store = FrontierStore::new();
        store.add_discovered(urls(&["a", "b"]), DiscoverySource::Seed);

        let first = store.claim(["a", "b", "a"]);
        assert_eq!(first, urls(&["a", "b"]));
        assert_eq!(store.state("a"), UrlState::InFlight);

        let second = store.claim(["a", "b"]);
        assert!(second.is_empty());

        store.mark_crawled("a", true);
        store.release("b");
        assert_eq!(store.claim(["a", "b"]), urls(&["b"]));
        assert_partition(&store);
    }

    #[test]
    fn test_retry_bookkeeping() {
        let mut store = FrontierStore::new();
        store.add_discovered(urls(&["a", "b"]), DiscoverySource::Seed);
        store.mark_crawled("a", false);
        store.mark_crawled("b", false);

        assert_eq!(store.record_retry("a"), Some(1));
        assert_eq!(store.record_retry("a"), Some(2));
        assert_eq!(store.record_retry("unknown"), None);
        assert_eq!(store.failed_urls(), urls(&["b", "a"]));

        let claimed = store.claim_retry(&urls(&["a", "b"]));
        assert_eq!(claimed.len(), 2);
        assert!(store.claim_retry(&urls(&["a"])).is_empty());

        store.mark_recovered("a");
        store.mark_crawled("b", false);
        assert_eq!(store.state("a"), UrlState::Crawled);
        assert_eq!(store.retry_attempts("a"), 0);
        assert_eq!(store.failed_urls(), urls(&["b"]));
        assert_partition(&store);
    }

    #[test]
    fn test_forget_unconfirmed_only_touches_own_guesses() {
        let mut store = FrontierStore::new();
        store.add_discovered(urls(&["guess", "real"]), DiscoverySource::Directory);
        store.add_discovered(urls(&["other"]), DiscoverySource::Crawl);

        assert!(store.forget_unconfirmed("guess", DiscoverySource::Directory));
        assert!(!store.forget_unconfirmed("other", DiscoverySource::Directory));
        store.mark_crawled("real", true);
        assert!(!store.forget_unconfirmed("real", DiscoverySource::Directory));
        assert!(!store.contains("guess"));
        assert_partition(&store);
    }

    #[test]
    fn test_claim_as_credits_guesses() {
        let mut store = FrontierStore::new();
        store.add_discovered(urls(&["known"]), DiscoverySource::Sitemap);

        let claimed = store.claim_as(["known", "guess"], DiscoverySource::Pattern);
        assert_eq!(claimed, urls(&["known", "guess"]));
        assert_eq!(store.snapshot().sources["known"], DiscoverySource::Sitemap);
        assert_eq!(store.snapshot().sources["guess"], DiscoverySource::Pattern);
        assert_partition(&store);

        store.release("guess");
        assert!(store.forget_unconfirmed("guess", DiscoverySource::Pattern));
        assert!(!store.contains("guess"));
        assert_partition(&store);
    }

    #[test]
    fn test_partition_after_mixed_operations() {
        let mut store = FrontierStore::new();
        store.add_discovered(urls(&["1", "2", "3", "4", "5"]), DiscoverySource::Seed);
        store.claim(["1", "2", "3"]);
        store.mark_crawled("1", true);
        store.mark_crawled("2", false);
        store.release("3");
        store.mark_crawled("6", true);
        store.record_retry("2");
        store.add_discovered(urls(&["7"]), DiscoverySource::Crawl);
        assert_partition(&store);
        assert_eq!(store.successful_urls(), urls(&["1", "6"]));
    }

    #[test]
    fn test_counts_by_source() {
        let mut store = FrontierStore::new();
        store.add_discovered(urls(&["a", "b"]), DiscoverySource::Sitemap);
        store.add_discovered(urls(&["c"]), DiscoverySource::Robots);
        let counts = store.snapshot().counts_by_source();
        assert_eq!(counts.get(&DiscoverySource::Sitemap), Some(&2));
        assert_eq!(counts.get(&DiscoverySource::Robots), Some(&1));
    }

    #[test]
    fn test_release_all_after_cancel() {
        let mut store = FrontierStore::new();
        store.add_discovered(urls(&["a", "b"]), DiscoverySource::Seed);
        store.claim(["a", "b"]);
        assert_eq!(store.release_all(), urls(&["a", "b"]));
        assert_eq!(store.state("a"), UrlState::Queued);
        assert!(store.release_all().is_empty());
        assert_eq!(store.claim(["a"]), urls(&["a"]));
    }

    #[test]
    fn test_depth_is_recorded_once() {
        let mut store = FrontierStore::new();
        store.add_discovered(urls(&["root"]), DiscoverySource::Seed);
        store.add_discovered_at(urls(&["child"]), DiscoverySource::Crawl, 1);
        store.add_discovered_at(urls(&["child", "grandchild"]), DiscoverySource::Crawl, 2);

        assert_eq!(store.depth("root"), 0);
        assert_eq!(store.depth("child"), 1);
        assert_eq!(store.depth("grandchild"), 2);
        assert_eq!(store.depth("unknown"), 0);
        assert_eq!(
            store.pending_with_depth(),
            vec![
                ("child".to_string(), 1),
                ("grandchild".to_string(), 2),
                ("root".to_string(), 0),
            ]
        );

        store.claim_as(["grandchild"], DiscoverySource::Crawl);
        store.release("grandchild");
        assert!(store.forget_unconfirmed("grandchild", DiscoverySource::Crawl));
        assert_eq!(store.depth("grandchild"), 0);
    }
}
