//! URL state and provenance definitions
//!
//! A URL's state is never stored; it is derived from the frontier's sets so
//! the two can never disagree.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a URL currently stands in the harvest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlState {
    /// Never seen by the frontier
    Unknown,

    // ===== Active States =====
    /// Discovered and waiting to be fetched
    Queued,

    /// Claimed by a fetch that has not completed yet
    InFlight,

    // ===== Terminal States =====
    /// Fetched successfully (possibly after a retry)
    Crawled,

    /// Fetch attempted and failed on every strategy
    Failed,
}

impl UrlState {
    /// Returns true if the URL still needs work
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::InFlight)
    }

    /// Returns true if a fetch attempt has completed for the URL
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Crawled | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Queued => "queued",
            Self::InFlight => "in_flight",
            Self::Crawled => "crawled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for UrlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The discovery technique that first reported a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoverySource {
    Seed,
    Robots,
    Sitemap,
    Crawl,
    Directory,
    Parent,
    Pattern,
    FormSearch,
    Llm,
    Retry,
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Robots => "robots",
            Self::Sitemap => "sitemap",
            Self::Crawl => "crawl",
            Self::Directory => "directory",
            Self::Parent => "parent",
            Self::Pattern => "pattern",
            Self::FormSearch => "form-search",
            Self::Llm => "llm",
            Self::Retry => "retry",
        }
    }
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
