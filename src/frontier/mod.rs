//! Frontier module: the run-wide record of discovered, crawled and failed URLs
//!
//! One [`FrontierStore`] exists per run. It is wrapped in a [`SharedFrontier`]
//! and handed to every phase driver, so a URL found by one phase is never
//! fetched again by another.

mod state;
mod store;

pub use state::{DiscoverySource, UrlState};
pub use store::{FrontierSnapshot, FrontierStore};

use std::sync::Arc;
use tokio::sync::Mutex;

/// The frontier as shared between the coordinator, scheduler and phase drivers
pub type SharedFrontier = Arc<Mutex<FrontierStore>>;

/// Wraps a store for sharing
pub fn shared(store: FrontierStore) -> SharedFrontier {
    Arc::new(Mutex::new(store))
}
