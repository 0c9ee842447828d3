//! URL handling module for url-harvest
//!
//! This module provides URL normalization, domain extraction and the scope
//! filter applied to every candidate before it may enter the frontier.

mod domain;
mod filter;
mod normalize;

// Re-export main functions
pub use domain::{extract_domain, host_in_scope};
pub use filter::{should_include, UrlFilter};
pub use normalize::{normalize_str, normalize_url, origin_of};
