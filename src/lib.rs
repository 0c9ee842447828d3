//! url-harvest: exhaustive URL discovery for a single website
//!
//! This crate runs several discovery phases (sitemaps, robots.txt, recursive link
//! following, directory and parent-directory guessing, pattern generation, form probing and LLM-assisted
//! path generation) against one shared frontier. Every fetch goes through an
//! escalation ladder of strategies, and recursive crawling is driven by an adaptive
//! batch scheduler that reacts to the observed health of the target site.

pub mod config;
pub mod crawler;
pub mod frontier;
pub mod llm;
pub mod output;
pub mod phases;
pub mod robots;
pub mod url;

use thiserror::Error;

/// Main error type for url-harvest operations
///
/// Fetch failures never show up here: they are recorded as
/// [`crawler::FetchOutcome`] values. Only configuration problems and
/// output I/O can abort a run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Fetch engine error: {0}")]
    Engine(#[from] crawler::EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for url-harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use frontier::{FrontierStore, SharedFrontier, UrlState};
pub use url::{extract_domain, normalize_url, should_include, UrlFilter};
