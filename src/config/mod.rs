//! Configuration module for url-harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Only the `[target]` section is required; every other section has defaults
//! tuned for large municipal and corporate sites.
//!
//! # Example
//!
//! ```no_run
//! use url_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvesting {}", config.target.base_url);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, DirectoryPhaseConfig, FilterConfig, FormSearchPhaseConfig, LadderConfig, LlmConfig,
    LlmProviderKind, OutputConfig, PatternPhaseConfig, PhasesConfig, RetryConfig,
    RetryStageConfig, SchedulerConfig, SitemapPhaseConfig, StageTimeouts, TargetConfig,
    ToggleConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
