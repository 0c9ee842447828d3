//! url-harvest main entry point
//!
//! This is the command-line interface for the url-harvest site mapper.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use url_harvest::config::{load_config_with_hash, Config};
use url_harvest::crawler::{harvest, ordered_strategies};
use url_harvest::output::{load_report, print_statistics};

/// url-harvest: exhaustive URL discovery for a single website
///
/// url-harvest combines sitemaps, robots.txt, recursive crawling, directory
/// and pattern guessing, form probing and LLM suggestions to list every URL
/// of one site, escalating fetch strategies when the site resists.
#[derive(Parser, Debug)]
#[command(name = "url-harvest")]
#[command(version = "1.0.0")]
#[command(about = "Exhaustive URL discovery for a single website", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the harvest plan without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the last run report and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_harvest(config, config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("url_harvest=info,warn"),
            1 => EnvFilter::new("url_harvest=debug,info"),
            2 => EnvFilter::new("url_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows what a harvest would do
fn handle_dry_run(config: &Config) {
    println!("=== url-harvest Dry Run ===\n");

    println!("Target:");
    println!("  Base URL: {}", config.target.base_url);
    println!(
        "  Domain: {}",
        config.target.domain().unwrap_or_else(|| "-".to_string())
    );
    println!("  Subdomains: {}", config.filter.allow_subdomains);

    println!("\nFetch Ladder:");
    let strategies: Vec<&str> = ordered_strategies(&config.ladder.strategies)
        .iter()
        .map(|s| s.as_str())
        .collect();
    println!("  Stages: {}", strategies.join(" -> "));
    println!("  Escalation: {:?}", config.ladder.escalation_mode);
    println!("  Max concurrent: {}", config.ladder.max_concurrent);
    println!(
        "  Proxy: {}",
        if config.ladder.proxy_url.is_some() { "configured" } else { "none" }
    );

    println!("\nScheduler:");
    println!(
        "  Batch size: {} (min {}, max {})",
        config.scheduler.initial_batch_size,
        config.scheduler.min_batch_size,
        config.scheduler.max_batch_size
    );
    println!("  Max pages: {}", config.scheduler.max_pages);
    println!("  Max depth: {}", config.scheduler.max_depth);

    let phases = &config.phases;
    println!("\nPhases:");
    for (name, enabled) in [
        ("robots", phases.robots.enabled),
        ("sitemap", phases.sitemap.enabled),
        ("crawl", phases.crawl.enabled),
        ("directory", phases.directory.enabled),
        ("parent", phases.parent.enabled),
        ("pattern", phases.pattern.enabled),
        ("form-search", phases.form_search.enabled),
        ("llm", phases.llm.enabled),
    ] {
        println!("  {:<12} {}", name, if enabled { "on" } else { "off" });
    }
    if let Some(secs) = phases.phase_timeout_secs {
        println!("  Timeout per phase: {}s", secs);
    }

    println!("\nRetry:");
    if config.retry.enabled {
        println!("  Up to {} attempts over 3 stages", config.retry.total_cap());
    } else {
        println!("  Disabled");
    }

    println!("\nLLM:");
    let key_present = std::env::var(&config.llm.api_key_env).is_ok();
    println!("  Provider: {:?} ({})", config.llm.provider, config.llm.model);
    println!(
        "  API key ({}): {}",
        config.llm.api_key_env,
        if key_present { "set" } else { "missing, heuristic fallback" }
    );

    println!("\nOutput:");
    println!("  Report: {}", config.output.report_path);
    println!("  URL list: {}", config.output.urls_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the last run report
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let path = Path::new(&config.output.report_path);
    println!("Report: {}\n", path.display());

    let report = load_report(path)
        .with_context(|| format!("failed to load report {}", path.display()))?;
    print_statistics(&report);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, config_hash: String) -> anyhow::Result<()> {
    tracing::info!("Harvesting {}", config.target.base_url);
    tracing::info!(
        "Report: {}, URL list: {}",
        config.output.report_path,
        config.output.urls_path
    );

    match harvest(config, Some(config_hash)).await {
        Ok(report) => {
            tracing::info!(
                "Harvest completed successfully: {} URLs",
                report.totals.discovered
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
