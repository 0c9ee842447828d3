//! Statistics from a saved run report
//!
//! Reads the JSON report written by a previous (or still running) harvest
//! and prints a summary of it.

use crate::output::report::RunReport;
use crate::output::traits::OutputResult;
use std::fs;
use std::path::Path;

/// Loads a run report from disk
pub fn load_report(path: &Path) -> OutputResult<RunReport> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Prints report statistics to stdout in a formatted manner
pub fn print_statistics(report: &RunReport) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Target: {}", report.base_url);
    println!("  Status: {}", report.status.as_str());
    println!("  Started: {}", report.started_at.to_rfc3339());
    if let Some(seconds) = report.duration_seconds() {
        println!("  Duration: {}s", seconds);
    }
    println!("  URLs discovered: {}", report.totals.discovered);
    println!("  URLs crawled: {}", report.totals.crawled);
    println!("  Still pending: {}", report.totals.pending);
    println!();

    if !report.urls_by_source.is_empty() {
        println!("URLs by Source:");
        let mut sources: Vec<_> = report.urls_by_source.iter().collect();
        sources.sort_by(|a, b| b.1.cmp(a.1));
        for (source, count) in sources {
            println!(
                "  {}: {} ({:.1}%)",
                source.as_str(),
                count,
                percentage(*count as u64, report.totals.discovered as u64)
            );
        }
        println!();
    }

    if !report.stage_stats.is_empty() {
        println!("Fetch Stages:");
        for (strategy, stats) in &report.stage_stats {
            if stats.attempted == 0 {
                continue;
            }
            println!(
                "  {}: {} / {} succeeded ({:.1}%), {} timeouts",
                strategy,
                stats.successful,
                stats.attempted,
                stats.success_rate() * 100.0,
                stats.timeouts
            );
        }
        println!();
    }

    if !report.phases.is_empty() {
        println!("Phases:");
        for phase in &report.phases {
            print!(
                "  {}: {} new URLs in {:.1}s",
                phase.phase, phase.new_urls, phase.elapsed_secs
            );
            if phase.candidates_tested > 0 {
                print!(
                    " ({} / {} candidates found)",
                    phase.candidates_found, phase.candidates_tested
                );
            }
            if let Some(note) = &phase.note {
                print!(" [{}]", note);
            }
            println!();
        }
        println!();
    }

    if let Some(retry) = &report.retry {
        println!("Retry Pass:");
        println!("  Initially failed: {}", retry.initial_failed);
        println!("  Recovered: {}", retry.recovered);
        println!("  Still failed: {}", retry.still_failed);
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} URLs fetched successfully)",
        percentage(
            report.totals.successful as u64,
            report.totals.crawled as u64
        ),
        report.totals.successful,
        report.totals.crawled
    );
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        (part as f64 / whole as f64) * 100.0
    } else {
        0.0
    }
}
