//! Crawl statistics
//!
//! Counters are updated by the crawl loop as it goes and saved with the
//! checkpoint, so a resumed crawl keeps counting where it left off.

use crate::classify::PageClassification;
use crate::state::{CrawlState, PageListings, TerminationReason};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    /// Pages fetched and recorded in the hierarchy
    pub pages_visited: u64,

    /// Page fetches that failed (network or HTTP error)
    pub pages_failed: u64,

    /// Pages whose content could not be processed (recorded with empty content)
    pub process_errors: u64,

    /// Distinct URLs on another host that were linked to but not followed
    pub pages_skipped_out_of_domain: u64,

    /// Links dropped because they could not be normalized
    pub invalid_links: u64,

    /// Image references found on recorded pages
    pub images_found: u64,

    /// Images written to disk
    pub images_downloaded: u64,

    /// Page fetches attempted (images excluded)
    pub fetch_attempts: u64,
}

/// Prints the end-of-crawl summary to stdout
///
/// # Arguments
///
/// * `stats` - Counters collected during the crawl
/// * `listings` - Recorded pages grouped by classification
/// * `state` - Final state of the crawl loop
/// * `reason` - Why the loop stopped
/// * `output_dir` - Where the artifacts were written
pub fn print_statistics(
    stats: &CrawlStats,
    listings: &PageListings,
    state: CrawlState,
    reason: TerminationReason,
    output_dir: &Path,
) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Final state: {} ({})", state, reason);
    println!("  Fetch attempts: {}", stats.fetch_attempts);
    println!("  Pages visited: {}", stats.pages_visited);
    println!("  Pages failed: {}", stats.pages_failed);
    println!("  Processing errors: {}", stats.process_errors);
    println!(
        "  Pages skipped (out of domain): {}",
        stats.pages_skipped_out_of_domain
    );
    println!("  Invalid links: {}", stats.invalid_links);
    println!();

    println!("Pages by Classification:");
    let total = listings.total();
    for classification in PageClassification::ALL {
        let count = listings.count(classification);
        let percentage = if total > 0 {
            (count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", classification, count, percentage);
    }
    println!();

    println!("Images:");
    println!("  Found: {}", stats.images_found);
    println!("  Downloaded: {}", stats.images_downloaded);
    println!();

    let success_rate = if stats.fetch_attempts > 0 {
        (stats.pages_visited as f64 / stats.fetch_attempts as f64) * 100.0
    } else {
        0.0
    };
    println!("Success Rate: {:.1}%", success_rate);
    println!("Output directory: {}", output_dir.display());
}
