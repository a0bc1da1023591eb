//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with failure classification
//! - HTML processing: text, metadata, images and links
//! - The FIFO frontier and fetch rate limiting
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod parser;
mod scheduler;

pub use coordinator::{CancelFlag, Coordinator, CrawlOutcome};
pub use fetcher::{
    build_http_client, fetch_url, FetchError, FetchErrorKind, FetchedPage, Fetcher, HttpFetcher,
};
pub use parser::{
    is_html, HtmlProcessor, ImageRef, PageMetadata, PageProcessor, ParsedPage, ProcessError,
    ProductInfo, RawLink,
};
pub use scheduler::{Frontier, FrontierEntry, RateLimiter};

use crate::classify::PageClassifier;
use crate::config::Config;
use crate::output::FsSink;
use crate::state::CrawlSession;
use crate::url::{normalize_with, NormalizeOptions, NormalizedUrl};
use crate::HarvestError;

/// Runs a complete crawl against the live web
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Prepare the output directory
/// 2. Build the HTTP client and HTML processor
/// 3. Load the previous checkpoint when resuming, or start a fresh session
/// 4. Run the crawl loop until the frontier is empty, the page limit is
///    reached, or `cancel` is set
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `seed` - The URL to start from; its host bounds the crawl
/// * `config_hash` - Hash of the configuration file, stored in the checkpoint
/// * `resume` - Continue from `crawl_checkpoint.json` when it matches `seed`
/// * `cancel` - Cooperative cancellation flag
///
/// # Returns
///
/// * `Ok(CrawlOutcome)` - Crawl completed or was cancelled
/// * `Err(HarvestError)` - Setup failed or output could not be written
pub async fn run_crawl(
    config: Config,
    seed: &str,
    config_hash: Option<String>,
    resume: bool,
    cancel: CancelFlag,
) -> Result<CrawlOutcome, HarvestError> {
    let output_dir = config.output.output_dir.clone();
    let sink = FsSink::new(&output_dir).map_err(|source| HarvestError::OutputDir {
        path: output_dir.display().to_string(),
        source,
    })?;

    let fetcher = HttpFetcher::new(&config.crawler, &config.user_agent)?;
    let processor = HtmlProcessor::new(&PageClassifier::new(&config.classifier).marker_selectors());

    let options = NormalizeOptions {
        keep_query: config.crawler.keep_query,
    };
    let seed_url =
        normalize_with(seed, None, options).map_err(|source| HarvestError::InvalidSeed {
            url: seed.to_string(),
            source,
        })?;

    let resumed = if resume {
        resume_session(&sink, &seed_url, config_hash.clone())?
    } else {
        None
    };
    let session = resumed.unwrap_or_else(|| {
        tracing::info!("Starting fresh crawl of {}", seed_url);
        CrawlSession::new(seed_url, config_hash)
    });

    let mut coordinator =
        Coordinator::with_session(config, session, fetcher, processor, sink, cancel);
    coordinator.run().await
}

/// Loads the saved session if it belongs to `seed`
fn resume_session(
    sink: &FsSink,
    seed: &NormalizedUrl,
    config_hash: Option<String>,
) -> Result<Option<CrawlSession>, HarvestError> {
    match sink.load_checkpoint()? {
        Some(mut session) if session.seed == *seed => {
            session.reopen(config_hash);
            tracing::info!(
                "Resuming crawl of {}: {} pages recorded, {} in frontier",
                seed,
                session.hierarchy.len(),
                session.frontier.len()
            );
            Ok(Some(session))
        }
        Some(session) => {
            tracing::warn!(
                "Checkpoint belongs to {}, not {}; starting fresh",
                session.seed,
                seed
            );
            Ok(None)
        }
        None => {
            tracing::info!("No checkpoint found in {}", sink.root().display());
            Ok(None)
        }
    }
}
