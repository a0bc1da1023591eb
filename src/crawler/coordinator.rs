//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Dequeuing from the frontier and pacing fetches
//! - Coordinating fetching, processing, classification and recording
//! - Enqueuing same-host links and downloading images
//! - Periodic and final flushes of the persisted output
//! - Cooperative cancellation

use crate::classify::{PageClassification, PageClassifier};
use crate::config::Config;
use crate::crawler::fetcher::{FetchedPage, Fetcher};
use crate::crawler::parser::{ImageRef, PageProcessor, ParsedPage, RawLink};
use crate::crawler::scheduler::{FrontierEntry, RateLimiter};
use crate::output::{
    image_file_name, page_dir_key, text_ref, unique_file_name, CrawlStats, ImageDescriptor,
    OutboundLink, OutputError, OutputResult, PageRecord, PersistenceSink, RESERVED_NAMES,
};
use crate::state::{
    CrawlSession, CrawlState, HierarchyError, PageListings, PageNode, TerminationReason,
};
use crate::url::{in_scope, normalize_with, NormalizeOptions, NormalizedUrl};
use crate::HarvestError;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation request
///
/// Cloned handles observe the same flag. The crawl loop checks it once per
/// iteration, so the page being processed when it is set is finished first.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a finished crawl
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// Terminal state of the crawl loop
    pub state: CrawlState,

    pub reason: TerminationReason,

    pub stats: CrawlStats,

    /// Recorded pages grouped by classification
    pub listings: PageListings,
}

/// Main crawler coordinator structure
///
/// Generic over its collaborators so tests can substitute in-memory fetchers
/// and sinks.
pub struct Coordinator<F, P, S> {
    config: Config,
    fetcher: F,
    processor: P,
    sink: S,
    classifier: PageClassifier,
    limiter: RateLimiter,
    session: CrawlSession,
    cancel: CancelFlag,
    options: NormalizeOptions,
    pages_since_flush: u64,
}

impl<F, P, S> Coordinator<F, P, S>
where
    F: Fetcher,
    P: PageProcessor,
    S: PersistenceSink,
{
    /// Creates a coordinator with a fresh session for `seed`
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(HarvestError::InvalidSeed)` - The seed is not an absolute http(s) URL
    pub fn new(
        config: Config,
        seed: &str,
        fetcher: F,
        processor: P,
        sink: S,
        cancel: CancelFlag,
    ) -> Result<Self, HarvestError> {
        let options = NormalizeOptions {
            keep_query: config.crawler.keep_query,
        };
        let seed_url = normalize_with(seed, None, options).map_err(|source| {
            HarvestError::InvalidSeed {
                url: seed.to_string(),
                source,
            }
        })?;

        let session = CrawlSession::new(seed_url, None);
        Ok(Self::with_session(config, session, fetcher, processor, sink, cancel))
    }

    /// Creates a coordinator that continues an existing session
    pub fn with_session(
        config: Config,
        session: CrawlSession,
        fetcher: F,
        processor: P,
        sink: S,
        cancel: CancelFlag,
    ) -> Self {
        let classifier = PageClassifier::new(&config.classifier);
        let limiter = RateLimiter::new(Duration::from_millis(config.crawler.delay_ms));
        let options = NormalizeOptions {
            keep_query: config.crawler.keep_query,
        };

        Self {
            config,
            fetcher,
            processor,
            sink,
            classifier,
            limiter,
            session,
            cancel,
            options,
            pages_since_flush: 0,
        }
    }

    pub fn session(&self) -> &CrawlSession {
        &self.session
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Runs the main crawl loop
    ///
    /// Each iteration:
    /// 1. Checks for cancellation and the page limit
    /// 2. Dequeues the oldest frontier entry
    /// 3. Waits for the rate limiter, then fetches
    /// 4. Processes, classifies and records the page
    /// 5. Enqueues new same-host links and saves the page
    ///
    /// Per-page failures are logged and counted; only persistence failures
    /// end the crawl early with an error.
    pub async fn run(&mut self) -> Result<CrawlOutcome, HarvestError> {
        self.session.transition(CrawlState::Running)?;
        tracing::info!(
            "Starting crawl of {} ({} pages recorded, {} in frontier)",
            self.session.seed,
            self.session.hierarchy.len(),
            self.session.frontier.len()
        );

        let start_time = Instant::now();
        let mut pages_this_run: u64 = 0;
        let mut failure: Option<OutputError> = None;

        let reason = loop {
            if self.cancel.is_cancelled() {
                tracing::warn!("Cancellation requested, stopping crawl");
                break TerminationReason::Cancelled;
            }

            if self.page_limit_reached() {
                tracing::info!("Page limit reached");
                break TerminationReason::PageLimitReached;
            }

            let Some(entry) = self.session.frontier.dequeue() else {
                tracing::info!("Frontier is empty, crawl complete");
                break TerminationReason::FrontierExhausted;
            };

            // Links are filtered on enqueue; this guards checkpoints edited on disk
            if !in_scope(&entry.url, &self.session.root_host) {
                tracing::warn!("Skipping out-of-domain URL {}", entry.url);
                self.session.skip_out_of_domain(&entry.url);
                continue;
            }

            let recorded = match self.process_entry(entry).await {
                Ok(recorded) => recorded,
                Err(e) => {
                    tracing::error!("Failed to save crawl output: {}", e);
                    failure = Some(e);
                    break TerminationReason::PersistenceFailure;
                }
            };
            if !recorded {
                continue;
            }

            pages_this_run += 1;
            self.pages_since_flush += 1;

            if self.pages_since_flush >= self.config.crawler.checkpoint_interval {
                if let Err(e) = self.flush() {
                    tracing::error!("Failed to write checkpoint: {}", e);
                    failure = Some(e);
                    break TerminationReason::PersistenceFailure;
                }
            }

            // Progress reporting every 10 pages
            if pages_this_run % 10 == 0 {
                let rate = pages_this_run as f64 / start_time.elapsed().as_secs_f64();
                tracing::info!(
                    "Progress: {} pages recorded, {} in frontier, {:.2} pages/sec",
                    self.session.hierarchy.len(),
                    self.session.frontier.len(),
                    rate
                );
            }
        };

        self.session.transition(reason.final_state())?;

        match failure {
            Some(e) => {
                if let Err(flush_err) = self.flush() {
                    tracing::error!("Final flush after persistence failure also failed: {}", flush_err);
                }
                Err(e.into())
            }
            None => {
                self.flush()?;
                tracing::info!(
                    "Crawl {} ({}): {} pages recorded in {:?}",
                    self.session.state,
                    reason,
                    self.session.hierarchy.len(),
                    start_time.elapsed()
                );
                Ok(CrawlOutcome {
                    state: self.session.state,
                    reason,
                    stats: self.session.stats.clone(),
                    listings: self.session.hierarchy.listings(),
                })
            }
        }
    }

    fn page_limit_reached(&self) -> bool {
        self.config
            .crawler
            .max_pages
            .is_some_and(|max| self.session.hierarchy.len() as u64 >= max)
    }

    /// Fetches, processes and records one frontier entry
    ///
    /// Returns `Ok(true)` if the page was recorded. Fetch and processing
    /// failures are handled here; only sink errors propagate.
    async fn process_entry(&mut self, entry: FrontierEntry) -> OutputResult<bool> {
        self.limiter.wait_turn().await;
        self.session.stats.fetch_attempts += 1;
        tracing::debug!("Fetching {} (depth {})", entry.url, entry.depth);

        let page = match self.fetcher.fetch(&entry.url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::error!("Fetch failed for {} [{}]: {}", entry.url, e.kind, e.message);
                self.session.stats.pages_failed += 1;
                return Ok(false);
            }
        };

        let parsed = match self
            .processor
            .process(&entry.url, &page.body, &page.content_type)
        {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::error!("Processing failed for {}: {}", entry.url, e);
                self.session.stats.process_errors += 1;
                ParsedPage::default()
            }
        };

        let classification =
            self.classifier
                .classify_url(&entry.url, &parsed.text, &parsed.matched_selectors);

        let node = match self.session.hierarchy.record(
            entry.url.clone(),
            entry.parent.clone(),
            entry.depth,
            classification,
        ) {
            Ok(node) => node.clone(),
            Err(HierarchyError::Duplicate { .. }) => return Ok(false),
            Err(e) => {
                tracing::error!("Could not record {}: {}", entry.url, e);
                self.session.stats.pages_failed += 1;
                return Ok(false);
            }
        };
        self.session.stats.pages_visited += 1;
        tracing::info!(
            "Visited {} (depth {}, {})",
            node.url,
            node.depth,
            node.classification
        );

        // Relative links resolve against where redirects ended up
        let base = normalize_with(&page.final_url, None, self.options)
            .unwrap_or_else(|_| entry.url.clone());

        let outbound_links = self.handle_discovered_links(&node, &base, &parsed.links);

        let page_dir = self
            .session
            .claim_page_dir(&page_dir_key(&node.url, self.options.keep_query), RESERVED_NAMES);
        let images = self.collect_images(&page_dir, &base, &parsed.images).await?;

        let mut metadata = parsed.metadata;
        if classification == PageClassification::Product {
            metadata.product_info = Some(parsed.product_info);
        }

        let FetchedPage {
            final_url,
            status,
            content_type,
            ..
        } = page;

        let record = PageRecord {
            node,
            text_ref: text_ref(&page_dir),
            page_dir,
            fetched_url: final_url,
            status,
            content_type,
            fetched_at: Utc::now(),
            metadata,
            structured_data: parsed.structured_data,
            images,
            outbound_links,
        };
        self.sink.write_page(&record, &parsed.text)?;

        Ok(true)
    }

    /// Normalizes discovered links and enqueues the new same-host ones
    ///
    /// Returns every valid link, in-scope or not, for the page record.
    fn handle_discovered_links(
        &mut self,
        from: &PageNode,
        base: &NormalizedUrl,
        links: &[RawLink],
    ) -> Vec<OutboundLink> {
        let mut seen = HashSet::new();
        let mut outbound = Vec::new();
        let depth_exhausted = self
            .config
            .crawler
            .max_depth
            .is_some_and(|max| from.depth >= max);

        for link in links {
            let url = match normalize_with(&link.href, Some(base), self.options) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!("Skipping invalid link '{}' on {}: {}", link.href, from.url, e);
                    self.session.stats.invalid_links += 1;
                    continue;
                }
            };

            // Several hrefs can normalize to the same URL
            if !seen.insert(url.clone()) {
                continue;
            }

            let scoped = in_scope(&url, &self.session.root_host);
            outbound.push(OutboundLink {
                url: url.clone(),
                text: link.text.clone(),
                title: link.title.clone(),
                in_scope: scoped,
            });

            if !scoped {
                if self.session.skip_out_of_domain(&url) {
                    tracing::warn!("Skipping out-of-domain link {} on {}", url, from.url);
                } else {
                    tracing::debug!("Out-of-domain link {} on {} already skipped", url, from.url);
                }
                continue;
            }

            if depth_exhausted {
                tracing::debug!("Not following {}: depth limit reached", url);
                continue;
            }

            self.session
                .frontier
                .enqueue_if_new(url, Some(from.url.clone()), from.depth + 1);
        }

        outbound
    }

    /// Resolves image references and downloads them when enabled
    ///
    /// Download failures are logged; the image is still listed.
    async fn collect_images(
        &mut self,
        page_dir: &str,
        base: &NormalizedUrl,
        refs: &[ImageRef],
    ) -> OutputResult<Vec<ImageDescriptor>> {
        let mut used_names = HashSet::new();
        let mut images = Vec::with_capacity(refs.len());

        for image in refs {
            self.session.stats.images_found += 1;

            let url = match normalize_with(&image.src, Some(base), NormalizeOptions::keeping_query())
            {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!("Skipping invalid image '{}': {}", image.src, e);
                    continue;
                }
            };

            let mut descriptor = ImageDescriptor {
                original_url: url.to_string(),
                alt_text: image.alt.clone(),
                local_path: None,
                filename: None,
                content_type: None,
            };

            if self.config.crawler.download_images {
                match self.fetcher.fetch(&url).await {
                    Ok(response) => {
                        let name = unique_file_name(
                            image_file_name(&url, &response.content_type),
                            &mut used_names,
                        );
                        let local_path = self.sink.write_image(page_dir, &name, &response.body)?;
                        self.session.stats.images_downloaded += 1;
                        tracing::debug!("Downloaded image {} to {}", url, local_path);

                        descriptor.local_path = Some(local_path);
                        descriptor.filename = Some(name);
                        descriptor.content_type =
                            Some(response.content_type).filter(|ct| !ct.is_empty());
                    }
                    Err(e) => {
                        tracing::warn!("Failed to download image {} [{}]: {}", url, e.kind, e.message);
                    }
                }
            }

            images.push(descriptor);
        }

        Ok(images)
    }

    /// Writes hierarchy, listings and checkpoint
    fn flush(&mut self) -> OutputResult<()> {
        self.session.updated_at = Utc::now();
        let tree = self.session.hierarchy.tree();
        self.sink.write_hierarchy(tree.as_ref())?;
        self.sink.write_listings(&self.session.hierarchy.listings())?;
        self.sink.write_checkpoint(&self.session)?;
        self.pages_since_flush = 0;
        tracing::debug!(
            "Saved checkpoint with {} pages",
            self.session.hierarchy.len()
        );
        Ok(())
    }
}
