//! Crawl session
//!
//! All mutable crawl state in one serializable value: the frontier and
//! visited set, the hierarchy, counters, and run metadata. The crawl loop is
//! the only writer; the checkpoint file is a snapshot of this struct.

use crate::crawler::Frontier;
use crate::output::CrawlStats;
use crate::state::{CrawlState, HierarchyBuilder};
use crate::url::NormalizedUrl;
use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Mutable state of one crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSession {
    /// Normalized seed URL
    pub seed: NormalizedUrl,

    /// Host every followed link must match
    pub root_host: String,

    /// SHA-256 of the configuration file, when one was used
    pub config_hash: Option<String>,

    pub state: CrawlState,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub frontier: Frontier,
    pub hierarchy: HierarchyBuilder,
    pub stats: CrawlStats,

    /// Page directory names already handed out
    #[serde(default)]
    page_dirs: HashSet<String>,

    /// Out-of-domain URLs already counted
    #[serde(default)]
    skipped_out_of_domain: HashSet<NormalizedUrl>,
}

impl CrawlSession {
    /// Creates a session with only the seed queued
    pub fn new(seed: NormalizedUrl, config_hash: Option<String>) -> Self {
        let now = Utc::now();
        let root_host = seed.host().to_string();
        let mut frontier = Frontier::new();
        frontier.enqueue_if_new(seed.clone(), None, 0);

        Self {
            seed,
            root_host,
            config_hash,
            state: CrawlState::Idle,
            started_at: now,
            updated_at: now,
            finished_at: None,
            frontier,
            hierarchy: HierarchyBuilder::new(),
            stats: CrawlStats::default(),
            page_dirs: HashSet::new(),
            skipped_out_of_domain: HashSet::new(),
        }
    }

    /// Moves the crawl loop to `next`
    pub fn transition(&mut self, next: CrawlState) -> Result<(), HarvestError> {
        if !self.state.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::debug!("Crawl state {} -> {}", self.state, next);
        self.state = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.finished_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Prepares a session loaded from a checkpoint to run again
    ///
    /// Progress (frontier, visited set, hierarchy, counters) is kept; the run
    /// state goes back to idle.
    pub fn reopen(&mut self, config_hash: Option<String>) {
        if self.config_hash != config_hash {
            tracing::warn!("Configuration changed since the checkpoint was written");
        }
        self.config_hash = config_hash;
        self.state = CrawlState::Idle;
        self.finished_at = None;
        self.updated_at = Utc::now();
    }

    /// Counts `url` as a skipped out-of-domain page
    ///
    /// Returns false if it was already counted; each URL counts once per
    /// crawl, however many pages link to it.
    pub fn skip_out_of_domain(&mut self, url: &NormalizedUrl) -> bool {
        if !self.skipped_out_of_domain.insert(url.clone()) {
            return false;
        }
        self.stats.pages_skipped_out_of_domain += 1;
        true
    }

    /// Claims a unique page directory name derived from `base`
    ///
    /// Names in `reserved` and names already claimed get a numeric suffix
    /// (`name-2`, `name-3`, ...).
    pub fn claim_page_dir(&mut self, base: &str, reserved: &[&str]) -> String {
        let is_free =
            |name: &str, taken: &HashSet<String>| !taken.contains(name) && !reserved.contains(&name);

        let mut name = base.to_string();
        let mut suffix = 2;
        while !is_free(&name, &self.page_dirs) {
            name = format!("{}-{}", base, suffix);
            suffix += 1;
        }

        self.page_dirs.insert(name.clone());
        name
    }

    /// Number of page directories handed out
    pub fn page_dir_count(&self) -> usize {
        self.page_dirs.len()
    }
}
