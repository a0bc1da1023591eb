//! Scheduler for managing the crawl frontier and rate limiting
//!
//! This module handles:
//! - The FIFO frontier of URLs waiting to be fetched
//! - The visited set, which also covers everything ever enqueued
//! - Spacing consecutive page fetches by a minimum delay

use crate::url::NormalizedUrl;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    /// The URL to fetch
    pub url: NormalizedUrl,

    /// Page whose links first produced this URL (`None` for the seed)
    pub parent: Option<NormalizedUrl>,

    /// Link distance from the seed
    pub depth: u32,
}

/// FIFO queue of pending URLs plus the set of URLs ever enqueued
///
/// A URL enters the visited set at the moment it is enqueued, so it can be
/// queued and fetched at most once per session. Dequeue order equals enqueue
/// order, which makes the traversal breadth-first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frontier {
    queue: VecDeque<FrontierEntry>,
    visited: HashSet<NormalizedUrl>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `url` unless it was seen before
    ///
    /// Returns true if the URL was added. The visited check and insert happen
    /// together, so no URL is ever queued twice.
    pub fn enqueue_if_new(
        &mut self,
        url: NormalizedUrl,
        parent: Option<NormalizedUrl>,
        depth: u32,
    ) -> bool {
        if !self.visited.insert(url.clone()) {
            tracing::trace!("Already seen: {}", url);
            return false;
        }

        tracing::debug!("Enqueued {} at depth {}", url, depth);
        self.queue.push_back(FrontierEntry { url, parent, depth });
        true
    }

    /// Removes and returns the oldest pending entry
    pub fn dequeue(&mut self) -> Option<FrontierEntry> {
        self.queue.pop_front()
    }

    /// Returns true if `url` was ever enqueued
    pub fn is_visited(&self, url: &NormalizedUrl) -> bool {
        self.visited.contains(url)
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of URLs ever enqueued
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

/// Enforces a minimum delay between consecutive page fetches
///
/// The lock is held across the sleep, so concurrent callers are serialized
/// and each one waits for the previous one's turn to end.
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    last_turn: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_turn: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Suspends until at least `delay` has passed since the previous call
    /// returned; the first call returns immediately
    pub async fn wait_turn(&self) {
        let mut last_turn = self.last_turn.lock().await;

        if let Some(previous) = *last_turn {
            let ready_at = previous + self.delay;
            if ready_at > Instant::now() {
                tracing::trace!("Rate limiter sleeping until next turn");
                tokio::time::sleep_until(ready_at).await;
            }
        }

        *last_turn = Some(Instant::now());
    }
}
