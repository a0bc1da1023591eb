/// Crawl loop state definitions
///
/// A crawl moves `Idle -> Running -> {Completed, Aborted}`. Both terminal
/// states leave valid, loadable output behind.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of the crawl loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlState {
    /// Session created, loop not started
    Idle,

    /// Loop is dequeuing and processing pages
    Running,

    /// Frontier exhausted or page limit reached
    Completed,

    /// Cancelled externally or stopped by a persistence failure
    Aborted,
}

impl CrawlState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Returns true if the loop may move from `self` to `next`
    pub fn can_transition_to(&self, next: CrawlState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Aborted)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the crawl loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// No URLs left to fetch
    FrontierExhausted,

    /// The configured page limit was reached
    PageLimitReached,

    /// An external cancellation request was observed
    Cancelled,

    /// Writing output failed; the crawl cannot continue without it
    PersistenceFailure,
}

impl TerminationReason {
    /// Terminal state the loop enters for this reason
    pub fn final_state(&self) -> CrawlState {
        match self {
            Self::FrontierExhausted | Self::PageLimitReached => CrawlState::Completed,
            Self::Cancelled | Self::PersistenceFailure => CrawlState::Aborted,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::FrontierExhausted => "frontier exhausted",
            Self::PageLimitReached => "page limit reached",
            Self::Cancelled => "cancelled",
            Self::PersistenceFailure => "persistence failure",
        };
        f.write_str(text)
    }
}
