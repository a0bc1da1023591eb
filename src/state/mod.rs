//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlState`: The crawl loop state machine (idle, running, completed, aborted)
//! - `HierarchyBuilder`: Parent/child tree of recorded pages
//! - `CrawlSession`: Everything a crawl mutates, checkpointed as one value

mod hierarchy;
mod run_state;
mod session;

// Re-export main types
pub use hierarchy::{HierarchyBuilder, HierarchyError, HierarchyTree, PageListings, PageNode};
pub use run_state::{CrawlState, TerminationReason};
pub use session::CrawlSession;
