//! Persistence sink trait and record types
//!
//! This module defines the trait interface the crawl loop writes through and
//! the per-page record it hands over.

use crate::crawler::PageMetadata;
use crate::state::{CrawlSession, HierarchyTree, PageListings, PageNode};
use crate::url::NormalizedUrl;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
///
/// Any of these is fatal to the crawl: it stops after a best-effort flush.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        source: serde_json::Error,
    },

    #[error("Failed to read checkpoint {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// An image referenced by a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageDescriptor {
    /// Absolute image URL
    pub original_url: String,

    pub alt_text: String,

    /// Path of the downloaded copy relative to the output directory
    pub local_path: Option<String>,

    pub filename: Option<String>,

    pub content_type: Option<String>,
}

/// A link found on a page, after normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundLink {
    pub url: NormalizedUrl,
    pub text: String,
    pub title: Option<String>,

    /// Whether the link stays on the crawled host
    pub in_scope: bool,
}

/// Everything persisted for one recorded page
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub node: PageNode,

    /// Directory name of this page under the output directory
    pub page_dir: String,

    /// URL after redirects
    pub fetched_url: String,

    pub status: u16,
    pub content_type: String,
    pub fetched_at: DateTime<Utc>,

    pub metadata: PageMetadata,
    pub structured_data: Vec<serde_json::Value>,

    /// Path of the text file relative to the output directory
    pub text_ref: String,

    pub images: Vec<ImageDescriptor>,
    pub outbound_links: Vec<OutboundLink>,
}

/// Trait for crawl output backends
///
/// The crawl loop is the only caller; calls never overlap.
pub trait PersistenceSink {
    /// Writes one page's text and metadata
    fn write_page(&mut self, record: &PageRecord, text: &str) -> OutputResult<()>;

    /// Stores downloaded image bytes for a page
    ///
    /// Returns the stored file's path relative to the output directory.
    fn write_image(&mut self, page_dir: &str, file_name: &str, bytes: &[u8])
        -> OutputResult<String>;

    /// Replaces the hierarchy export; `None` when nothing was recorded
    fn write_hierarchy(&mut self, tree: Option<&HierarchyTree>) -> OutputResult<()>;

    /// Replaces the page listings
    fn write_listings(&mut self, listings: &PageListings) -> OutputResult<()>;

    /// Replaces the crawl checkpoint
    fn write_checkpoint(&mut self, session: &CrawlSession) -> OutputResult<()>;
}
