//! Site-Harvest: a single-site content harvester
//!
//! This crate crawls one website from a seed URL, follows same-host links
//! breadth-first, and writes a deduplicated record of the site's hierarchy,
//! per-page text, and per-page media references. Partial progress is flushed
//! incrementally so an interrupted crawl always leaves loadable output.

pub mod classify;
pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Site-Harvest operations
///
/// Only setup failures and persistence failures surface here. Per-page
/// problems (bad links, fetch failures, malformed content) are logged and
/// counted by the crawl loop instead.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid seed URL '{url}': {source}")]
    InvalidSeed { url: String, source: UrlError },

    #[error("Output directory '{path}' is not usable: {source}")]
    OutputDir {
        path: String,
        source: std::io::Error,
    },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Persistence error: {0}")]
    Persistence(#[from] output::OutputError),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::CrawlState,
        to: state::CrawlState,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
///
/// Every variant means the link cannot be used; callers skip it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL: {0}")]
    MissingHost(String),
}

/// Result type alias for Site-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use classify::{PageClassification, PageClassifier};
pub use config::Config;
pub use crawler::{run_crawl, CancelFlag, Coordinator, CrawlOutcome};
pub use state::{CrawlSession, CrawlState, PageNode};
pub use url::{in_scope, normalize, NormalizedUrl};
