use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Site-Harvest
///
/// Every section is optional; a missing file behaves like an empty one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    pub classifier: ClassifierConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of pages to record (unbounded when absent)
    pub max_pages: Option<u64>,

    /// Maximum link depth to enqueue (unbounded when absent)
    pub max_depth: Option<u32>,

    /// Minimum time between consecutive page fetches (milliseconds)
    pub delay_ms: u64,

    /// Hard per-request timeout (seconds)
    pub request_timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    pub connect_timeout_secs: u64,

    /// Recorded pages between flushes of hierarchy, listings and checkpoint
    pub checkpoint_interval: u64,

    /// Keep query strings as part of the page key
    pub keep_query: bool,

    /// Download referenced images into each page directory
    pub download_images: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: None,
            max_depth: None,
            delay_ms: 1000,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            checkpoint_interval: 10,
            keep_query: false,
            download_images: true,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: Option<String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SiteHarvest".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: None,
        }
    }
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(contact) => format!(
                "{}/{} (+{})",
                self.crawler_name, self.crawler_version, contact
            ),
            None => format!("{}/{}", self.crawler_name, self.crawler_version),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Root directory for all persisted artifacts
    pub output_dir: PathBuf,

    /// Log file path; defaults to `crawl.log` inside the output directory
    pub log_file: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("website_content"),
            log_file: None,
        }
    }
}

impl OutputConfig {
    /// Resolved path of the append-only log file
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("crawl.log"))
    }
}

/// Keyword lists driving page classification
///
/// Segment keywords match case-insensitively as substrings of a URL path
/// segment. Selectors are CSS selectors; a page matching one carries that
/// signal regardless of its path.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClassifierConfig {
    pub product_segments: Vec<String>,
    pub category_segments: Vec<String>,
    pub product_selectors: Vec<String>,
    pub category_selectors: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            product_segments: vec!["product".to_string()],
            category_segments: vec!["category".to_string(), "shop".to_string()],
            product_selectors: vec![
                "div.product".to_string(),
                "div.woocommerce-product-gallery".to_string(),
            ],
            category_selectors: vec![
                "ul.products".to_string(),
                "div.woocommerce-products-header".to_string(),
            ],
        }
    }
}
