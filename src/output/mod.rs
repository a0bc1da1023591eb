//! Output module for persisting crawl results
//!
//! This module handles:
//! - The persistence sink interface and its filesystem implementation
//! - Naming of per-page directories and downloaded images
//! - Recording and printing crawl statistics
//!
//! # Layout
//!
//! ```text
//! <output-dir>/
//!   site_hierarchy.json
//!   page_listings.json
//!   crawl_checkpoint.json
//!   crawl.log
//!   <page-dir>/
//!     page_info.json
//!     text/content.txt
//!     images/<file>
//! ```

mod filesystem;
pub mod stats;
mod traits;

pub use filesystem::FsSink;
pub use stats::{print_statistics, CrawlStats};
pub use traits::{
    ImageDescriptor, OutboundLink, OutputError, OutputResult, PageRecord, PersistenceSink,
};

use crate::url::NormalizedUrl;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

pub const HIERARCHY_FILE: &str = "site_hierarchy.json";
pub const LISTINGS_FILE: &str = "page_listings.json";
pub const CHECKPOINT_FILE: &str = "crawl_checkpoint.json";
pub const LOG_FILE: &str = "crawl.log";
pub const PAGE_INFO_FILE: &str = "page_info.json";
pub const TEXT_DIR: &str = "text";
pub const TEXT_FILE: &str = "content.txt";
pub const IMAGES_DIR: &str = "images";

/// Top-level names a page directory must not take
pub const RESERVED_NAMES: &[&str] = &[HIERARCHY_FILE, LISTINGS_FILE, CHECKPOINT_FILE, LOG_FILE];

/// Longest page directory name in bytes before it is shortened
const MAX_DIR_NAME: usize = 150;

/// Longest image file stem in bytes
const MAX_IMAGE_STEM: usize = 100;

/// Derives a filesystem-safe directory name from a page URL
///
/// The path is trimmed of slashes, percent-decoded and lowercased; characters
/// that are unsafe in file names become `-`. The site root maps to `home`.
/// With `include_query`, the query is appended after `_`. A name made only
/// of dots has them replaced, so the key is always a plain directory name.
/// Keys over 150 bytes are cut at a character boundary and suffixed with a
/// hash of the URL.
///
/// # Example
///
/// ```
/// use site_harvest::output::page_dir_key;
/// use site_harvest::url::NormalizedUrl;
///
/// let url = NormalizedUrl::parse("https://example.com/Shop/Red%20Shirts/").unwrap();
/// assert_eq!(page_dir_key(&url, false), "shop-red shirts");
/// ```
pub fn page_dir_key(url: &NormalizedUrl, include_query: bool) -> String {
    let path = url.path().trim_matches('/');
    let decoded = urlencoding::decode(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string());

    let mut key = sanitize(&decoded.to_lowercase());
    if key.is_empty() {
        key = "home".to_string();
    }

    if include_query {
        if let Some(query) = url.query().filter(|q| !q.is_empty()) {
            key.push('_');
            key.push_str(&sanitize(query));
        }
    }

    if key.chars().all(|c| c == '.' || c.is_whitespace()) {
        key = key.replace('.', "-");
    }

    if key.len() > MAX_DIR_NAME {
        let digest = hex::encode(Sha256::digest(url.as_str().as_bytes()));
        key = format!("{}-{}", truncate_bytes(&key, MAX_DIR_NAME - 9), &digest[..8]);
    }

    key
}

/// Path of a page's text file relative to the output directory
pub fn text_ref(page_dir: &str) -> String {
    format!("{}/{}/{}", page_dir, TEXT_DIR, TEXT_FILE)
}

/// Derives a local file name for a downloaded image
///
/// The stem comes from the last path segment; the extension from the
/// response content type, else the URL's own extension, else `.bin`.
pub fn image_file_name(url: &NormalizedUrl, content_type: &str) -> String {
    let last = url
        .path_segments()
        .last()
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .unwrap_or_default()
        .to_lowercase();

    let (stem, original_ext) = match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && is_plain_extension(ext) => {
            (stem.to_string(), Some(ext.to_string()))
        }
        _ => (last.clone(), None),
    };

    let mut stem = truncate_bytes(&sanitize(&stem).replace(' ', "_"), MAX_IMAGE_STEM).to_string();
    if stem.is_empty() {
        stem = "image".to_string();
    }

    let ext = extension_for_content_type(content_type)
        .map(str::to_string)
        .or(original_ext)
        .unwrap_or_else(|| "bin".to_string());

    format!("{}.{}", stem, ext)
}

/// Appends a numeric suffix until `name` is not in `used`, then claims it
pub fn unique_file_name(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{}", ext)),
        None => (name.clone(), String::new()),
    };

    let mut n = 2;
    loop {
        let candidate = format!("{}_{}{}", stem, n, ext);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "image/avif" => Some("avif"),
        "image/bmp" => Some("bmp"),
        "image/x-icon" | "image/vnd.microsoft.icon" => Some("ico"),
        "image/tiff" => Some("tiff"),
        _ => None,
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a character
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn is_plain_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}
