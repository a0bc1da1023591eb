//! Page processor for extracting text, metadata, images and links
//!
//! This module handles parsing fetched content to extract:
//! - Visible text, one trimmed run per line
//! - Title, meta description/keywords and headings
//! - JSON-LD structured data and product details
//! - Image references and raw link targets
//! - Which classifier marker selectors match the document

use crate::url::NormalizedUrl;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Elements whose text is never page content
const NON_CONTENT_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Errors raised while processing a page body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("HTML body of {url} is not valid UTF-8 at byte {offset}")]
    InvalidEncoding { url: String, offset: usize },
}

/// A raw link target as written in the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLink {
    pub href: String,

    /// Anchor text, whitespace collapsed
    pub text: String,

    /// Value of the `title` attribute
    pub title: Option<String>,
}

/// A raw image reference as written in the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub src: String,
    pub alt: String,
}

/// Product details found on a page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductInfo {
    pub price: Option<String>,
    pub sku: Option<String>,
    pub stock_status: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

/// Descriptive metadata saved with each page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub h1_headings: Vec<String>,
    pub h2_headings: Vec<String>,
    pub h3_headings: Vec<String>,

    /// Only set for pages classified as products
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_info: Option<ProductInfo>,
}

/// Extracted information from a page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// Visible text
    pub text: String,

    pub metadata: PageMetadata,

    /// Parsed JSON-LD blocks
    pub structured_data: Vec<serde_json::Value>,

    pub product_info: ProductInfo,

    /// Image references in document order, deduplicated by `src`
    pub images: Vec<ImageRef>,

    /// Link targets in document order, deduplicated by `href`
    pub links: Vec<RawLink>,

    /// Marker selectors that matched at least one element
    pub matched_selectors: BTreeSet<String>,
}

/// Turns a fetched body into text, metadata, images and links
pub trait PageProcessor {
    /// Processes a body fetched from `url`
    ///
    /// Content that is not HTML yields an empty result rather than an error.
    fn process(
        &self,
        url: &NormalizedUrl,
        body: &[u8],
        content_type: &str,
    ) -> Result<ParsedPage, ProcessError>;
}

/// HTML page processor built on `scraper`
#[derive(Debug, Clone, Default)]
pub struct HtmlProcessor {
    markers: Vec<(String, Selector)>,
}

impl HtmlProcessor {
    /// Creates a processor reporting matches for `marker_selectors`
    ///
    /// Selectors that fail to parse are skipped with a warning.
    pub fn new(marker_selectors: &[String]) -> Self {
        let markers = marker_selectors
            .iter()
            .filter_map(|raw| match Selector::parse(raw) {
                Ok(selector) => Some((raw.clone(), selector)),
                Err(e) => {
                    tracing::warn!("Ignoring invalid marker selector '{}': {:?}", raw, e);
                    None
                }
            })
            .collect();
        Self { markers }
    }

    /// Parses an HTML document
    ///
    /// # Link Extraction Rules
    ///
    /// **Include:**
    /// - `<a href="...">` tags anywhere in the document
    ///
    /// **Exclude:**
    /// - `<a href="..." download>`
    /// - `javascript:`, `mailto:`, `tel:` links
    /// - Data URIs
    /// - Fragment-only links
    ///
    /// # Example
    ///
    /// ```
    /// use site_harvest::crawler::HtmlProcessor;
    ///
    /// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
    /// let parsed = HtmlProcessor::default().parse_html(html);
    /// assert_eq!(parsed.metadata.title, Some("Test".to_string()));
    /// assert_eq!(parsed.links[0].href, "/page");
    /// ```
    pub fn parse_html(&self, html: &str) -> ParsedPage {
        let document = Html::parse_document(html);

        let matched_selectors = self
            .markers
            .iter()
            .filter(|(_, selector)| document.select(selector).next().is_some())
            .map(|(raw, _)| raw.clone())
            .collect();

        ParsedPage {
            text: extract_text(&document),
            metadata: extract_metadata(&document),
            structured_data: extract_structured_data(&document),
            product_info: extract_product_info(&document),
            images: extract_images(&document),
            links: extract_links(&document),
            matched_selectors,
        }
    }
}

impl PageProcessor for HtmlProcessor {
    fn process(
        &self,
        url: &NormalizedUrl,
        body: &[u8],
        content_type: &str,
    ) -> Result<ParsedPage, ProcessError> {
        if !is_html(content_type, body) {
            tracing::debug!("Skipping non-HTML content at {} ({})", url, content_type);
            return Ok(ParsedPage::default());
        }

        let html = decode_body(url, body, content_type)?;
        Ok(self.parse_html(&html))
    }
}

/// Returns true if the response should be parsed as HTML
///
/// Without a content type the body is sniffed for an HTML prologue.
pub fn is_html(content_type: &str, body: &[u8]) -> bool {
    let mime = content_type.to_lowercase();
    if !mime.trim().is_empty() {
        return mime.contains("text/html") || mime.contains("application/xhtml+xml");
    }

    let head_len = body.len().min(512);
    let head = String::from_utf8_lossy(&body[..head_len]).to_lowercase();
    let head = head.trim_start();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.contains("<body")
}

fn decode_body(url: &NormalizedUrl, body: &[u8], content_type: &str) -> Result<String, ProcessError> {
    match charset(content_type).as_deref() {
        None | Some("utf-8") | Some("utf8") => std::str::from_utf8(body)
            .map(str::to_string)
            .map_err(|e| ProcessError::InvalidEncoding {
                url: url.to_string(),
                offset: e.valid_up_to(),
            }),
        // Latin-1 maps each byte to the code point of the same value
        Some("iso-8859-1") | Some("latin1") | Some("windows-1252") | Some("us-ascii") => {
            Ok(body.iter().map(|&b| b as char).collect())
        }
        Some(other) => {
            tracing::debug!("Decoding {} charset {} lossily", url, other);
            Ok(String::from_utf8_lossy(body).into_owned())
        }
    }
}

fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_lowercase())
        } else {
            None
        }
    })
}

/// Collects text nodes outside non-content elements, one trimmed run per line
fn extract_text(document: &Html) -> String {
    let mut lines = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| NON_CONTENT_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }

        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }

    lines.join("\n")
}

fn extract_metadata(document: &Html) -> PageMetadata {
    PageMetadata {
        title: first_text(document, "title"),
        meta_description: meta_content(document, "description"),
        meta_keywords: meta_content(document, "keywords"),
        h1_headings: all_texts(document, "h1"),
        h2_headings: all_texts(document, "h2"),
        h3_headings: all_texts(document, "h3"),
        product_info: None,
    }
}

fn meta_content(document: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse(&format!("meta[name=\"{}\"][content]", name)).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

fn extract_structured_data(document: &Html) -> Vec<serde_json::Value> {
    let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|el| {
            let raw = el.text().collect::<String>();
            match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::debug!("Ignoring invalid JSON-LD block: {}", e);
                    None
                }
            }
        })
        .collect()
}

fn extract_product_info(document: &Html) -> ProductInfo {
    ProductInfo {
        price: first_text(document, ".price, .woocommerce-Price-amount"),
        sku: first_text(document, ".sku"),
        stock_status: first_text(document, ".stock"),
        categories: linked_texts(document, ".posted_in"),
        tags: linked_texts(document, ".tagged_as"),
    }
}

/// Link texts inside each element matching `css`, or the element text itself
fn linked_texts(document: &Html, css: &str) -> Vec<String> {
    let (Ok(container), Ok(anchor)) = (Selector::parse(css), Selector::parse("a")) else {
        return Vec::new();
    };

    let mut values = Vec::new();
    for el in document.select(&container) {
        let anchors: Vec<String> = el.select(&anchor).map(element_text).collect();
        if anchors.is_empty() {
            values.push(element_text(el));
        } else {
            values.extend(anchors);
        }
    }
    values.retain(|v| !v.is_empty());
    values
}

fn extract_images(document: &Html) -> Vec<ImageRef> {
    let Ok(selector) = Selector::parse("img[src]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut images = Vec::new();
    for el in document.select(&selector) {
        let Some(src) = el.value().attr("src").map(str::trim) else {
            continue;
        };
        if src.is_empty() || src.starts_with("data:") || !seen.insert(src.to_string()) {
            continue;
        }

        images.push(ImageRef {
            src: src.to_string(),
            alt: el.value().attr("alt").unwrap_or_default().trim().to_string(),
        });
    }
    images
}

/// Extracts followable link targets
fn extract_links(document: &Html) -> Vec<RawLink> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for el in document.select(&selector) {
        // Skip if it has the download attribute
        if el.value().attr("download").is_some() {
            continue;
        }

        let Some(href) = el.value().attr("href").map(str::trim) else {
            continue;
        };
        if !is_followable(href) || !seen.insert(href.to_string()) {
            continue;
        }

        links.push(RawLink {
            href: href.to_string(),
            text: element_text(el),
            title: el
                .value()
                .attr("title")
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        });
    }
    links
}

/// Returns false for hrefs that can never lead to a page
fn is_followable(href: &str) -> bool {
    if href.is_empty() || href.starts_with('#') {
        return false;
    }

    let lower = href.to_ascii_lowercase();
    !(lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:"))
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .map(element_text)
        .find(|text| !text.is_empty())
}

fn all_texts(document: &Html, css: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(css) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect()
}

/// Element text with whitespace runs collapsed to single spaces
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
