//! Page classification
//!
//! Each recorded page gets a coarse tag used for the page listings. The
//! heuristics are data, not code: keyword and selector lists come from
//! [`ClassifierConfig`] and can be replaced without touching the control flow.

use crate::config::ClassifierConfig;
use crate::url::NormalizedUrl;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Page classification types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageClassification {
    /// A single product page
    Product,
    /// A listing of products (category, shop, collection)
    Category,
    /// Any other page with extracted text
    Content,
    /// No product signal and no text (binary, empty, unparsable)
    Other,
}

impl PageClassification {
    /// All classifications in listing order
    pub const ALL: [PageClassification; 4] = [
        Self::Product,
        Self::Category,
        Self::Content,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Category => "category",
            Self::Content => "content",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for PageClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies pages from their path, extracted text and matched selectors
#[derive(Debug, Clone)]
pub struct PageClassifier {
    product_segments: Vec<String>,
    category_segments: Vec<String>,
    product_selectors: Vec<String>,
    category_selectors: Vec<String>,
}

impl Default for PageClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

impl PageClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let lower = |list: &[String]| -> Vec<String> {
            list.iter().map(|k| k.trim().to_lowercase()).collect()
        };
        Self {
            product_segments: lower(&config.product_segments),
            category_segments: lower(&config.category_segments),
            product_selectors: config.product_selectors.clone(),
            category_selectors: config.category_selectors.clone(),
        }
    }

    /// CSS selectors the page processor should report matches for
    pub fn marker_selectors(&self) -> Vec<String> {
        let mut selectors: Vec<String> = self
            .product_selectors
            .iter()
            .chain(&self.category_selectors)
            .cloned()
            .collect();
        selectors.sort();
        selectors.dedup();
        selectors
    }

    /// Classifies a page
    ///
    /// Precedence, first match wins:
    /// 1. Product keyword in a path segment, or a product selector matched
    /// 2. Category keyword in a path segment, or a category selector matched
    /// 3. Non-empty extracted text
    /// 4. Other
    ///
    /// `path_segments` must already be lowercased and percent-decoded.
    pub fn classify(
        &self,
        path_segments: &[String],
        text: &str,
        matched_selectors: &BTreeSet<String>,
    ) -> PageClassification {
        if self.segment_matches(path_segments, &self.product_segments)
            || self.any_matched(matched_selectors, &self.product_selectors)
        {
            return PageClassification::Product;
        }

        if self.segment_matches(path_segments, &self.category_segments)
            || self.any_matched(matched_selectors, &self.category_selectors)
        {
            return PageClassification::Category;
        }

        if !text.trim().is_empty() {
            return PageClassification::Content;
        }

        PageClassification::Other
    }

    /// Classifies a page, deriving its path segments from the URL
    pub fn classify_url(
        &self,
        url: &NormalizedUrl,
        text: &str,
        matched_selectors: &BTreeSet<String>,
    ) -> PageClassification {
        self.classify(&decoded_segments(url), text, matched_selectors)
    }

    fn segment_matches(&self, segments: &[String], keywords: &[String]) -> bool {
        segments
            .iter()
            .any(|segment| keywords.iter().any(|k| segment.contains(k.as_str())))
    }

    fn any_matched(&self, matched: &BTreeSet<String>, selectors: &[String]) -> bool {
        selectors.iter().any(|s| matched.contains(s))
    }
}

/// Lowercased, percent-decoded, non-empty path segments of a URL
pub fn decoded_segments(url: &NormalizedUrl) -> Vec<String> {
    url.path_segments()
        .into_iter()
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string())
                .to_lowercase()
        })
        .collect()
}
