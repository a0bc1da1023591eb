use crate::UrlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Tracking query parameters removed when queries are kept
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Options controlling how URLs collapse to a canonical key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Keep the query string (tracking parameters removed, keys sorted).
    /// When false the query is dropped entirely.
    pub keep_query: bool,
}

impl NormalizeOptions {
    /// Options used for image references, which often depend on their query
    pub fn keeping_query() -> Self {
        Self { keep_query: true }
    }
}

/// A URL in canonical form
///
/// Two URLs that differ only by fragment, trailing slash, default port or
/// letter case of scheme and host share the same `NormalizedUrl`. Only
/// `http`/`https` URLs with a host can be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedUrl(Url);

impl NormalizedUrl {
    /// Parses and normalizes an absolute URL with default options
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        normalize_with(raw, None, NormalizeOptions::default())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// The lowercase host; always present by construction
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.0.query()
    }

    /// Non-empty path segments, still percent-encoded
    pub fn path_segments(&self) -> Vec<&str> {
        self.0
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl TryFrom<String> for NormalizedUrl {
    type Error = UrlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let url = Url::parse(&value).map_err(|e| UrlError::Parse(format!("{}: {}", value, e)))?;
        Ok(Self(url))
    }
}

impl From<NormalizedUrl> for String {
    fn from(value: NormalizedUrl) -> Self {
        value.0.into()
    }
}

/// Normalizes a raw link against the page it was found on
///
/// # Normalization Steps
///
/// 1. Resolve `raw` against `base` (absolute URLs ignore the base)
/// 2. Reject anything that is not `http`/`https` or has no host
/// 3. Lowercase scheme and host, drop default ports (done by the parser)
/// 4. Normalize path:
///    - Remove dot segments and empty segments (`//`)
///    - Remove trailing slash (except for root /)
/// 5. Remove fragment
/// 6. Drop the query string
///
/// # Examples
///
/// ```
/// use site_harvest::url::{normalize, NormalizedUrl};
///
/// let base = NormalizedUrl::parse("https://example.com/shop").unwrap();
/// let url = normalize("../about//#team", &base).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/about");
/// ```
pub fn normalize(raw: &str, base: &NormalizedUrl) -> Result<NormalizedUrl, UrlError> {
    normalize_with(raw, Some(base), NormalizeOptions::default())
}

/// Normalizes a URL with explicit options and an optional base
///
/// With `keep_query` the query survives, minus tracking parameters
/// (`utm_*`, `fbclid`, `gclid`, `mc_eid`), with the remaining pairs sorted by key.
pub fn normalize_with(
    raw: &str,
    base: Option<&NormalizedUrl>,
    options: NormalizeOptions,
) -> Result<NormalizedUrl, UrlError> {
    let raw = raw.trim();
    let parsed = match base {
        Some(base) => base.as_url().join(raw),
        None => Url::parse(raw),
    }
    .map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    canonicalize(parsed, options)
}

fn canonicalize(mut url: Url, options: NormalizeOptions) -> Result<NormalizedUrl, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_lowercase(),
        _ => return Err(UrlError::MissingHost(url.to_string())),
    };
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host {}: {}", host, e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if options.keep_query && url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    } else {
        url.set_query(None);
    }

    Ok(NormalizedUrl(url))
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            // Empty segments come from repeated or trailing slashes
            "" | "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", normalized_segments.join("/"))
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
