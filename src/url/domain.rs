use super::NormalizedUrl;

/// Decides whether a URL belongs to the crawled site
///
/// True iff the URL's host equals `root_host` exactly. Subdomains, the bare
/// registrable domain, and `www.` variants all count as different sites.
///
/// # Examples
///
/// ```
/// use site_harvest::url::{in_scope, NormalizedUrl};
///
/// let url = NormalizedUrl::parse("https://example.com/path").unwrap();
/// assert!(in_scope(&url, "example.com"));
///
/// let url = NormalizedUrl::parse("https://blog.example.com/post").unwrap();
/// assert!(!in_scope(&url, "example.com"));
/// ```
pub fn in_scope(url: &NormalizedUrl, root_host: &str) -> bool {
    url.host() == root_host
}
