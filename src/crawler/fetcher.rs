//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings and timeouts
//! - GET requests that follow redirects and return the final URL
//! - Classifying failures into a small set of kinds

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::url::NormalizedUrl;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Maximum redirect hops followed for one request
const MAX_REDIRECTS: usize = 10;

/// A successfully fetched response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: String,

    /// HTTP status code
    pub status: u16,

    /// Content-Type header value, empty when absent
    pub content_type: String,

    /// Raw response body
    pub body: Vec<u8>,
}

/// Kinds of fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// No response within the request timeout
    Timeout,

    /// Host name could not be resolved
    Dns,

    /// 4xx status
    Http4xx,

    /// 5xx status
    Http5xx,

    /// Connection refused, reset, TLS failure or a broken body
    Connection,

    /// Too many redirects, or a redirect status that could not be followed
    Redirect,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Timeout => "timeout",
            Self::Dns => "dns",
            Self::Http4xx => "http-4xx",
            Self::Http5xx => "http-5xx",
            Self::Connection => "connection",
            Self::Redirect => "redirect",
        };
        f.write_str(text)
    }
}

/// A failed fetch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error fetching {url}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub url: String,

    /// Response status, when the server answered
    pub status: Option<u16>,

    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            status: None,
            message: message.into(),
        }
    }

    fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Retrieves a URL's body
///
/// Implementations follow redirects and report the final URL. A non-2xx
/// final status is an error.
pub trait Fetcher {
    fn fetch(
        &self,
        url: &NormalizedUrl,
    ) -> impl Future<Output = Result<FetchedPage, FetchError>> + Send;
}

/// Fetcher backed by a `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds a fetcher with the configured timeouts and user agent
    pub fn new(crawler: &CrawlerConfig, user_agent: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(crawler, user_agent)?,
        })
    }

    /// Wraps an existing client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &NormalizedUrl) -> Result<FetchedPage, FetchError> {
        fetch_url(&self.client, url.as_str()).await
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use site_harvest::config::{CrawlerConfig, UserAgentConfig};
/// use site_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&CrawlerConfig::default(), &UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    crawler: &CrawlerConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(crawler.request_timeout_secs))
        .connect_timeout(Duration::from_secs(crawler.connect_timeout_secs))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL and classifies any failure
///
/// | Condition | Kind |
/// |-----------|------|
/// | 2xx | success |
/// | 3xx left after redirects | Redirect |
/// | 4xx | Http4xx |
/// | 5xx | Http5xx |
/// | Timeout (connect, headers or body) | Timeout |
/// | Name resolution failure | Dns |
/// | Redirect chain > 10 | Redirect |
/// | Anything else on the wire | Connection |
pub async fn fetch_url(client: &Client, url: &str) -> Result<FetchedPage, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::new(classify_reqwest_error(&e), url, error_chain(&e)))?;

    let status = response.status();
    let final_url = response.url().to_string();

    if let Some(kind) = status_error_kind(status) {
        return Err(FetchError::new(kind, url, format!("HTTP {}", status)).with_status(status.as_u16()));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = response.bytes().await.map_err(|e| {
        FetchError::new(classify_reqwest_error(&e), url, error_chain(&e)).with_status(status.as_u16())
    })?;

    Ok(FetchedPage {
        final_url,
        status: status.as_u16(),
        content_type,
        body: body.to_vec(),
    })
}

fn status_error_kind(status: StatusCode) -> Option<FetchErrorKind> {
    if status.is_success() {
        None
    } else if status.is_client_error() {
        Some(FetchErrorKind::Http4xx)
    } else if status.is_server_error() {
        Some(FetchErrorKind::Http5xx)
    } else {
        Some(FetchErrorKind::Redirect)
    }
}

fn classify_reqwest_error(error: &reqwest::Error) -> FetchErrorKind {
    if error.is_timeout() {
        FetchErrorKind::Timeout
    } else if error.is_redirect() {
        FetchErrorKind::Redirect
    } else if is_dns_failure(error) {
        FetchErrorKind::Dns
    } else {
        FetchErrorKind::Connection
    }
}

/// Resolver failures only show up in the source chain's messages
fn is_dns_failure(error: &reqwest::Error) -> bool {
    let chain = error_chain(error).to_lowercase();
    chain.contains("dns error")
        || chain.contains("failed to lookup address")
        || chain.contains("name or service not known")
        || chain.contains("no such host")
}

/// Joins an error and all its sources into one message
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
