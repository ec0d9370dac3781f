//! Remote module fetching
//!
//! Downloads module bundles over HTTP/HTTPS for the network load strategies.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

/// Boxed future returned by [`Fetch::fetch`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur during URL fetching
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP {status} for URL: {url}")]
    HttpStatus {
        /// Status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Content too large
    #[error("Content too large: {size} bytes (max: {max})")]
    ContentTooLarge {
        /// Reported or received size
        size: u64,
        /// Limit
        max: u64,
    },
}

/// Maximum size of a fetched module (50 MB)
pub const MAX_CONTENT_SIZE: u64 = 50 * 1024 * 1024;

/// Per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("kiln-sys/", env!("CARGO_PKG_VERSION"));

/// Source of remote module text.
pub trait Fetch: Send + Sync + fmt::Debug {
    /// Fetch `url`, blocking the current thread.
    fn fetch_blocking(&self, url: &str) -> Result<String, FetchError>;

    /// Fetch `url` without blocking.
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>>;
}

/// Build the CDN URL for `{module_id}@{version}/{path}`.
pub fn remote_url(cdn_url: &str, module_id: &str, version: &str, path: &str) -> Result<String, FetchError> {
    let url = format!(
        "{}/{}@{}/{}",
        cdn_url.trim_end_matches('/'),
        module_id,
        version,
        path.trim_start_matches('/')
    );
    validate_url(&url)?;
    Ok(url)
}

/// Whether `candidate` is an absolute HTTP(S) URL.
pub fn is_http_url(candidate: &str) -> bool {
    validate_url(candidate).is_ok()
}

fn validate_url(candidate: &str) -> Result<(), FetchError> {
    let parsed = url::Url::parse(candidate)
        .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", candidate, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl(candidate.to_string()));
    }
    Ok(())
}

/// HTTP fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_size: u64,
}

impl HttpFetcher {
    /// Create a fetcher with the default size limit
    pub fn new() -> Result<Self, FetchError> {
        Self::with_max_size(MAX_CONTENT_SIZE)
    }

    /// Create a fetcher with a custom size limit
    pub fn with_max_size(max_size: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, max_size })
    }

    fn check_length(&self, len: Option<u64>) -> Result<(), FetchError> {
        match len {
            Some(size) if size > self.max_size => Err(FetchError::ContentTooLarge {
                size,
                max: self.max_size,
            }),
            _ => Ok(()),
        }
    }
}

impl Fetch for HttpFetcher {
    fn fetch_blocking(&self, url: &str) -> Result<String, FetchError> {
        validate_url(url)?;
        // built per call: a blocking client must not be dropped inside an async context
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        let response = client.get(url).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        self.check_length(response.content_length())?;

        let body = response.bytes()?;
        self.check_length(Some(body.len() as u64))?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        Box::pin(async move {
            validate_url(url)?;
            let response = self.client.get(url).send().await?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            self.check_length(response.content_length())?;

            let body = response.bytes().await?;
            self.check_length(Some(body.len() as u64))?;
            Ok(String::from_utf8_lossy(&body).into_owned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_url() {
        let url = remote_url("https://cdn.jsdelivr.net/npm/", "typescript", "5.5.4", "lib/typescript.js").unwrap();
        assert_eq!(url, "https://cdn.jsdelivr.net/npm/typescript@5.5.4/lib/typescript.js");

        let url = remote_url("https://unpkg.com", "rollup", "4.18.0", "/dist/rollup.browser.es.js").unwrap();
        assert_eq!(url, "https://unpkg.com/rollup@4.18.0/dist/rollup.browser.es.js");
    }

    #[test]
    fn test_invalid_urls() {
        assert!(matches!(
            remote_url("not a url", "typescript", "1", "x.js"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(!is_http_url("file:///tmp/typescript.js"));
        assert!(!is_http_url("./node_modules/typescript"));
        assert!(is_http_url("https://example.com/ts.js"));
    }

    #[test]
    fn test_blocking_rejects_non_http() {
        let fetcher = HttpFetcher::new().unwrap();
        assert!(matches!(
            fetcher.fetch_blocking("ftp://example.com/a.js"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_size_limit() {
        let fetcher = HttpFetcher::with_max_size(10).unwrap();
        assert!(fetcher.check_length(Some(10)).is_ok());
        assert!(matches!(
            fetcher.check_length(Some(11)),
            Err(FetchError::ContentTooLarge { size: 11, max: 10 })
        ));
        assert!(fetcher.check_length(None).is_ok());
    }
}
