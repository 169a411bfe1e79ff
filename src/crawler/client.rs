//! HTTP fetching. One GET per page, fixed timeout, browser-like User-Agent, no retries.
//! Bodies are decoded with the crawl's configured charset.

use crate::crawler::decode::decode_body;
use crate::crawler::error::FetchError;
use async_trait::async_trait;
use encoding_rs::Encoding;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_12_0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/53.0.2785.143 Safari/537.36";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
const MAX_REDIRECTS: usize = 10;

/// Source of decoded pages. The crawl only ever talks to the network through this trait,
/// so tests and offline replays can substitute their own.
///
/// Futures are not required to be `Send`: the crawl is polled from a single task.
#[async_trait(?Send)]
pub trait PageFetcher {
    /// Fetch `url` and return its body decoded to UTF-8.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;

    /// Fetch `url` and return the raw body plus the declared Content-Type, if any.
    async fn fetch_bytes(&self, url: &str) -> Result<(Vec<u8>, Option<String>), FetchError>;
}

/// `reqwest`-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    inner: reqwest::Client,
    encoding: &'static Encoding,
    timeout_secs: u64,
}

impl HttpFetcher {
    /// Build a fetcher with default User-Agent and timeout decoding with `encoding`.
    pub fn new(encoding: &'static Encoding) -> Result<Self, reqwest::Error> {
        Self::builder(encoding).build()
    }

    pub fn builder(encoding: &'static Encoding) -> HttpFetcherBuilder {
        HttpFetcherBuilder {
            encoding,
            user_agent: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        tracing::debug!(url, "GET");
        let response = self.inner.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                FetchError::Network {
                    url: url.to_string(),
                    source: e,
                }
            }
        })?;
        // Anything other than a plain 200 counts as a failure, including 2xx variants.
        if response.status() != reqwest::StatusCode::OK {
            return Err(FetchError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn read_body(&self, url: &str, response: reqwest::Response) -> Result<Vec<u8>, FetchError> {
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                FetchError::BodyRead {
                    url: url.to_string(),
                    source: e,
                }
            }
        })?;
        Ok(bytes.to_vec())
    }
}

#[async_trait(?Send)]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get(url).await?;
        let bytes = self.read_body(url, response).await?;
        let (text, had_errors) = decode_body(&bytes, self.encoding);
        if had_errors {
            tracing::warn!(
                url,
                charset = self.encoding.name(),
                "body contained bytes invalid for the configured charset"
            );
        }
        Ok(text)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<(Vec<u8>, Option<String>), FetchError> {
        let response = self.get(url).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = self.read_body(url, response).await?;
        Ok((bytes, content_type))
    }
}

/// Builder for HttpFetcher with optional User-Agent and timeout.
#[derive(Debug)]
pub struct HttpFetcherBuilder {
    encoding: &'static Encoding,
    user_agent: Option<String>,
    timeout_secs: u64,
}

impl HttpFetcherBuilder {
    /// Set a custom User-Agent. If not set, a desktop Chrome string is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set request timeout in seconds. Default 20.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<HttpFetcher, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(HttpFetcher {
            inner,
            encoding: self.encoding,
            timeout_secs: self.timeout_secs,
        })
    }
}
