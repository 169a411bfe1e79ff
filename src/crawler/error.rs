//! Error types for the crawl pipeline. Only `FetchError` is recoverable; it is turned into a
//! missing entry by the stage that hit it. Everything reaching `CrawlError` ends the crawl.

use thiserror::Error;

/// Failure fetching one page. Logged and recorded as a missing result for that item only.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request timed out after {secs}s: {url}")]
    Timeout { url: String, secs: u64 },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Used by in-memory fetchers (tests, offline replays).
    #[error("Page unavailable: {url}: {reason}")]
    Unavailable { url: String, reason: String },
}

/// Raised by an extractor. Never recovered: the crawl stops.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("content element {selector:?} not found at {url}")]
    MissingElement { selector: String, url: String },

    #[error("{0}")]
    Custom(String),
}

/// Fatal crawl failure.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Extraction failed for {url}: {source}")]
    Extraction {
        url: String,
        #[source]
        source: ExtractError,
    },

    #[error("No chapters found on any listing page ({listings} listing URL(s) crawled).")]
    EmptyTableOfContents { listings: usize },
}
