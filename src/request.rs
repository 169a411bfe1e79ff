//! Crawl request: everything one crawl needs, validated before any network activity.

use crate::crawler::decode::resolve_charset;
use crate::crawler::{Extractor, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_SECS};
use encoding_rs::Encoding;
use reqwest::Url;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CHARSET: &str = "utf-8";

/// Invalid or missing request fields. Raised by [CrawlRequestBuilder::build].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Book title is not defined.")]
    MissingTitle,

    #[error("Extraction rules are not defined.")]
    MissingExtractor,

    #[error("No listing URL given.")]
    NoListingUrls,

    #[error("Invalid listing URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Unsupported charset: '{0}'.")]
    UnsupportedCharset(String),

    #[error("Concurrency must be at least 1.")]
    ZeroConcurrency,
}

/// A validated crawl request. Immutable once built.
pub struct CrawlRequest {
    listing_urls: Vec<String>,
    extractor: Box<dyn Extractor>,
    title: String,
    author: Option<String>,
    cover_url: Option<String>,
    output_dir: PathBuf,
    encoding: &'static Encoding,
    emit_markdown: bool,
    emit_front_matter: bool,
    epub_ncx: bool,
    concurrency: usize,
    timeout_secs: u64,
    user_agent: Option<String>,
}

impl fmt::Debug for CrawlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlRequest")
            .field("listing_urls", &self.listing_urls)
            .field("title", &self.title)
            .field("author", &self.author)
            .field("cover_url", &self.cover_url)
            .field("output_dir", &self.output_dir)
            .field("charset", &self.encoding.name())
            .field("emit_markdown", &self.emit_markdown)
            .field("emit_front_matter", &self.emit_front_matter)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl CrawlRequest {
    pub fn builder() -> CrawlRequestBuilder {
        CrawlRequestBuilder::default()
    }

    pub fn listing_urls(&self) -> &[String] {
        &self.listing_urls
    }

    pub fn extractor(&self) -> &dyn Extractor {
        self.extractor.as_ref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn cover_url(&self) -> Option<&str> {
        self.cover_url.as_deref()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Source encoding of every fetched page.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn emit_markdown(&self) -> bool {
        self.emit_markdown
    }

    pub fn emit_front_matter(&self) -> bool {
        self.emit_front_matter
    }

    pub fn epub_ncx(&self) -> bool {
        self.epub_ncx
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// `{output_dir}/{title}.{ext}`, with path separators in the title replaced.
    pub fn output_path(&self, ext: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", file_stem(&self.title), ext))
    }
}

/// Book title as a file stem: kept verbatim except for characters that would change the path.
fn file_stem(title: &str) -> String {
    let stem: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '-',
            c => c,
        })
        .collect();
    match stem.as_str() {
        "" | "." | ".." => "book".to_string(),
        _ => stem,
    }
}

/// Builder for [CrawlRequest]. Unset optional fields take their defaults.
#[derive(Default)]
pub struct CrawlRequestBuilder {
    listing_urls: Vec<String>,
    extractor: Option<Box<dyn Extractor>>,
    title: Option<String>,
    author: Option<String>,
    cover_url: Option<String>,
    output_dir: Option<PathBuf>,
    charset: Option<String>,
    emit_markdown: bool,
    emit_front_matter: bool,
    epub_ncx: bool,
    concurrency: Option<usize>,
    timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

impl CrawlRequestBuilder {
    /// Add one listing page. Order of calls is the order of the final TOC.
    pub fn listing_url(mut self, url: impl Into<String>) -> Self {
        self.listing_urls.push(url.into());
        self
    }

    pub fn listing_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.listing_urls.extend(urls.into_iter().map(Into::into));
        self
    }

    pub fn extractor(mut self, extractor: impl Extractor + 'static) -> Self {
        self.extractor = Some(Box::new(extractor));
        self
    }

    pub fn boxed_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn cover_url(mut self, cover: impl Into<String>) -> Self {
        self.cover_url = Some(cover.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn emit_markdown(mut self, yes: bool) -> Self {
        self.emit_markdown = yes;
        self
    }

    pub fn emit_front_matter(mut self, yes: bool) -> Self {
        self.emit_front_matter = yes;
        self
    }

    pub fn epub_ncx(mut self, yes: bool) -> Self {
        self.epub_ncx = yes;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = Some(n);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Validate and freeze. Fails on a missing title or extractor, no or unparsable listing URLs,
    /// an unknown charset label, or zero concurrency.
    pub fn build(self) -> Result<CrawlRequest, ConfigError> {
        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingTitle)?;
        let extractor = self.extractor.ok_or(ConfigError::MissingExtractor)?;
        if self.listing_urls.is_empty() {
            return Err(ConfigError::NoListingUrls);
        }
        for url in &self.listing_urls {
            Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
                input: url.clone(),
                reason: e.to_string(),
            })?;
        }
        let charset = self.charset.unwrap_or_else(|| DEFAULT_CHARSET.to_string());
        let encoding =
            resolve_charset(&charset).ok_or(ConfigError::UnsupportedCharset(charset))?;
        let concurrency = self.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(CrawlRequest {
            listing_urls: self.listing_urls,
            extractor,
            title,
            author: self.author.filter(|a| !a.trim().is_empty()),
            cover_url: self.cover_url.filter(|c| !c.trim().is_empty()),
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from(".")),
            encoding,
            emit_markdown: self.emit_markdown,
            emit_front_matter: self.emit_front_matter,
            epub_ncx: self.epub_ncx,
            concurrency,
            timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            user_agent: self.user_agent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{Document, ExtractError, FnExtractor};
    use crate::model::TocEntry;

    fn noop_extractor(
    ) -> FnExtractor<
        impl Fn(&Document) -> Result<Vec<TocEntry>, ExtractError>,
        impl Fn(&Document, &str) -> Result<String, ExtractError>,
    > {
        FnExtractor::new(
            |_: &Document| Ok(Vec::new()),
            |_: &Document, _: &str| Ok(String::new()),
        )
    }

    fn base() -> CrawlRequestBuilder {
        CrawlRequest::builder()
            .title("A Book")
            .listing_url("https://novels.example/book/")
            .extractor(noop_extractor())
    }

    #[test]
    fn build_applies_defaults() {
        let req = base().build().unwrap();
        assert_eq!(req.output_dir(), Path::new("."));
        assert_eq!(req.encoding(), encoding_rs::UTF_8);
        assert_eq!(req.concurrency(), 50);
        assert_eq!(req.timeout_secs(), 20);
        assert!(!req.emit_markdown());
        assert!(!req.emit_front_matter());
        assert!(req.author().is_none());
        assert!(req.cover_url().is_none());
    }

    #[test]
    fn missing_title_rejected() {
        let err = CrawlRequest::builder()
            .listing_url("https://novels.example/")
            .extractor(noop_extractor())
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingTitle);

        let err = base().title("   ").build().unwrap_err();
        assert_eq!(err, ConfigError::MissingTitle);
    }

    #[test]
    fn missing_extractor_rejected() {
        let err = CrawlRequest::builder()
            .title("A Book")
            .listing_url("https://novels.example/")
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingExtractor);
    }

    #[test]
    fn listing_urls_required_and_validated() {
        let err = CrawlRequest::builder()
            .title("A Book")
            .extractor(noop_extractor())
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::NoListingUrls);

        let err = base().listing_url("not a url").build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { input, .. } if input == "not a url"));
    }

    #[test]
    fn unknown_charset_and_zero_concurrency_rejected() {
        assert_eq!(
            base().charset("martian").build().unwrap_err(),
            ConfigError::UnsupportedCharset("martian".into())
        );
        assert_eq!(
            base().concurrency(0).build().unwrap_err(),
            ConfigError::ZeroConcurrency
        );
    }

    #[test]
    fn listing_order_is_call_order() {
        let req = base()
            .listing_urls(["https://novels.example/p2", "https://novels.example/p3"])
            .build()
            .unwrap();
        assert_eq!(
            req.listing_urls(),
            [
                "https://novels.example/book/",
                "https://novels.example/p2",
                "https://novels.example/p3"
            ]
        );
    }

    #[test]
    fn output_path_uses_title_verbatim_minus_separators() {
        let req = base()
            .title("Journey/West 西游记")
            .output_dir("out")
            .build()
            .unwrap();
        assert_eq!(req.output_path("epub"), PathBuf::from("out/Journey-West 西游记.epub"));
    }
}
