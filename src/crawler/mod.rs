//! The two-stage crawl: listing pages to a table of contents, then chapter pages to content.
//!
//! Both stages fetch through a [PageFetcher] under [run_bounded]. A failed fetch is logged and
//! recorded as a missing result for that item; an extraction error ends the crawl.

mod client;
pub(crate) mod decode;
mod error;
mod extract;
mod runner;

pub use client::{
    HttpFetcher, HttpFetcherBuilder, PageFetcher, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT,
};
pub use error::{CrawlError, ExtractError, FetchError};
pub use extract::{
    ContentFormat, ContentRule, Document, Extractor, FnExtractor, SelectorExtractor, TocRule,
};
pub use runner::{run_bounded, DEFAULT_CONCURRENCY};

use crate::model::{ContentState, TableOfContents, TocEntry};
use crate::progress::{Progress, ProgressSink};
use crate::request::CrawlRequest;

/// Stage 1: fetch every listing page and extract its entries. Entries keep listing-URL order.
///
/// A listing page that cannot be fetched contributes no entries. Fails when no listing page
/// yields any entry.
pub async fn crawl_toc(
    request: &CrawlRequest,
    fetcher: &dyn PageFetcher,
) -> Result<TableOfContents, CrawlError> {
    let extractor = request.extractor();
    let tasks = request
        .listing_urls()
        .iter()
        .map(|url| async move {
            match fetcher.fetch(url).await {
                Ok(text) => {
                    let doc = Document::parse(&text, url);
                    extractor
                        .extract_toc(&doc)
                        .inspect(|entries| {
                            tracing::debug!(url = %url, entries = entries.len(), "listing page parsed")
                        })
                        .map_err(|source| CrawlError::Extraction {
                            url: url.clone(),
                            source,
                        })
                }
                Err(e) => {
                    tracing::warn!("failed to fetch listing page: {}", e);
                    Ok(Vec::<TocEntry>::new())
                }
            }
        })
        .collect();

    let listings = run_bounded(tasks, request.concurrency(), None).await?;
    let toc = TableOfContents::from_listings(listings);
    if toc.is_empty() {
        return Err(CrawlError::EmptyTableOfContents {
            listings: request.listing_urls().len(),
        });
    }
    Ok(toc)
}

/// Stage 2: fetch every chapter page and fill in its content, reporting each settlement.
///
/// Each descriptor's content is set exactly once: fetched text, or missing on fetch failure.
pub async fn crawl_chapters(
    request: &CrawlRequest,
    fetcher: &dyn PageFetcher,
    toc: &mut TableOfContents,
    sink: &dyn ProgressSink,
) -> Result<(), CrawlError> {
    let extractor = request.extractor();
    let tasks = toc
        .chapters
        .iter()
        .map(|chapter| async move {
            match fetcher.fetch(&chapter.url).await {
                Ok(text) => {
                    let doc = Document::parse(&text, &chapter.url);
                    extractor
                        .extract_content(&doc, &chapter.title)
                        .map(ContentState::Fetched)
                        .map_err(|source| CrawlError::Extraction {
                            url: chapter.url.clone(),
                            source,
                        })
                }
                Err(e) => {
                    tracing::warn!("failed to fetch chapter {:?}: {}", chapter.title, e);
                    Ok(ContentState::Missing)
                }
            }
        })
        .collect();

    let mut progress = Progress::new(toc.len(), sink);
    let contents = run_bounded(tasks, request.concurrency(), Some(&mut progress)).await?;
    for (chapter, content) in toc.chapters.iter_mut().zip(contents) {
        chapter.content = content;
    }
    Ok(())
}

/// Run both stages. Stage 2 starts only after stage 1 finished for every listing URL.
pub async fn crawl(
    request: &CrawlRequest,
    fetcher: &dyn PageFetcher,
    sink: &dyn ProgressSink,
) -> Result<TableOfContents, CrawlError> {
    tracing::info!(listings = request.listing_urls().len(), "analyzing table of contents");
    let mut toc = crawl_toc(request, fetcher).await?;
    tracing::info!(chapters = toc.len(), "downloading chapters");
    crawl_chapters(request, fetcher, &mut toc, sink).await?;
    let missing = toc.missing_count();
    if missing > 0 {
        tracing::warn!(missing, total = toc.len(), "some chapters could not be fetched");
    }
    tracing::info!("done crawling");
    Ok(toc)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::EbookManifest;
    use crate::progress::tests::RecordingSink;
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::time::Duration;

    /// In-memory fetcher: url -> (latency ms, body). Unknown URLs fail.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pages: HashMap<String, (u64, String)>,
        pub requested: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        pub(crate) fn page(mut self, url: &str, latency_ms: u64, body: &str) -> Self {
            self.pages
                .insert(url.to_string(), (latency_ms, body.to_string()));
            self
        }
    }

    #[async_trait(?Send)]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.requested.borrow_mut().push(url.to_string());
            match self.pages.get(url) {
                Some((latency, body)) => {
                    tokio::time::sleep(Duration::from_millis(*latency)).await;
                    Ok(body.clone())
                }
                None => Err(FetchError::Unavailable {
                    url: url.to_string(),
                    reason: "not served".to_string(),
                }),
            }
        }

        async fn fetch_bytes(&self, url: &str) -> Result<(Vec<u8>, Option<String>), FetchError> {
            self.fetch(url).await.map(|s| (s.into_bytes(), None))
        }
    }

    /// Listing pages are `title|url|level` lines; chapter pages are returned verbatim,
    /// except the body `BOOM`, which raises an extraction error.
    pub(crate) fn line_extractor() -> FnExtractor<
        impl Fn(&Document) -> Result<Vec<TocEntry>, ExtractError>,
        impl Fn(&Document, &str) -> Result<String, ExtractError>,
    > {
        FnExtractor::new(
            |doc: &Document| {
                let text: String = doc.html().root_element().text().collect();
                Ok(text
                    .lines()
                    .filter_map(|line| {
                        let mut parts = line.trim().split('|');
                        let title = parts.next()?.to_string();
                        let url = parts.next()?.to_string();
                        let level = parts.next().and_then(|l| l.parse().ok()).unwrap_or(0);
                        Some(TocEntry { title, url, level })
                    })
                    .collect())
            },
            |doc: &Document, _title: &str| {
                let text: String = doc.html().root_element().text().collect();
                let text = text.trim().to_string();
                if text == "BOOM" {
                    return Err(ExtractError::Custom("boom".to_string()));
                }
                Ok(text)
            },
        )
    }

    fn request(urls: &[&str], concurrency: usize) -> CrawlRequest {
        CrawlRequest::builder()
            .title("Test Book")
            .listing_urls(urls.iter().copied())
            .extractor(line_extractor())
            .concurrency(concurrency)
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn failed_chapter_is_dropped_from_manifest() {
        let fetcher = FakeFetcher::default()
            .page("https://s.example/a", 1, "Ch1|https://s.example/x\nCh2|https://s.example/y")
            .page("https://s.example/x", 3, "text1");
        let req = request(&["https://s.example/a"], 50);
        let toc = crawl(&req, &fetcher, &NoProgress).await.unwrap();
        assert_eq!(toc.chapters[1].content, ContentState::Missing);

        let manifest = EbookManifest::from_toc(req.title(), None, None, &toc);
        assert_eq!(manifest.chapters.len(), 1);
        assert_eq!(manifest.chapters[0].title, "Ch1");
        assert_eq!(manifest.chapters[0].body, "text1");
    }

    #[tokio::test(start_paused = true)]
    async fn toc_follows_listing_order_despite_latency() {
        let fetcher = FakeFetcher::default()
            .page("https://s.example/p1", 40, "A|https://s.example/1\nB|https://s.example/2")
            .page("https://s.example/p2", 5, "C|https://s.example/3|1")
            .page("https://s.example/p3", 20, "D|https://s.example/4");
        let req = request(
            &["https://s.example/p1", "https://s.example/p2", "https://s.example/p3"],
            2,
        );
        let toc = crawl_toc(&req, &fetcher).await.unwrap();
        let titles: Vec<&str> = toc.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["A", "B", "C", "D"]);
        assert_eq!(toc.chapters[2].level, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_listing_contributes_nothing() {
        let fetcher = FakeFetcher::default()
            .page("https://s.example/p2", 1, "C|https://s.example/3");
        let req = request(&["https://s.example/p1", "https://s.example/p2"], 50);
        let toc = crawl_toc(&req, &fetcher).await.unwrap();
        assert_eq!(toc.len(), 1);
        assert_eq!(toc.chapters[0].title, "C");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_toc_is_fatal_and_skips_stage_two() {
        let fetcher = FakeFetcher::default().page("https://s.example/p1", 1, "nothing here");
        let req = request(&["https://s.example/p1", "https://s.example/p2"], 50);
        let err = crawl(&req, &fetcher, &NoProgress).await.unwrap_err();
        assert!(matches!(err, CrawlError::EmptyTableOfContents { listings: 2 }));
        assert_eq!(fetcher.requested.borrow().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn chapter_order_matches_toc_not_completion() {
        let latencies = [50, 10, 30, 5, 20];
        let listing: String = (0..5)
            .map(|i| format!("c{}|https://s.example/c{}\n", i, i))
            .collect();
        let mut fetcher = FakeFetcher::default().page("https://s.example/toc", 1, &listing);
        for (i, ms) in latencies.iter().enumerate() {
            fetcher = fetcher.page(&format!("https://s.example/c{}", i), *ms, &format!("r{}", i));
        }
        let req = request(&["https://s.example/toc"], 2);
        let sink = RecordingSink::default();
        let toc = crawl(&req, &fetcher, &sink).await.unwrap();
        let bodies: Vec<&str> = toc.retained().map(|(_, text)| text).collect();
        assert_eq!(bodies, ["r0", "r1", "r2", "r3", "r4"]);
        assert_eq!(
            *sink.updates.borrow(),
            vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn progress_counts_failures_too() {
        let fetcher = FakeFetcher::default()
            .page(
                "https://s.example/toc",
                1,
                "a|https://s.example/1\nb|https://s.example/gone\nc|https://s.example/3",
            )
            .page("https://s.example/1", 2, "one")
            .page("https://s.example/3", 1, "three");
        let req = request(&["https://s.example/toc"], 50);
        let sink = RecordingSink::default();
        let toc = crawl(&req, &fetcher, &sink).await.unwrap();
        assert_eq!(sink.updates.borrow().len(), 3);
        assert_eq!(*sink.finished.borrow(), 1);
        assert_eq!(toc.missing_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn extraction_error_ends_crawl() {
        let fetcher = FakeFetcher::default()
            .page("https://s.example/toc", 1, "a|https://s.example/1\nb|https://s.example/2")
            .page("https://s.example/1", 1, "fine")
            .page("https://s.example/2", 1, "BOOM");
        let req = request(&["https://s.example/toc"], 50);
        let err = crawl(&req, &fetcher, &NoProgress).await.unwrap_err();
        match err {
            CrawlError::Extraction { url, .. } => assert_eq!(url, "https://s.example/2"),
            other => panic!("expected extraction error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_crawls_produce_identical_manifests() {
        let fetcher = FakeFetcher::default()
            .page("https://s.example/toc", 1, "a|https://s.example/1\nb|https://s.example/2\nc|https://s.example/3")
            .page("https://s.example/1", 9, "one")
            .page("https://s.example/2", 1, "two")
            .page("https://s.example/3", 4, "three");
        let req = request(&["https://s.example/toc"], 2);
        let first = crawl(&req, &fetcher, &NoProgress).await.unwrap();
        let second = crawl(&req, &fetcher, &NoProgress).await.unwrap();
        assert_eq!(
            EbookManifest::from_toc(req.title(), None, None, &first),
            EbookManifest::from_toc(req.title(), None, None, &second)
        );
    }
}
