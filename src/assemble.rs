//! Assembly: turn a completed table of contents into output files.
//!
//! Markdown export (when enabled) finishes before the EPUB writer starts. Write failures are
//! collected into the [AssemblyReport] rather than raised.

use crate::crawler::PageFetcher;
use crate::epub::{write_epub, CoverOutcome, EpubError};
use crate::markdown::{write_markdown, SummaryMeta, WriteError};
use crate::model::{EbookManifest, TableOfContents};
use crate::request::CrawlRequest;
use std::path::PathBuf;

/// What assembly produced and what failed.
#[derive(Debug)]
pub struct AssemblyReport {
    pub manifest: EbookManifest,
    pub epub_path: PathBuf,
    /// Outcome of the EPUB write.
    pub epub: Result<(), EpubError>,
    /// Markdown (and output directory) failures, one per failed write.
    pub write_errors: Vec<WriteError>,
}

impl AssemblyReport {
    pub fn is_success(&self) -> bool {
        self.epub.is_ok() && self.write_errors.is_empty()
    }
}

/// Download the cover image. A set but unreachable cover yields a title-only cover page.
pub async fn fetch_cover(fetcher: &dyn PageFetcher, cover_url: Option<&str>) -> CoverOutcome {
    let Some(url) = cover_url else {
        return CoverOutcome::NoCover;
    };
    match fetcher.fetch_bytes(url).await {
        Ok((data, content_type)) => CoverOutcome::image(data, content_type.as_deref()),
        Err(e) => {
            tracing::warn!("cover image could not be fetched, using title-only cover page: {}", e);
            CoverOutcome::TitleOnly
        }
    }
}

/// Write markdown files (if enabled) and then the EPUB for `toc`.
pub async fn assemble(
    request: &CrawlRequest,
    toc: &TableOfContents,
    fetcher: &dyn PageFetcher,
) -> AssemblyReport {
    let mut write_errors = Vec::new();
    if let Err(source) = tokio::fs::create_dir_all(request.output_dir()).await {
        write_errors.push(WriteError::CreateDir {
            path: request.output_dir().to_path_buf(),
            source,
        });
    }

    if request.emit_markdown() && write_errors.is_empty() {
        let meta = SummaryMeta {
            title: request.title(),
            author: request.author(),
            cover_url: request.cover_url(),
            front_matter: request.emit_front_matter(),
        };
        let summary_path = request.output_path("md");
        write_errors.extend(write_markdown(request.output_dir(), &summary_path, &meta, toc).await);
    }

    let manifest =
        EbookManifest::from_toc(request.title(), request.author(), request.cover_url(), toc);
    let cover = fetch_cover(fetcher, request.cover_url()).await;
    let epub_path = request.output_path("epub");

    tracing::info!(path = %epub_path.display(), chapters = manifest.chapters.len(), "creating .epub file");
    let job = {
        let manifest = manifest.clone();
        let path = epub_path.clone();
        let include_ncx = request.epub_ncx();
        tokio::task::spawn_blocking(move || write_epub(&manifest, &cover, &path, include_ncx))
    };
    let epub = match job.await {
        Ok(result) => result,
        Err(e) => Err(EpubError::Task(e.to_string())),
    };
    match &epub {
        Ok(()) => tracing::info!(path = %epub_path.display(), "done creating .epub file"),
        Err(e) => tracing::error!("failed to create .epub file: {}", e),
    }

    AssemblyReport {
        manifest,
        epub_path,
        epub,
        write_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::tests::{line_extractor, FakeFetcher};
    use crate::model::{ChapterDescriptor, ContentState};

    fn request(dir: &std::path::Path, markdown: bool) -> CrawlRequest {
        CrawlRequest::builder()
            .title("Test Book")
            .author("A. Author")
            .listing_url("https://s.example/toc")
            .extractor(line_extractor())
            .output_dir(dir.join("out"))
            .emit_markdown(markdown)
            .emit_front_matter(true)
            .build()
            .unwrap()
    }

    fn toc() -> TableOfContents {
        let chapter = |title: &str, content: ContentState| ChapterDescriptor {
            title: title.to_string(),
            url: format!("https://s.example/{}", title),
            level: 0,
            content,
        };
        TableOfContents {
            chapters: vec![
                chapter("Ch1", ContentState::Fetched("<p>text1</p>".into())),
                chapter("Ch2", ContentState::Missing),
                chapter("Ch3", ContentState::Fetched(String::new())),
            ],
        }
    }

    #[tokio::test]
    async fn writes_epub_and_markdown_for_retained_chapters() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path(), true);
        let report = assemble(&req, &toc(), &FakeFetcher::default()).await;

        assert!(report.is_success(), "{:?}", report);
        assert_eq!(report.manifest.chapters.len(), 1);
        assert_eq!(report.manifest.chapters[0].title, "Ch1");
        assert_eq!(report.epub_path, dir.path().join("out/Test Book.epub"));
        assert!(report.epub_path.exists());

        let summary = std::fs::read_to_string(dir.path().join("out/Test Book.md")).unwrap();
        assert!(summary.starts_with("---\nebook:\n  title: Test Book\n  authors: A. Author\n---\n"));
        assert!(summary.contains("* [Ch1](./contents/ch1.md)"));
        assert!(!summary.contains("Ch2"));
        assert!(dir.path().join("out/contents/ch1.md").exists());
    }

    #[tokio::test]
    async fn markdown_skipped_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path(), false);
        let report = assemble(&req, &toc(), &FakeFetcher::default()).await;
        assert!(report.epub.is_ok());
        assert!(!dir.path().join("out/Test Book.md").exists());
        assert!(!dir.path().join("out/contents").exists());
    }

    #[tokio::test]
    async fn epub_failure_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path(), false);
        let empty = TableOfContents {
            chapters: vec![ChapterDescriptor {
                title: "gone".into(),
                url: "https://s.example/gone".into(),
                level: 0,
                content: ContentState::Missing,
            }],
        };
        let report = assemble(&req, &empty, &FakeFetcher::default()).await;
        assert!(matches!(report.epub, Err(EpubError::NoChapters)));
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn unreachable_cover_falls_back_to_title_page() {
        let fetcher = FakeFetcher::default().page("https://s.example/cover.png", 0, "PNG");
        assert_eq!(
            fetch_cover(&fetcher, Some("https://s.example/nope.png")).await,
            CoverOutcome::TitleOnly
        );
        assert_eq!(fetch_cover(&fetcher, None).await, CoverOutcome::NoCover);
        assert_eq!(
            fetch_cover(&fetcher, Some("https://s.example/cover.png")).await,
            CoverOutcome::Image {
                data: b"PNG".to_vec(),
                ext: "png"
            }
        );
    }
}
