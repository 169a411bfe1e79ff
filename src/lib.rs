//! serialscrape: concurrent crawler for web-serialized fiction. Recipes describe where the
//! table of contents and chapter text live; output is EPUB, optionally with Markdown.

pub mod assemble;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod epub;
pub mod logging;
pub mod markdown;
pub mod model;
pub mod progress;
pub mod recipe;
pub mod request;

// Re-exports for CLI and consumers.
pub use assemble::{assemble, AssemblyReport};
pub use crawler::{
    crawl, crawl_chapters, crawl_toc, run_bounded, CrawlError, Document, ExtractError, Extractor,
    FetchError, FnExtractor, HttpFetcher, PageFetcher, SelectorExtractor,
};
pub use epub::{write_epub, CoverOutcome, EpubError};
pub use model::{ChapterDescriptor, ContentState, EbookManifest, TableOfContents, TocEntry};
pub use progress::{ConsoleProgress, NoProgress, ProgressSink};
pub use recipe::{load_recipe, Recipe};
pub use request::{ConfigError, CrawlRequest, CrawlRequestBuilder};
