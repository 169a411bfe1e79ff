//! Data model for a crawl: table-of-contents entries, their fetched content, and the
//! manifest handed to the EPUB writer.
//!
//! The table of contents is built once by stage 1, each descriptor's content is set
//! exactly once by stage 2, and the manifest is derived after both stages finish.

use serde::{Deserialize, Serialize};

/// One entry returned by a TOC extractor: chapter title, absolute chapter URL, and nesting depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub level: u32,
}

impl TocEntry {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            level: 0,
        }
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }
}

/// Content of a chapter as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum ContentState {
    /// Stage 2 has not settled for this chapter yet.
    #[default]
    Pending,
    /// The chapter page could not be fetched.
    Missing,
    Fetched(String),
}

impl ContentState {
    pub fn text(&self) -> Option<&str> {
        match self {
            ContentState::Fetched(s) => Some(s),
            _ => None,
        }
    }
}

/// A TOC entry plus its (eventually fetched) content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterDescriptor {
    pub title: String,
    pub url: String,
    pub level: u32,
    pub content: ContentState,
}

impl From<TocEntry> for ChapterDescriptor {
    fn from(entry: TocEntry) -> Self {
        Self {
            title: entry.title,
            url: entry.url,
            level: entry.level,
            content: ContentState::Pending,
        }
    }
}

/// Chapters in listing order: per-listing results concatenated in listing-URL input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableOfContents {
    pub chapters: Vec<ChapterDescriptor>,
}

impl TableOfContents {
    /// Flatten per-listing entry lists, keeping listing order then in-page order.
    pub fn from_listings(listings: Vec<Vec<TocEntry>>) -> Self {
        let chapters = listings
            .into_iter()
            .flatten()
            .map(ChapterDescriptor::from)
            .collect();
        Self { chapters }
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// Chapters with non-empty fetched content, in TOC order.
    pub fn retained(&self) -> impl Iterator<Item = (&ChapterDescriptor, &str)> {
        self.chapters.iter().filter_map(|c| {
            c.content
                .text()
                .filter(|text| !text.is_empty())
                .map(|text| (c, text))
        })
    }

    /// Number of chapters whose fetch failed.
    pub fn missing_count(&self) -> usize {
        self.chapters
            .iter()
            .filter(|c| c.content == ContentState::Missing)
            .count()
    }
}

/// One chapter of the packaged book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestChapter {
    pub title: String,
    /// Minimal HTML (or plain text) as returned by the content extractor.
    pub body: String,
}

/// Input to the EPUB writer, derived from the completed table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EbookManifest {
    pub title: String,
    pub author: Option<String>,
    pub cover_url: Option<String>,
    pub chapters: Vec<ManifestChapter>,
}

impl EbookManifest {
    /// Build from the TOC, dropping chapters without content and keeping TOC order.
    pub fn from_toc(
        title: &str,
        author: Option<&str>,
        cover_url: Option<&str>,
        toc: &TableOfContents,
    ) -> Self {
        let chapters = toc
            .retained()
            .map(|(c, text)| ManifestChapter {
                title: c.title.clone(),
                body: text.to_string(),
            })
            .collect();
        Self {
            title: title.to_string(),
            author: author.map(String::from),
            cover_url: cover_url.map(String::from),
            chapters,
        }
    }
}
