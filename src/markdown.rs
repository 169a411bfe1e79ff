//! Markdown export: one file per chapter under `contents/` plus a summary index with optional
//! front matter.
//!
//! Writes are issued concurrently and every failure is collected; none aborts the others.

use crate::model::TableOfContents;
use futures::future::join_all;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONTENTS_DIR: &str = "contents";

/// Failure writing one markdown artifact.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Book-level fields shown in the summary.
#[derive(Debug, Clone, Copy)]
pub struct SummaryMeta<'a> {
    pub title: &'a str,
    pub author: Option<&'a str>,
    pub cover_url: Option<&'a str>,
    pub front_matter: bool,
}

/// One summary line: nesting level, chapter title, file slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    pub level: u32,
    pub title: String,
    pub slug: String,
}

/// URL-safe slug: lowercase letters and digits (any script), `-` and `_` kept, whitespace runs
/// become a single `-`, everything else dropped.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.trim().chars() {
        if c.is_whitespace() {
            pending_dash = true;
            continue;
        }
        if c.is_alphanumeric() || c == '-' || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        }
    }
    slug
}

/// Slugs for retained chapters, made unique with `-2`, `-3`, ... suffixes in TOC order. A
/// suffixed slug never collides with a slug already handed out.
pub fn summary_entries(toc: &TableOfContents) -> Vec<SummaryEntry> {
    let mut taken: HashSet<String> = HashSet::new();
    toc.retained()
        .map(|(chapter, _)| {
            let mut base = slugify(&chapter.title);
            if base.is_empty() {
                base = "chapter".to_string();
            }
            let mut slug = base.clone();
            let mut n = 1;
            while taken.contains(&slug) {
                n += 1;
                slug = format!("{}-{}", base, n);
            }
            taken.insert(slug.clone());
            SummaryEntry {
                level: chapter.level,
                title: chapter.title.clone(),
                slug,
            }
        })
        .collect()
}

/// Render the summary index.
pub fn summary_document(meta: &SummaryMeta<'_>, entries: &[SummaryEntry]) -> String {
    let mut out = String::new();
    if meta.front_matter {
        out.push_str("---\nebook:\n");
        out.push_str(&format!("  title: {}\n", meta.title));
        if let Some(cover) = meta.cover_url {
            out.push_str(&format!("  cover: {}\n", cover));
        }
        if let Some(author) = meta.author {
            out.push_str(&format!("  authors: {}\n", author));
        }
        out.push_str("---\n\n");
    }
    out.push_str(&format!("# {}\n\n", meta.title));
    for entry in entries {
        out.push_str(&" ".repeat(entry.level as usize * 2));
        out.push_str(&format!(
            "* [{}](./{}/{}.md)\n",
            entry.title, CONTENTS_DIR, entry.slug
        ));
    }
    out
}

async fn write_file(path: PathBuf, contents: String) -> Result<(), WriteError> {
    tokio::fs::write(&path, contents)
        .await
        .map_err(|source| WriteError::File { path, source })
}

async fn ensure_dir(path: &Path) -> Result<(), WriteError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| WriteError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

/// Write `contents/{slug}.md` for every retained chapter and the summary at `summary_path`.
/// Returns every failure; an empty vector means everything was written.
pub async fn write_markdown(
    output_dir: &Path,
    summary_path: &Path,
    meta: &SummaryMeta<'_>,
    toc: &TableOfContents,
) -> Vec<WriteError> {
    let contents_dir = output_dir.join(CONTENTS_DIR);
    if let Err(e) = ensure_dir(&contents_dir).await {
        return vec![e];
    }

    let entries = summary_entries(toc);
    let mut writes: Vec<_> = toc
        .retained()
        .zip(&entries)
        .map(|((_, body), entry)| {
            let path = contents_dir.join(format!("{}.md", entry.slug));
            write_file(path, html2md::parse_html(body))
        })
        .collect();
    writes.push(write_file(
        summary_path.to_path_buf(),
        summary_document(meta, &entries),
    ));

    let errors: Vec<WriteError> = join_all(writes)
        .await
        .into_iter()
        .filter_map(Result::err)
        .collect();
    for e in &errors {
        tracing::error!("{}", e);
    }
    tracing::info!(
        chapters = entries.len(),
        failed = errors.len(),
        "markdown files written"
    );
    errors
}
