//! Extraction: the caller-supplied rules that turn a fetched page into TOC entries or chapter text.
//!
//! [Extractor] is the only extension point of the crawl. [FnExtractor] wraps a pair of closures;
//! [SelectorExtractor] is driven by CSS selectors (see `recipe.rs`) and backs the CLI.

use crate::crawler::error::ExtractError;
use crate::model::TocEntry;
use reqwest::Url;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Deserialize;

/// A fetched, decoded, parsed page. Extractors query it; they never see raw bytes.
pub struct Document {
    html: Html,
    url: Option<Url>,
}

impl Document {
    /// Parse `text` as an HTML document fetched from `url`.
    pub fn parse(text: &str, url: &str) -> Self {
        Self {
            html: Html::parse_document(text),
            url: Url::parse(url).ok(),
        }
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// All elements matching `selector`, in document order.
    pub fn select_all(&self, selector: &str) -> Result<Vec<ElementRef<'_>>, ExtractError> {
        let sel = parse_selector(selector)?;
        Ok(self.html.select(&sel).collect())
    }

    /// First element matching `selector`, if any.
    pub fn select_first(&self, selector: &str) -> Result<Option<ElementRef<'_>>, ExtractError> {
        let sel = parse_selector(selector)?;
        Ok(self.html.select(&sel).next())
    }

    /// Resolve `href` against the page URL. Returns `href` unchanged when either cannot be parsed.
    pub fn resolve(&self, href: &str) -> String {
        self.url
            .as_ref()
            .and_then(|base| base.join(href.trim()).ok())
            .map(|u| u.to_string())
            .unwrap_or_else(|| href.to_string())
    }
}

/// The two extraction callbacks of a crawl.
pub trait Extractor {
    /// Stage 1: entries listed on one listing page, in page order. May be empty.
    fn extract_toc(&self, doc: &Document) -> Result<Vec<TocEntry>, ExtractError>;

    /// Stage 2: chapter body for the chapter titled `title`. An empty string drops the chapter.
    fn extract_content(&self, doc: &Document, title: &str) -> Result<String, ExtractError>;
}

/// Extractor built from two closures.
pub struct FnExtractor<T, C> {
    toc: T,
    content: C,
}

impl<T, C> FnExtractor<T, C>
where
    T: Fn(&Document) -> Result<Vec<TocEntry>, ExtractError>,
    C: Fn(&Document, &str) -> Result<String, ExtractError>,
{
    pub fn new(toc: T, content: C) -> Self {
        Self { toc, content }
    }
}

impl<T, C> Extractor for FnExtractor<T, C>
where
    T: Fn(&Document) -> Result<Vec<TocEntry>, ExtractError>,
    C: Fn(&Document, &str) -> Result<String, ExtractError>,
{
    fn extract_toc(&self, doc: &Document) -> Result<Vec<TocEntry>, ExtractError> {
        (self.toc)(doc)
    }

    fn extract_content(&self, doc: &Document, title: &str) -> Result<String, ExtractError> {
        (self.content)(doc, title)
    }
}

/// One TOC rule: links matched by `selector` become entries at nesting depth `level`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TocRule {
    pub selector: String,
    #[serde(default)]
    pub level: u32,
}

/// How chapter content is rendered into the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    /// Inner HTML of the content element, as served.
    Html,
    /// Text of the content element re-wrapped as one `<p>` per non-empty line.
    #[default]
    Text,
}

/// Rules for the chapter body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContentRule {
    pub selector: String,
    #[serde(default)]
    pub format: ContentFormat,
    /// Drop a leading line (text) or heading (html) equal to the chapter title.
    #[serde(default)]
    pub strip_title: bool,
    /// Elements inside the content element to discard (ads, navigation, scripts).
    #[serde(default)]
    pub remove: Vec<String>,
    /// Treat a page without the content element as an extraction error instead of an empty chapter.
    #[serde(default)]
    pub required: bool,
}

/// CSS-selector driven extractor.
#[derive(Debug)]
pub struct SelectorExtractor {
    toc: Vec<(Selector, u32)>,
    toc_union: Selector,
    content: Selector,
    content_selector: String,
    remove: Vec<Selector>,
    format: ContentFormat,
    strip_title: bool,
    required: bool,
}

impl SelectorExtractor {
    /// Compile all selectors up front so a bad rule fails before any fetch.
    pub fn new(toc: &[TocRule], content: &ContentRule) -> Result<Self, ExtractError> {
        if toc.is_empty() {
            return Err(ExtractError::Custom(
                "at least one TOC rule is required".to_string(),
            ));
        }
        let compiled = toc
            .iter()
            .map(|r| Ok((parse_selector(&r.selector)?, r.level)))
            .collect::<Result<Vec<_>, ExtractError>>()?;
        let union_src = toc
            .iter()
            .map(|r| r.selector.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let remove = content
            .remove
            .iter()
            .map(|s| parse_selector(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            toc: compiled,
            toc_union: parse_selector(&union_src)?,
            content: parse_selector(&content.selector)?,
            content_selector: content.selector.clone(),
            remove,
            format: content.format,
            strip_title: content.strip_title,
            required: content.required,
        })
    }

    fn level_of(&self, el: &ElementRef<'_>) -> u32 {
        self.toc
            .iter()
            .find(|(sel, _)| sel.matches(el))
            .map(|(_, level)| *level)
            .unwrap_or(0)
    }

    fn render_html(&self, el: ElementRef<'_>, title: &str) -> String {
        let mut html = el.inner_html();
        for sel in &self.remove {
            for junk in el.select(sel) {
                html = html.replacen(&junk.html(), "", 1);
            }
        }
        if self.strip_title {
            if let Ok(headings) = parse_selector("h1, h2, h3, h4, h5, h6") {
                if let Some(h) = el
                    .select(&headings)
                    .find(|h| collapse_whitespace(&h.text().collect::<String>()) == title.trim())
                {
                    html = html.replacen(&h.html(), "", 1);
                }
            }
        }
        html.trim().to_string()
    }

    fn render_text(&self, el: ElementRef<'_>, title: &str) -> String {
        let mut raw = String::new();
        collect_text(el, &self.remove, &mut raw);
        let mut lines = raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .peekable();
        if self.strip_title && lines.peek().map(|l| *l == title.trim()).unwrap_or(false) {
            lines.next();
        }
        lines
            .map(|l| format!("<p>{}</p>", html_escape(l)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Extractor for SelectorExtractor {
    fn extract_toc(&self, doc: &Document) -> Result<Vec<TocEntry>, ExtractError> {
        let entries = doc
            .html()
            .select(&self.toc_union)
            .filter_map(|el| {
                let href = el.value().attr("href")?;
                let title = collapse_whitespace(&el.text().collect::<String>());
                Some(TocEntry {
                    title,
                    url: doc.resolve(href),
                    level: self.level_of(&el),
                })
            })
            .collect();
        Ok(entries)
    }

    fn extract_content(&self, doc: &Document, title: &str) -> Result<String, ExtractError> {
        let Some(el) = doc.html().select(&self.content).next() else {
            if self.required {
                return Err(ExtractError::MissingElement {
                    selector: self.content_selector.clone(),
                    url: doc.url().map(|u| u.to_string()).unwrap_or_default(),
                });
            }
            tracing::warn!(title, selector = %self.content_selector, "content element not found; chapter dropped");
            return Ok(String::new());
        };
        Ok(match self.format {
            ContentFormat::Html => self.render_html(el, title),
            ContentFormat::Text => self.render_text(el, title),
        })
    }
}

/// Parse a CSS selector or return an extraction error (avoids panics from Selector::parse).
fn parse_selector(sel: &str) -> Result<Selector, ExtractError> {
    Selector::parse(sel).map_err(|e| ExtractError::InvalidSelector {
        selector: sel.to_string(),
        reason: e.to_string(),
    })
}

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "li", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote",
    "pre", "tr",
];

/// Flatten element text, turning `<br>` and block boundaries into line breaks.
fn collect_text(el: ElementRef<'_>, remove: &[Selector], out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                if remove.iter().any(|s| s.matches(&child_el)) {
                    continue;
                }
                let name = e.name();
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                if matches!(name, "script" | "style") {
                    continue;
                }
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.push('\n');
                }
                collect_text(child_el, remove, out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
