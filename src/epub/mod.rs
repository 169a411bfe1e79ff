//! EPUB writer. Consumes an [EbookManifest] and writes EPUB 3 (mimetype, container, OPF, nav,
//! optional NCX, cover page, one XHTML file per chapter).

use crate::model::EbookManifest;
use scraper::{ElementRef, Html, Node};
use std::io::{Seek, Write};
use std::path::Path;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const CONTAINER_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>";

const MIMETYPE: &[u8] = b"application/epub+zip";
const OEBPS_PREFIX: &str = "OEBPS/";
/// Creator used when the book has no author.
pub const ANONYMOUS_AUTHOR: &str = "anonymous";

/// Errors from the EPUB writer.
#[derive(Debug, Error)]
pub enum EpubError {
    #[error("Cannot write EPUB: book title is empty.")]
    EmptyTitle,

    #[error("Cannot write EPUB: no chapter has content.")]
    NoChapters,

    #[error("Failed to create EPUB file: {path}: {source}")]
    CreateFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write EPUB archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("EPUB writer task failed: {0}")]
    Task(String),
}

impl From<std::io::Error> for EpubError {
    fn from(e: std::io::Error) -> Self {
        EpubError::Zip(zip::result::ZipError::Io(e))
    }
}

/// Cover page content: none, title-only (cover URL set but download failed), or an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverOutcome {
    NoCover,
    TitleOnly,
    Image { data: Vec<u8>, ext: &'static str },
}

impl CoverOutcome {
    /// Pick the image extension from a Content-Type header (jpeg/gif, otherwise png).
    pub fn image(data: Vec<u8>, content_type: Option<&str>) -> Self {
        let ext = match content_type {
            Some(ct) if ct.contains("jpeg") || ct.contains("jpg") => "jpg",
            Some(ct) if ct.contains("gif") => "gif",
            _ => "png",
        };
        CoverOutcome::Image { data, ext }
    }
}

/// Write `manifest` to an EPUB file at `path`.
///
/// Set `include_ncx` to add toc.ncx for readers that predate EPUB 3 navigation documents.
pub fn write_epub(
    manifest: &EbookManifest,
    cover: &CoverOutcome,
    path: &Path,
    include_ncx: bool,
) -> Result<(), EpubError> {
    validate_manifest(manifest)?;

    let path = path.to_path_buf();
    let file = std::fs::File::create(&path).map_err(|e| EpubError::CreateFile {
        path: path.clone(),
        source: e,
    })?;
    let mut zip = ZipWriter::new(file);

    let options_stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    let options_deflate = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    // Mimetype first, uncompressed.
    zip.start_file("mimetype", options_stored)?;
    zip.write_all(MIMETYPE)?;

    zip.start_file("META-INF/container.xml", options_deflate)?;
    zip.write_all(CONTAINER_XML)?;

    write_opf(manifest, cover, include_ncx, &mut zip, options_deflate)?;
    write_nav_xhtml(manifest, &mut zip, options_deflate)?;
    if include_ncx {
        write_ncx(manifest, &mut zip, options_deflate)?;
    }
    write_cover_xhtml(manifest, cover, &mut zip, options_deflate)?;
    write_chapters(manifest, &mut zip, options_deflate)?;

    if let CoverOutcome::Image { data, ext } = cover {
        let name = format!("{}images/cover.{}", OEBPS_PREFIX, ext);
        zip.start_file(name, options_deflate)?;
        zip.write_all(data)?;
    }

    zip.finish()?;
    Ok(())
}

fn validate_manifest(manifest: &EbookManifest) -> Result<(), EpubError> {
    if manifest.title.trim().is_empty() {
        return Err(EpubError::EmptyTitle);
    }
    if manifest.chapters.is_empty() {
        return Err(EpubError::NoChapters);
    }
    Ok(())
}

fn creator(manifest: &EbookManifest) -> &str {
    manifest.author.as_deref().unwrap_or(ANONYMOUS_AUTHOR)
}

fn identifier(manifest: &EbookManifest) -> String {
    format!("urn:serialscrape:{}", manifest.title)
}

fn write_opf(
    manifest: &EbookManifest,
    cover: &CoverOutcome,
    include_ncx: bool,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut items = String::from(
        r#"    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
"#,
    );
    if include_ncx {
        items.push_str(
            r#"    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
"#,
        );
    }
    let has_cover_page = *cover != CoverOutcome::NoCover;
    let mut cover_meta = String::new();
    if let CoverOutcome::Image { ext, .. } = cover {
        items.push_str(&format!(
            r#"    <item id="cover-img" href="images/cover.{}" media-type="{}" properties="cover-image"/>
"#,
            ext,
            cover_media_type(ext)
        ));
        cover_meta.push_str(r#"    <meta name="cover" content="cover-img"/>"#);
    }
    if has_cover_page {
        items.push_str(
            r#"    <item id="cover" href="cover.xhtml" media-type="application/xhtml+xml"/>
"#,
        );
    }
    for i in 1..=manifest.chapters.len() {
        items.push_str(&format!(
            r#"    <item id="chapter-{i}" href="chapter-{i}.xhtml" media-type="application/xhtml+xml"/>
"#
        ));
    }

    // Reading order: cover page, then chapters. The nav document is not in the spine.
    let mut spine = Vec::with_capacity(manifest.chapters.len() + 1);
    if has_cover_page {
        spine.push(r#"    <itemref idref="cover"/>"#.to_string());
    }
    for i in 1..=manifest.chapters.len() {
        spine.push(format!(r#"    <itemref idref="chapter-{i}"/>"#));
    }

    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="book-id" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">{id}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>{creator}</dc:creator>
    <dc:language>en</dc:language>
{cover_meta}
  </metadata>
  <manifest>
{items}  </manifest>
  <spine{toc_attr}>
{spine}
  </spine>
</package>
"#,
        id = xml_escape(&identifier(manifest)),
        title = xml_escape(&manifest.title),
        creator = xml_escape(creator(manifest)),
        cover_meta = cover_meta,
        items = items,
        toc_attr = if include_ncx { r#" toc="ncx""# } else { "" },
        spine = spine.join("\n"),
    );

    zip.start_file(format!("{}content.opf", OEBPS_PREFIX), options)?;
    zip.write_all(opf.as_bytes())?;
    Ok(())
}

fn cover_media_type(ext: &str) -> &'static str {
    match ext {
        "jpg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "image/png",
    }
}

fn write_nav_xhtml(
    manifest: &EbookManifest,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let links: String = manifest
        .chapters
        .iter()
        .enumerate()
        .map(|(i, ch)| {
            format!(
                "      <li><a href=\"chapter-{}.xhtml\">{}</a></li>\n",
                i + 1,
                xml_escape(&ch.title)
            )
        })
        .collect();
    let nav = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
</head>
<body>
  <nav epub:type="toc">
    <h1>{title}</h1>
    <ol>
{links}    </ol>
  </nav>
</body>
</html>
"#,
        title = xml_escape(&manifest.title),
        links = links
    );
    zip.start_file(format!("{}nav.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(nav.as_bytes())?;
    Ok(())
}

fn write_ncx(
    manifest: &EbookManifest,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let nav_points: String = manifest
        .chapters
        .iter()
        .enumerate()
        .map(|(i, ch)| {
            let n = i + 1;
            format!(
                r#"    <navPoint id="navpoint-{n}" playOrder="{n}">
      <navLabel><text>{label}</text></navLabel>
      <content src="chapter-{n}.xhtml"/>
    </navPoint>
"#,
                n = n,
                label = xml_escape(&ch.title)
            )
        })
        .collect();
    let ncx = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{uid}"/>
  </head>
  <docTitle>
    <text>{title}</text>
  </docTitle>
  <navMap>
{nav_points}  </navMap>
</ncx>
"#,
        uid = xml_escape(&identifier(manifest)),
        title = xml_escape(&manifest.title),
        nav_points = nav_points
    );
    zip.start_file(format!("{}toc.ncx", OEBPS_PREFIX), options)?;
    zip.write_all(ncx.as_bytes())?;
    Ok(())
}

fn write_cover_xhtml(
    manifest: &EbookManifest,
    cover: &CoverOutcome,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let body = match cover {
        CoverOutcome::NoCover => return Ok(()),
        CoverOutcome::TitleOnly => format!(
            "<section epub:type=\"cover\">\n  <h1>{}</h1>\n  <p>{}</p>\n</section>",
            xml_escape(&manifest.title),
            xml_escape(creator(manifest))
        ),
        CoverOutcome::Image { ext, .. } => format!(
            "<section epub:type=\"cover\">\n  <img src=\"images/cover.{}\" alt=\"{}\"/>\n</section>",
            ext,
            xml_escape(&manifest.title)
        ),
    };
    let page = xhtml_page("Cover", &body);
    zip.start_file(format!("{}cover.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(page.as_bytes())?;
    Ok(())
}

fn write_chapters(
    manifest: &EbookManifest,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    for (i, ch) in manifest.chapters.iter().enumerate() {
        let title = xml_escape(&ch.title);
        let body = format!("<h1>{}</h1>\n{}", title, to_xhtml(&ch.body));
        let page = xhtml_page(&title, &body);
        zip.start_file(format!("{}chapter-{}.xhtml", OEBPS_PREFIX, i + 1), options)?;
        zip.write_all(page.as_bytes())?;
    }
    Ok(())
}

fn xhtml_page(escaped_title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <meta charset="UTF-8"/>
  <title>{}</title>
</head>
<body>
{}
</body>
</html>
"#,
        escaped_title, body
    )
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Re-serialize an HTML fragment as XHTML: void elements self-closed, text and attributes
/// escaped, comments dropped.
fn to_xhtml(body: &str) -> String {
    let fragment = Html::parse_fragment(body);
    let mut out = String::with_capacity(body.len());
    write_xhtml_children(fragment.root_element(), &mut out);
    out
}

fn write_xhtml_children(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push_str(&xml_escape(t)),
            Node::Element(e) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = e.name();
                out.push('<');
                out.push_str(name);
                for (key, value) in e.attrs() {
                    out.push_str(&format!(" {}=\"{}\"", key, xml_escape(value)));
                }
                if VOID_ELEMENTS.contains(&name) {
                    out.push_str("/>");
                    continue;
                }
                out.push('>');
                write_xhtml_children(child_el, out);
                out.push_str(&format!("</{}>", name));
            }
            _ => {}
        }
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
