//! Charset handling. Page bodies are always decoded with the charset configured for the crawl;
//! whatever the server declares in Content-Type is ignored.

use encoding_rs::Encoding;

/// Resolve a charset label (`utf8`, `gbk`, `shift_jis`, `windows-1252`, ...) to an encoding.
pub fn resolve_charset(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

/// Decode raw bytes into UTF-8. Malformed sequences become U+FFFD; the second value reports
/// whether any replacement happened.
pub fn decode_body(bytes: &[u8], encoding: &'static Encoding) -> (String, bool) {
    let (text, _, had_errors) = encoding.decode(bytes);
    (text.into_owned(), had_errors)
}
