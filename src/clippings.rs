//! `My Clippings.txt` parser.
//!
//! Each entry is a block terminated by a line of ten `=`:
//!
//! ```text
//! Thinking in Systems (Donella Meadows)
//! - Your Highlight on Page 12-13 | Added on Monday, January 15, 2024 10:30:45 AM
//!
//! A system is more than the sum of its parts.
//! ==========
//! ```
//!
//! Blocks that do not parse are skipped and reported as
//! [`ParseWarning::MalformedClipping`]; the run carries on.

use std::path::Path;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AnnotatorError, ParseWarning};

pub const SEPARATOR: &str = "==========";

static RE_TITLE_AUTHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s*\(([^)]+)\)$").unwrap());

static RE_META: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)- Your (\w+) on (Location|Page) (\d+(?:-\d+)?)(?: \| Added on (.+))?")
        .unwrap()
});

/// "Added on" formats seen on different firmware versions and locales.
const DATE_FORMATS: [&str; 5] = [
    "%A, %B %d, %Y %I:%M:%S %p",
    "%A, %B %d, %Y at %I:%M:%S %p",
    "%B %d, %Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M:%S %p",
    "%Y-%m-%d %H:%M:%S",
];

const EXTENSION_MARKERS: [&str; 6] = [".pdf", ".azw3", ".azw", ".mobi", ".kfx", ".epub"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClippingKind {
    Highlight,
    Note,
    Bookmark,
}

impl ClippingKind {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "highlight" => Some(ClippingKind::Highlight),
            "note" => Some(ClippingKind::Note),
            "bookmark" => Some(ClippingKind::Bookmark),
            _ => None,
        }
    }
}

/// One entry of the clippings log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clipping {
    pub book_title: String,
    pub author: Option<String>,
    pub kind: ClippingKind,
    /// Printed page number, first of a range. `None` for location-based entries.
    pub page_1based: Option<u32>,
    /// Reflowable-book location, first of a range.
    pub location: Option<u32>,
    pub content: String,
    pub added_on: Option<NaiveDateTime>,
    /// The "Added on" text as written, kept when it did not parse too.
    pub added_on_raw: Option<String>,
}

/// Decode a clippings file: UTF-8 (BOM stripped), otherwise Latin-1.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            debug!("Clippings are not UTF-8, decoding as Latin-1");
            bytes.iter().map(|&b| char::from(b)).collect()
        }
    }
}

/// Reduce a book identifier to the part that appears in clipping titles.
///
/// `"My_Thesis.pdf-cdeKey_ABC123"` becomes `"My_Thesis"`.
pub fn normalize_book_id(book: &str) -> String {
    let mut id = book;
    if let Some(idx) = id.find("-cdeKey_") {
        id = &id[..idx];
    }
    let lower = id.to_ascii_lowercase();
    if let Some(idx) = EXTENSION_MARKERS
        .iter()
        .filter_map(|ext| lower.find(ext))
        .min()
    {
        id = &id[..idx];
    }
    id.trim().to_string()
}

/// Case-insensitive containment of the normalized book id in `title`.
pub fn matches_book(title: &str, book: &str) -> bool {
    let id = normalize_book_id(book).to_lowercase();
    id.is_empty() || title.to_lowercase().contains(&id)
}

/// Parse clippings text, keeping only entries for `book` when given.
pub fn parse_clippings(text: &str, book: Option<&str>) -> (Vec<Clipping>, Vec<ParseWarning>) {
    let mut clippings = Vec::new();
    let mut warnings = Vec::new();
    let mut other_books = 0usize;

    for (index, block) in blocks(text).iter().enumerate() {
        let block = block.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
        if block.is_empty() {
            continue;
        }
        match parse_block(block) {
            Ok(clipping) => {
                if book.is_some_and(|b| !matches_book(&clipping.book_title, b)) {
                    other_books += 1;
                    continue;
                }
                clippings.push(clipping);
            }
            Err(reason) => {
                warn!("Skipping clipping block {}: {}", index, reason);
                warnings.push(ParseWarning::MalformedClipping { index, reason });
            }
        }
    }

    debug!(
        "Parsed {} clippings ({} for other books, {} malformed)",
        clippings.len(),
        other_books,
        warnings.len()
    );
    (clippings, warnings)
}

/// Split on separator lines. A run of `=` inside highlighted text is content.
fn blocks(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}') == SEPARATOR {
            out.push(current.join("\n"));
            current.clear();
        } else {
            current.push(line);
        }
    }
    out.push(current.join("\n"));
    out
}

/// Read and parse a clippings file.
pub fn parse_clippings_file(
    path: impl AsRef<Path>,
    book: Option<&str>,
) -> Result<(Vec<Clipping>, Vec<ParseWarning>), AnnotatorError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| AnnotatorError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Reading clippings from {}", path.display());
    Ok(parse_clippings(&decode_text(&bytes), book))
}

fn parse_block(block: &str) -> Result<Clipping, String> {
    let lines: Vec<&str> = block.lines().collect();
    if lines.len() < 2 {
        return Err("missing metadata line".into());
    }

    let title_line = lines[0].trim().trim_start_matches('\u{feff}');
    let (book_title, author) = match RE_TITLE_AUTHOR.captures(title_line) {
        Some(caps) => (caps[1].trim().to_string(), Some(caps[2].trim().to_string())),
        None => (title_line.to_string(), None),
    };

    let meta = lines[1].trim();
    let caps = RE_META
        .captures(meta)
        .ok_or_else(|| format!("unrecognised metadata line '{meta}'"))?;
    let kind = ClippingKind::parse(&caps[1])
        .ok_or_else(|| format!("unsupported clipping kind '{}'", &caps[1]))?;
    let first: u32 = caps[3]
        .split('-')
        .next()
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| format!("bad page or location '{}'", &caps[3]))?;
    let (page_1based, location) = if caps[2].eq_ignore_ascii_case("page") {
        (Some(first), None)
    } else {
        (None, Some(first))
    };

    let added_on_raw = caps.get(4).map(|m| m.as_str().trim().to_string());
    let added_on = added_on_raw.as_deref().and_then(parse_date);

    let content = lines[2..]
        .iter()
        .map(|l| l.trim())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    Ok(Clipping {
        book_title,
        author,
        kind,
        page_1based,
        location,
        content,
        added_on,
        added_on_raw,
    })
}

fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const SAMPLE: &str = "\u{feff}Thinking in Systems (Donella Meadows)
- Your Highlight on Page 12-13 | Added on Monday, January 15, 2024 10:30:45 AM

A system is more than
the sum of its parts.
==========
Thinking in Systems (Donella Meadows)
- Your Note on page 12 | Added on Monday, January 15, 2024 10:31:02 AM

check the stock/flow diagram
==========
Another Book (Someone Else)
- Your Highlight on Location 140-141 | Added on Tuesday, January 16, 2024 09:00:00 PM

unrelated text
==========
Thinking in Systems (Donella Meadows)
- Your Bookmark on Page 40 | Added on 2024-01-17 08:15:00

==========
";

    #[test]
    fn parses_all_blocks_in_order() {
        let (clippings, warnings) = parse_clippings(SAMPLE, None);
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(clippings.len(), 4);
        let first = &clippings[0];
        assert_eq!(first.book_title, "Thinking in Systems");
        assert_eq!(first.author.as_deref(), Some("Donella Meadows"));
        assert_eq!(first.kind, ClippingKind::Highlight);
        assert_eq!(first.page_1based, Some(12));
        assert_eq!(first.content, "A system is more than\nthe sum of its parts.");
        assert_eq!(clippings[1].kind, ClippingKind::Note);
        assert_eq!(clippings[2].location, Some(140));
        assert_eq!(clippings[2].page_1based, None);
        assert_eq!(clippings[3].kind, ClippingKind::Bookmark);
        assert_eq!(clippings[3].content, "");
    }

    #[test]
    fn dates_parse_in_several_formats() {
        let (clippings, _) = parse_clippings(SAMPLE, None);
        let d = clippings[0].added_on.unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2024, 1, 15));
        assert_eq!((d.hour(), d.minute(), d.second()), (10, 30, 45));
        let pm = clippings[2].added_on.unwrap();
        assert_eq!(pm.hour(), 21);
        let iso = clippings[3].added_on.unwrap();
        assert_eq!(iso.day(), 17);
    }

    #[test]
    fn unparsed_date_keeps_raw_text() {
        let text = "Book (A)\n- Your Highlight on Page 3 | Added on lundi 15 janvier 2024\n\nx\n==========";
        let (clippings, _) = parse_clippings(text, None);
        assert_eq!(clippings[0].added_on, None);
        assert_eq!(
            clippings[0].added_on_raw.as_deref(),
            Some("lundi 15 janvier 2024")
        );
    }

    #[test]
    fn book_filter_strips_vendor_suffix() {
        let (clippings, _) = parse_clippings(SAMPLE, Some("thinking in systems.pdf-cdeKey_ABC123"));
        assert_eq!(clippings.len(), 3);
        assert!(clippings.iter().all(|c| c.book_title == "Thinking in Systems"));
    }

    #[test]
    fn normalize_book_id_rules() {
        assert_eq!(normalize_book_id("My_Thesis.pdf-cdeKey_ABC"), "My_Thesis");
        assert_eq!(normalize_book_id("novel.azw3"), "novel");
        assert_eq!(normalize_book_id("Plain Title"), "Plain Title");
        assert!(matches_book("anything", ""));
    }

    #[test]
    fn malformed_blocks_are_reported_not_fatal() {
        let text = "Only a title\n==========\nBook (A)\n- something else entirely\n==========\nBook (A)\n- Your Clip on Page 2\n\nx\n==========\nBook (A)\n- Your Highlight on Page 5\n\nkept\n==========";
        let (clippings, warnings) = parse_clippings(text, None);
        assert_eq!(clippings.len(), 1);
        assert_eq!(clippings[0].content, "kept");
        assert_eq!(warnings.len(), 3);
        assert!(warnings[2].to_string().contains("unsupported clipping kind"));
    }

    #[test]
    fn equals_signs_inside_a_highlight_are_content() {
        let text = "Book (A)\n- Your Highlight on Page 3\n\nheaders look like ==========\nin markdown\n==========\r\nBook (A)\n- Your Highlight on Page 4\n\nnext\n==========\r\n";
        let (clippings, warnings) = parse_clippings(text, None);
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(clippings.len(), 2);
        assert_eq!(clippings[0].content, "headers look like ==========\nin markdown");
        assert_eq!(clippings[1].content, "next");
    }

    #[test]
    fn title_without_author() {
        let text = "Untitled scan\n- Your Highlight on Page 1\n\nfoo\n==========";
        let (clippings, _) = parse_clippings(text, None);
        assert_eq!(clippings[0].book_title, "Untitled scan");
        assert_eq!(clippings[0].author, None);
    }

    #[test]
    fn latin1_fallback() {
        let bytes = b"Caf\xe9 (X)\n- Your Highlight on Page 1\n\nna\xefve\n==========";
        let text = decode_text(bytes);
        let (clippings, _) = parse_clippings(&text, None);
        assert_eq!(clippings[0].book_title, "Café");
        assert_eq!(clippings[0].content, "naïve");
    }

    #[test]
    fn reads_file_and_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("My Clippings.txt");
        std::fs::write(&path, SAMPLE).unwrap();
        let (clippings, _) = parse_clippings_file(&path, Some("Thinking in Systems")).unwrap();
        assert_eq!(clippings.len(), 3);

        let err = parse_clippings_file(dir.path().join("missing.txt"), None).unwrap_err();
        assert!(matches!(err, AnnotatorError::ReadFailed { .. }));
    }
}
