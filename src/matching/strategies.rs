//! Finding a clipping's text on a document page.
//!
//! Strategies, tried in order until one produces rectangles:
//!
//! 1. literal search of the normalised text
//! 2. literal search with ligatures reinstated
//! 3. substring of the normalised page text, mapped back to raw text
//! 4. prefix and suffix anchors around a fuzzy middle
//! 5. the leading words alone

use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::normalize::{self, Normalized};
use super::proximity::select_nearest;
use super::similarity::ratio;
use crate::config::AnnotatorConfig;
use crate::document::Document;
use crate::error::AnnotatorError;
use crate::geometry::{Point, Rect};

/// Number of strategies [`TextMatcher::find`] tries.
pub const STRATEGY_COUNT: usize = 5;

const ANCHOR_WORDS: [usize; 3] = [5, 4, 3];
const PREFIX_WORDS: [usize; 3] = [10, 7, 5];

/// Which strategy located the text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Strategy {
    Literal,
    LigatureVariant,
    NormalizedText,
    Anchored { similarity: f64 },
    Prefix { words: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextMatch {
    /// One rectangle per line fragment, in reading order.
    pub rects: Vec<Rect>,
    pub strategy: Strategy,
}

impl TextMatch {
    pub fn bounds(&self) -> Option<Rect> {
        Rect::union_all(&self.rects)
    }
}

/// Searches one document, caching normalised page text.
pub struct TextMatcher<'a> {
    doc: &'a dyn Document,
    config: &'a AnnotatorConfig,
    pages: HashMap<usize, Rc<Normalized>>,
}

impl<'a> TextMatcher<'a> {
    pub fn new(doc: &'a dyn Document, config: &'a AnnotatorConfig) -> Self {
        Self {
            doc,
            config,
            pages: HashMap::new(),
        }
    }

    /// Locate `text` on `page`, preferring occurrences near `expected`.
    ///
    /// `Ok(None)` when every strategy fails.
    pub fn find(
        &mut self,
        page: usize,
        text: &str,
        expected: Point,
    ) -> Result<Option<TextMatch>, AnnotatorError> {
        let needle = normalize::normalize(text);
        if needle.is_empty() {
            return Ok(None);
        }
        let needle_chars = needle.chars().count();

        // ── 1. Literal ──
        let hits = self.search(page, &needle, expected, needle_chars)?;
        if !hits.is_empty() {
            return Ok(Some(found(hits, Strategy::Literal)));
        }

        // ── 2. Ligature variants ──
        for variant in normalize::ligature_variants(&needle) {
            let hits = self.search(page, &variant, expected, needle_chars)?;
            if !hits.is_empty() {
                return Ok(Some(found(hits, Strategy::LigatureVariant)));
            }
        }

        let page_text = self.page_text(page)?;
        if page_text.is_empty() {
            return Ok(None);
        }
        let height = self.doc.page_rect(page)?.height();
        let fraction = if height > 0.0 {
            (expected.y / height).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let expected_offset = (fraction * page_text.len() as f64) as usize;

        // ── 3. Normalised page text ──
        let needle_vec: Vec<char> = needle.chars().collect();
        if let Some(at) = nearest(&page_text.find_all(&needle_vec), expected_offset) {
            let hits = self.locate(page, &page_text, at..at + needle_vec.len(), expected)?;
            if !hits.is_empty() {
                return Ok(Some(found(hits, Strategy::NormalizedText)));
            }
        }

        // ── 4. Anchors ──
        if let Some((range, similarity)) = self.anchored(&page_text, &needle, expected_offset) {
            let hits = self.locate(page, &page_text, range, expected)?;
            if !hits.is_empty() {
                return Ok(Some(found(hits, Strategy::Anchored { similarity })));
            }
        }

        // ── 5. Prefix ──
        let words = normalize::words(&needle);
        for n in PREFIX_WORDS {
            if words.len() <= n {
                continue;
            }
            let prefix: Vec<char> = words[..n].join(" ").chars().collect();
            if let Some(at) = nearest(&page_text.find_all(&prefix), expected_offset) {
                let hits = self.locate(page, &page_text, at..at + prefix.len(), expected)?;
                if !hits.is_empty() {
                    return Ok(Some(found(hits, Strategy::Prefix { words: n })));
                }
            }
        }

        debug!(
            "Page {}: no strategy matched \"{}\"",
            page + 1,
            needle.chars().take(50).collect::<String>()
        );
        Ok(None)
    }

    fn search(
        &self,
        page: usize,
        needle: &str,
        expected: Point,
        needle_chars: usize,
    ) -> Result<Vec<Rect>, AnnotatorError> {
        let hits = self.doc.search_text(page, needle)?;
        Ok(select_nearest(&hits, expected, needle_chars, self.config))
    }

    /// Search the raw text behind a normalised range.
    fn locate(
        &self,
        page: usize,
        page_text: &Normalized,
        range: Range<usize>,
        expected: Point,
    ) -> Result<Vec<Rect>, AnnotatorError> {
        let chars = range.len();
        let raw = page_text.raw_text(range);
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.search(page, &raw, expected, chars)
    }

    fn page_text(&mut self, page: usize) -> Result<Rc<Normalized>, AnnotatorError> {
        if let Some(cached) = self.pages.get(&page) {
            return Ok(Rc::clone(cached));
        }
        let text = Rc::new(Normalized::new(&self.doc.extract_text(page)?));
        self.pages.insert(page, Rc::clone(&text));
        Ok(text)
    }

    /// Bound the clipping by its first and last words and accept what lies
    /// between if it is similar enough.
    fn anchored(
        &self,
        page_text: &Normalized,
        needle: &str,
        expected_offset: usize,
    ) -> Option<(Range<usize>, f64)> {
        let words = normalize::words(needle);
        let needle_len = needle.chars().count();
        let lo = expected_offset.saturating_sub(self.config.anchor_window_chars);
        let hi = (expected_offset + self.config.anchor_window_chars + needle_len)
            .min(page_text.len());
        let windows = [lo..hi, 0..page_text.len()];

        let mut best: f64 = 0.0;
        for window in &windows {
            for n in ANCHOR_WORDS {
                if words.len() <= n {
                    continue;
                }
                let prefix: Vec<char> = words[..n].join(" ").chars().collect();
                let mut starts = page_text.find_in(&prefix, window);
                starts.sort_by_key(|s| s.abs_diff(expected_offset));

                for &start in &starts {
                    for m in ANCHOR_WORDS {
                        if words.len() <= m {
                            continue;
                        }
                        let suffix: Vec<char> = words[words.len() - m..].join(" ").chars().collect();
                        let limit = (start + needle_len * 2 + suffix.len()).min(page_text.len());
                        let Some(end) = page_text
                            .find_in(&suffix, &(start..limit))
                            .first()
                            .map(|s| s + suffix.len())
                            .filter(|&e| e <= limit)
                        else {
                            continue;
                        };
                        let candidate = page_text.slice(start..end);
                        let similarity = ratio(&candidate, needle);
                        best = best.max(similarity);
                        if similarity >= self.config.similarity_threshold {
                            debug!(
                                "Anchored match ({} + {} words), similarity {:.3}",
                                n, m, similarity
                            );
                            return Some((start..end, similarity));
                        }
                    }
                }
            }
        }
        if best > 0.0 {
            debug!(
                "Best anchored similarity {:.3} below threshold {:.2}",
                best, self.config.similarity_threshold
            );
        }
        None
    }
}

fn found(rects: Vec<Rect>, strategy: Strategy) -> TextMatch {
    TextMatch { rects, strategy }
}

/// The offset closest to `target`; the first one wins ties.
fn nearest(offsets: &[usize], target: usize) -> Option<usize> {
    let mut best: Option<usize> = None;
    for &o in offsets {
        if best.is_none_or(|b| o.abs_diff(target) < b.abs_diff(target)) {
            best = Some(o);
        }
    }
    best
}
