//! The document the annotations are drawn into.
//!
//! The pipeline only needs a small surface from a PDF engine: page sizes,
//! text search and extraction, and a way to add annotations and save.
//! [`Document`] is that surface. Two implementations ship with the crate:
//!
//! * [`MemoryDocument`]: pages of laid-out text held in memory. Records every
//!   annotation added to it.
//! * [`PdfiumDocument`]: a real PDF opened through pdfium.
//!
//! All rectangles are in document space: points, origin at the top-left of
//! the visible page, y growing downwards.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AnnotatorError;
use crate::geometry::{Point, Rect};

mod memory;
mod pdfium;
mod text_page;

pub use memory::{AddedAnnotation, MemoryDocument, MemoryPage};
pub use pdfium::{bind_pdfium, PdfiumDocument};
pub use text_page::{Glyph, TextPage, Word};

/// Title, contents and colour of an annotation written into the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Markup {
    pub title: String,
    pub contents: String,
    pub color: (u8, u8, u8),
}

pub trait Document {
    fn page_count(&self) -> usize;

    /// The visible page: `(0, 0, width, height)`.
    fn page_rect(&self, page: usize) -> Result<Rect, AnnotatorError>;

    /// The crop box measured from the top-left of the media box.
    fn page_crop_rect(&self, page: usize) -> Result<Rect, AnnotatorError>;

    /// Printed page label, when the document defines labels.
    fn page_label(&self, page: usize) -> Option<String> {
        let _ = page;
        None
    }

    /// Case-insensitive literal search. One rectangle per line fragment of
    /// each occurrence.
    fn search_text(&self, page: usize, needle: &str) -> Result<Vec<Rect>, AnnotatorError>;

    fn extract_text(&self, page: usize) -> Result<String, AnnotatorError>;

    fn extract_text_in_rect(&self, page: usize, rect: &Rect) -> Result<String, AnnotatorError>;

    /// Words in reading order with their boxes and line numbers.
    fn words(&self, page: usize) -> Result<Vec<Word>, AnnotatorError>;

    /// Bounding box of each text line, derived from [`Document::words`].
    fn line_rects(&self, page: usize) -> Result<Vec<Rect>, AnnotatorError> {
        let words = self.words(page)?;
        let mut lines: Vec<(usize, Rect)> = Vec::new();
        for word in words {
            match lines.iter_mut().find(|(l, _)| *l == word.line) {
                Some((_, rect)) => *rect = rect.union(&word.rect),
                None => lines.push((word.line, word.rect)),
            }
        }
        Ok(lines.into_iter().map(|(_, r)| r).collect())
    }

    fn add_highlight(
        &mut self,
        page: usize,
        rects: &[Rect],
        markup: &Markup,
    ) -> Result<(), AnnotatorError>;

    /// A sticky-note icon at `at`.
    fn add_point_note(
        &mut self,
        page: usize,
        at: Point,
        text: &str,
        title: &str,
    ) -> Result<(), AnnotatorError>;

    fn add_bookmark(&mut self, page: usize, title: &str) -> Result<(), AnnotatorError>;

    fn save(&mut self, path: &Path) -> Result<(), AnnotatorError>;
}

pub(crate) fn check_page(page: usize, total: usize) -> Result<(), AnnotatorError> {
    if page < total {
        Ok(())
    } else {
        Err(AnnotatorError::PageOutOfRange { page, total })
    }
}
