use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::text_page::{Glyph, TextPage, Word};
use super::{check_page, Document, Markup};
use crate::error::AnnotatorError;
use crate::geometry::{Point, Rect};

/// Glyph advance as a fraction of the font size.
const ADVANCE: f64 = 0.5;

/// A page of monospaced text lines.
#[derive(Debug, Clone, Default)]
pub struct MemoryPage {
    width: f64,
    height: f64,
    crop_offset: Point,
    label: Option<String>,
    lines: Vec<Vec<Glyph>>,
    text: TextPage,
}

impl MemoryPage {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Place the visible area this far from the media box origin.
    pub fn crop_offset(mut self, x: f64, y: f64) -> Self {
        self.crop_offset = Point::new(x, y);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Lay out `text` on one line with its top-left corner at `(x, y)`.
    /// Each character advances `size / 2` points and is `size` tall.
    pub fn text_line(mut self, x: f64, y: f64, size: f64, text: &str) -> Self {
        let advance = size * ADVANCE;
        let glyphs = text
            .chars()
            .enumerate()
            .map(|(i, ch)| {
                let x0 = x + i as f64 * advance;
                Glyph::new(ch, Rect::new(x0, y, x0 + advance, y + size))
            })
            .collect();
        self.lines.push(glyphs);
        self.text = TextPage::from_lines(self.lines.clone());
        self
    }

    pub fn text_page(&self) -> &TextPage {
        &self.text
    }
}

/// An annotation added to a [`MemoryDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AddedAnnotation {
    Highlight {
        page: usize,
        rects: Vec<Rect>,
        markup: Markup,
    },
    PointNote {
        page: usize,
        at: Point,
        text: String,
        title: String,
    },
    Bookmark {
        page: usize,
        title: String,
    },
}

impl AddedAnnotation {
    pub fn page(&self) -> usize {
        match self {
            AddedAnnotation::Highlight { page, .. }
            | AddedAnnotation::PointNote { page, .. }
            | AddedAnnotation::Bookmark { page, .. } => *page,
        }
    }
}

/// An in-memory [`Document`].
///
/// `save` writes the added annotations as JSON.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    pages: Vec<MemoryPage>,
    added: Vec<AddedAnnotation>,
    rejected_pages: HashSet<usize>,
    saved_to: Option<PathBuf>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(pages: impl IntoIterator<Item = MemoryPage>) -> Self {
        Self {
            pages: pages.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn push_page(&mut self, page: MemoryPage) -> &mut Self {
        self.pages.push(page);
        self
    }

    /// Make every annotation added on `page` fail.
    pub fn reject_annotations_on(&mut self, page: usize) -> &mut Self {
        self.rejected_pages.insert(page);
        self
    }

    pub fn added(&self) -> &[AddedAnnotation] {
        &self.added
    }

    pub fn saved_to(&self) -> Option<&Path> {
        self.saved_to.as_deref()
    }

    fn page(&self, page: usize) -> Result<&MemoryPage, AnnotatorError> {
        check_page(page, self.pages.len())?;
        Ok(&self.pages[page])
    }

    fn record(
        &mut self,
        operation: &'static str,
        annotation: AddedAnnotation,
    ) -> Result<(), AnnotatorError> {
        let page = annotation.page();
        check_page(page, self.pages.len())?;
        if self.rejected_pages.contains(&page) {
            return Err(AnnotatorError::DocumentOperation {
                operation,
                page,
                detail: "page rejects annotations".into(),
            });
        }
        self.added.push(annotation);
        Ok(())
    }
}

impl Document for MemoryDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_rect(&self, page: usize) -> Result<Rect, AnnotatorError> {
        let p = self.page(page)?;
        Ok(Rect::new(0.0, 0.0, p.width, p.height))
    }

    fn page_crop_rect(&self, page: usize) -> Result<Rect, AnnotatorError> {
        let p = self.page(page)?;
        Ok(Rect::from_xywh(p.crop_offset.x, p.crop_offset.y, p.width, p.height))
    }

    fn page_label(&self, page: usize) -> Option<String> {
        self.pages.get(page).and_then(|p| p.label.clone())
    }

    fn search_text(&self, page: usize, needle: &str) -> Result<Vec<Rect>, AnnotatorError> {
        Ok(self.page(page)?.text.search(needle))
    }

    fn extract_text(&self, page: usize) -> Result<String, AnnotatorError> {
        Ok(self.page(page)?.text.text())
    }

    fn extract_text_in_rect(&self, page: usize, rect: &Rect) -> Result<String, AnnotatorError> {
        Ok(self.page(page)?.text.text_in_rect(rect))
    }

    fn words(&self, page: usize) -> Result<Vec<Word>, AnnotatorError> {
        Ok(self.page(page)?.text.words())
    }

    fn line_rects(&self, page: usize) -> Result<Vec<Rect>, AnnotatorError> {
        Ok(self.page(page)?.text.line_rects())
    }

    fn add_highlight(
        &mut self,
        page: usize,
        rects: &[Rect],
        markup: &Markup,
    ) -> Result<(), AnnotatorError> {
        self.record(
            "add_highlight",
            AddedAnnotation::Highlight {
                page,
                rects: rects.to_vec(),
                markup: markup.clone(),
            },
        )
    }

    fn add_point_note(
        &mut self,
        page: usize,
        at: Point,
        text: &str,
        title: &str,
    ) -> Result<(), AnnotatorError> {
        self.record(
            "add_point_note",
            AddedAnnotation::PointNote {
                page,
                at,
                text: text.to_string(),
                title: title.to_string(),
            },
        )
    }

    fn add_bookmark(&mut self, page: usize, title: &str) -> Result<(), AnnotatorError> {
        self.record(
            "add_bookmark",
            AddedAnnotation::Bookmark {
                page,
                title: title.to_string(),
            },
        )
    }

    fn save(&mut self, path: &Path) -> Result<(), AnnotatorError> {
        let save_err = |detail: String| AnnotatorError::DocumentSave {
            path: path.to_path_buf(),
            detail,
        };
        let json = serde_json::to_vec_pretty(&self.added).map_err(|e| save_err(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| save_err(e.to_string()))?;
        info!(
            "Saved {} annotations to {}",
            self.added.len(),
            path.display()
        );
        self.saved_to = Some(path.to_path_buf());
        Ok(())
    }
}
