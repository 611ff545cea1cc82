//! Output types returned by [`crate::annotate`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::annotations::AnnotationKind;
use crate::error::{MatchMiss, ParseWarning};
use crate::geometry::{Point, Rect};

/// How an annotation's rectangle was obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchSource {
    /// Converted from the device coordinates alone.
    #[default]
    GeometryOnly,
    /// Replaced by the rectangles of the text found in the document.
    TextMatched,
}

/// One annotation ready to be drawn into the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledAnnotation {
    pub kind: AnnotationKind,
    /// 0-based document page.
    pub page: usize,
    /// Bounding rectangle in document space.
    pub rect: Rect,
    /// One rectangle per text line for multi-line highlights; empty when
    /// `rect` alone describes the annotation.
    pub secondary_rects: Vec<Rect>,
    /// Highlighted text for highlights, the note text for notes, empty for
    /// bookmarks.
    pub content: String,
    pub source: MatchSource,
    /// Text of the highlight a note was unified with.
    pub highlight_content: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Where the annotation begins (top-left of its first line).
    pub start: Point,
    /// Where it ends (right edge of its last line, at that line's top).
    pub end: Point,
    /// Top-left of the recorded end position. A note attached to the end of
    /// a highlight is stored at this point.
    pub end_anchor: Point,
}

impl ReconciledAnnotation {
    /// The rectangles to draw: the per-line quads, or `rect` on its own.
    pub fn rects(&self) -> Vec<Rect> {
        if self.secondary_rects.is_empty() {
            vec![self.rect]
        } else {
            self.secondary_rects.clone()
        }
    }

    /// `true` for a note that absorbed a highlight.
    pub fn is_unified(&self) -> bool {
        self.kind == AnnotationKind::Note && self.highlight_content.is_some()
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Annotation records extracted from the store.
    pub store_annotations: usize,
    /// Clippings for this book.
    pub clippings: usize,
    /// Annotations placed from text found in the document.
    pub text_matched: usize,
    /// Annotations placed from device coordinates alone.
    pub geometry_only: usize,
    /// Exact duplicates dropped.
    pub duplicates_removed: usize,
    /// Note/highlight pairs merged into one note.
    pub unified: usize,
    /// Annotations written into the document by [`crate::apply`].
    pub rendered: usize,
    /// Annotations the document refused.
    pub render_failures: usize,
}

/// The result of [`crate::annotate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotationRun {
    /// Final annotations, deduplicated and unified, in store order.
    pub annotations: Vec<ReconciledAnnotation>,
    pub stats: RunStats,
    /// Records skipped while reading the store and the clippings.
    pub warnings: Vec<ParseWarning>,
    /// Clippings no search strategy could place.
    pub misses: Vec<MatchMiss>,
    /// Offset added to `clipping page - 1` to get the document page.
    pub page_offset: i64,
}

impl AnnotationRun {
    /// Annotations on one page.
    pub fn on_page(&self, page: usize) -> impl Iterator<Item = &ReconciledAnnotation> {
        self.annotations.iter().filter(move |a| a.page == page)
    }
}
