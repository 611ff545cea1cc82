//! Drawing reconciled annotations into a [`Document`].

use tracing::{debug, warn};

use crate::annotations::AnnotationKind;
use crate::config::RenderStyle;
use crate::document::{Document, Markup};
use crate::error::AnnotatorError;
use crate::output::ReconciledAnnotation;

/// Outcome of [`render_annotations`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderCounts {
    pub rendered: usize,
    pub failures: usize,
}

/// Draw every annotation. A failure is logged and counted; the rest are
/// still drawn.
pub fn render_annotations(
    doc: &mut dyn Document,
    annotations: &[ReconciledAnnotation],
    style: &RenderStyle,
) -> RenderCounts {
    let mut counts = RenderCounts::default();
    for annotation in annotations {
        match render_one(doc, annotation, style) {
            Ok(()) => counts.rendered += 1,
            Err(e) => {
                warn!(
                    "Failed to draw {} on page {}: {}",
                    annotation.kind.as_str(),
                    annotation.page + 1,
                    e
                );
                counts.failures += 1;
            }
        }
    }
    debug!(
        "Rendered {} annotations, {} failures",
        counts.rendered, counts.failures
    );
    counts
}

fn render_one(
    doc: &mut dyn Document,
    a: &ReconciledAnnotation,
    style: &RenderStyle,
) -> Result<(), AnnotatorError> {
    match a.kind {
        AnnotationKind::Note if a.is_unified() => doc.add_highlight(
            a.page,
            &a.rects(),
            &Markup {
                title: style.note_title.clone(),
                contents: a.content.clone(),
                color: style.highlight_color,
            },
        ),
        AnnotationKind::Note => {
            doc.add_point_note(a.page, a.rect.top_left(), &a.content, &style.note_title)
        }
        AnnotationKind::Highlight | AnnotationKind::Underline => doc.add_highlight(
            a.page,
            &a.rects(),
            &Markup {
                title: style.highlight_title.clone(),
                contents: String::new(),
                color: style.highlight_color,
            },
        ),
        AnnotationKind::Bookmark => doc.add_bookmark(a.page, &format!("Page {}", a.page + 1)),
    }
}
