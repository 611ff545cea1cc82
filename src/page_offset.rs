//! Mapping printed clipping page numbers onto document pages.
//!
//! Store records carry 0-based document page indices. Clippings carry the
//! page number the reader saw, which for a book with front matter is not the
//! physical page. `document page = clipping page - 1 + offset`.

use tracing::{debug, info, warn};

use crate::clippings::{Clipping, ClippingKind};
use crate::config::AnnotatorConfig;
use crate::document::Document;
use crate::matching::normalize::{normalize, words};

/// Clipping highlights sampled when guessing the offset from text.
const SAMPLE_SIZE: usize = 5;
/// Leading words of each sample that are searched for.
const SAMPLE_WORDS: usize = 5;

/// Document page for a 1-based clipping page, if it lands inside the document.
pub fn document_page(page_1based: u32, offset: i64, page_count: usize) -> Option<usize> {
    let page = i64::from(page_1based) - 1 + offset;
    usize::try_from(page).ok().filter(|p| *p < page_count)
}

/// Work out the offset between clipping pages and document pages.
///
/// Page labels decide it when the document has them. Otherwise a handful of
/// clipping highlights are searched for on the pages around their naive
/// position and the offset with the most hits wins; ties go to 0, then to
/// the smaller shift. A page the backend cannot search counts as a miss.
pub fn detect_page_offset(
    doc: &dyn Document,
    clippings: &[Clipping],
    config: &AnnotatorConfig,
) -> i64 {
    if let Some(offset) = from_labels(doc, clippings) {
        info!("Page offset {} from page labels", offset);
        return offset;
    }

    let samples: Vec<(u32, String)> = clippings
        .iter()
        .filter(|c| c.kind == ClippingKind::Highlight)
        .filter_map(|c| {
            let page = c.page_1based?;
            let normalized = normalize(&c.content);
            let lead = words(&normalized);
            (!lead.is_empty()).then(|| (page, lead[..lead.len().min(SAMPLE_WORDS)].join(" ")))
        })
        .take(SAMPLE_SIZE)
        .collect();
    if samples.is_empty() {
        return 0;
    }

    let radius = i64::try_from(config.page_offset_search_radius).unwrap_or(i64::MAX);
    let mut best: (i64, usize) = (0, 0);
    for offset in -radius..=radius {
        let mut hits = 0;
        for (page_1based, needle) in &samples {
            let Some(page) = document_page(*page_1based, offset, doc.page_count()) else {
                continue;
            };
            match doc.search_text(page, needle) {
                Ok(found) if !found.is_empty() => hits += 1,
                Ok(_) => {}
                Err(e) => warn!("Offset {:+}: search failed on page {}: {}", offset, page + 1, e),
            }
        }
        debug!("Offset {:+}: {}/{} samples found", offset, hits, samples.len());
        if better(offset, hits, best) {
            best = (offset, hits);
        }
    }

    if best.1 > 0 {
        info!(
            "Page offset {} ({}/{} samples found)",
            best.0,
            best.1,
            samples.len()
        );
    }
    best.0
}

fn better(offset: i64, hits: usize, (best_offset, best_hits): (i64, usize)) -> bool {
    if hits != best_hits {
        return hits > best_hits;
    }
    if best_offset == 0 {
        return false;
    }
    offset == 0 || offset.abs() < best_offset.abs()
}

fn from_labels(doc: &dyn Document, clippings: &[Clipping]) -> Option<i64> {
    let labels: Vec<(usize, String)> = (0..doc.page_count())
        .filter_map(|i| doc.page_label(i).map(|l| (i, l)))
        .collect();
    if labels.is_empty() {
        return None;
    }
    clippings.iter().filter_map(|c| c.page_1based).find_map(|p| {
        let wanted = p.to_string();
        labels
            .iter()
            .find(|(_, label)| label.trim() == wanted)
            .and_then(|(idx, _)| i64::try_from(*idx).ok())
            .map(|idx| idx - (i64::from(p) - 1))
    })
}
