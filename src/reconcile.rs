//! Reconciling store records with clippings.
//!
//! The store knows *where* each highlight is but not what it says; the
//! clippings log knows what it says but only roughly where. This module
//! pairs the two per page, converts every record into document space, and
//! then looks for the clipping text in the document to replace the
//! device-derived rectangle with the rectangles of the real text.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::annotations::{AnnotationKind, AnnotationRecord};
use crate::clippings::{Clipping, ClippingKind};
use crate::config::AnnotatorConfig;
use crate::document::Document;
use crate::error::{MatchMiss, ParseWarning};
use crate::geometry::{Point, Rect};
use crate::matching::{normalize, TextMatcher, STRATEGY_COUNT};
use crate::output::{MatchSource, ReconciledAnnotation};
use crate::page_offset::document_page;
use crate::snake::PageGeometry;
use crate::transform::{transform_position, PageFrame};

/// Characters of clipping text kept in a [`MatchMiss`].
const MISS_PREFIX_CHARS: usize = 50;

/// Result of [`reconcile`].
#[derive(Debug, Default)]
pub struct Reconciled {
    /// One entry per store record that landed in the document, in store
    /// order, followed by clipping highlights that had no store record but
    /// were found in the text.
    pub annotations: Vec<ReconciledAnnotation>,
    pub misses: Vec<MatchMiss>,
    pub warnings: Vec<ParseWarning>,
}

/// Pair, convert and text-match.
///
/// Nothing here fails the run. Records past the end of the document, or on
/// a page the backend cannot measure, become warnings. Text that cannot be
/// found, or a page that cannot be searched, becomes a [`MatchMiss`] and the
/// annotation keeps its device rectangle.
pub fn reconcile(
    doc: &dyn Document,
    mut records: Vec<AnnotationRecord>,
    clippings: &[Clipping],
    page_offset: i64,
    config: &AnnotatorConfig,
) -> Reconciled {
    let mut out = Reconciled::default();
    let page_count = doc.page_count();

    // ── Pairing ──────────────────────────────────────────────────────────
    let by_page = clipping_highlights_by_page(clippings, page_offset, page_count);
    let mut unpaired: Vec<(usize, &Clipping)> = Vec::new();
    for (&page, page_clippings) in &by_page {
        let span_records: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kind.is_span() && r.page() == page)
            .map(|(i, _)| i)
            .collect();
        let pairs = pair_page(doc, page, &records, &span_records, page_clippings, config);
        let mut used = vec![false; page_clippings.len()];
        for (record_idx, clip_idx) in pairs {
            records[record_idx].matched_content = Some(page_clippings[clip_idx].content.clone());
            used[clip_idx] = true;
        }
        unpaired.extend(
            page_clippings
                .iter()
                .zip(used)
                .filter(|(_, used)| !used)
                .map(|(c, _)| (page, *c)),
        );
    }
    let paired = records
        .iter()
        .filter(|r| r.matched_content.is_some())
        .count();
    info!(
        "Paired {} store highlights with clippings, {} clippings unpaired",
        paired,
        unpaired.len()
    );

    // ── Conversion ───────────────────────────────────────────────────────
    let mut frames: HashMap<usize, PageFrame> = HashMap::new();
    for record in &records {
        let page = record.page();
        if page >= page_count {
            let w = ParseWarning::PageOutOfRange {
                kind: record.kind.as_str().to_string(),
                page,
                total: page_count,
            };
            warn!("{}", w);
            out.warnings.push(w);
            continue;
        }
        let frame = match frames.entry(page) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(e) => match PageFrame::of(doc, page) {
                Ok(frame) => *e.insert(frame),
                Err(err) => {
                    let w = ParseWarning::PageUnreadable {
                        kind: record.kind.as_str().to_string(),
                        page,
                        detail: err.to_string(),
                    };
                    warn!("{}", w);
                    out.warnings.push(w);
                    continue;
                }
            },
        };
        out.annotations.push(convert(record, &frame, config));
    }

    // ── Text search ──────────────────────────────────────────────────────
    let mut matcher = TextMatcher::new(doc, config);
    for annotation in out.annotations.iter_mut().filter(|a| a.kind.is_span()) {
        if annotation.content.is_empty() {
            annotation.content = doc
                .extract_text_in_rect(annotation.page, &annotation.rect)
                .map(|t| normalize(&t))
                .unwrap_or_default();
            continue;
        }
        match matcher.find(annotation.page, &annotation.content, annotation.start) {
            Ok(Some(m)) => {
                debug!(
                    "Page {}: {:?} match, {} rects",
                    annotation.page + 1,
                    m.strategy,
                    m.rects.len()
                );
                set_matched(annotation, m.rects);
            }
            Ok(None) => out
                .misses
                .push(miss(annotation.page, &annotation.content)),
            Err(e) => {
                warn!("Text search failed on page {}: {}", annotation.page + 1, e);
                out.misses
                    .push(miss(annotation.page, &annotation.content));
            }
        }
    }

    for (page, clipping) in unpaired {
        match matcher.find(page, &clipping.content, Point::default()) {
            Ok(Some(m)) => {
                let mut annotation = ReconciledAnnotation {
                    kind: AnnotationKind::Highlight,
                    page,
                    rect: Rect::default(),
                    secondary_rects: Vec::new(),
                    content: clipping.content.clone(),
                    source: MatchSource::GeometryOnly,
                    highlight_content: None,
                    created_at: clipping.added_on.map(|t| t.and_utc()),
                    start: Point::default(),
                    end: Point::default(),
                    end_anchor: Point::default(),
                };
                set_matched(&mut annotation, m.rects);
                annotation.end_anchor = annotation.end;
                out.annotations.push(annotation);
            }
            Ok(None) => out.misses.push(miss(page, &clipping.content)),
            Err(e) => {
                warn!("Text search failed on page {}: {}", page + 1, e);
                out.misses.push(miss(page, &clipping.content));
            }
        }
    }

    info!(
        "Reconciled {} annotations, {} text matches missed",
        out.annotations.len(),
        out.misses.len()
    );
    out
}

/// Replace the snake-ready rectangles of highlights with their final
/// per-line quads.
///
/// Highlights on one line keep their rectangle, matched or converted.
/// Anything spanning lines is redrawn as a snake between its first and last
/// line. Highlights without a usable device rectangle get a block at the top
/// of the page's text. On a page the backend cannot measure, highlights keep
/// the rectangle they have.
pub fn build_geometry(
    doc: &dyn Document,
    annotations: &mut [ReconciledAnnotation],
    config: &AnnotatorConfig,
) {
    let mut pages: HashMap<usize, Option<PageGeometry>> = HashMap::new();
    for annotation in annotations.iter_mut().filter(|a| a.kind.is_span()) {
        if annotation.source == MatchSource::TextMatched && annotation.secondary_rects.len() <= 1 {
            annotation.secondary_rects.clear();
            continue;
        }
        let page = annotation.page;
        let measured = pages.entry(page).or_insert_with(|| {
            PageGeometry::measure(doc, page, config)
                .map_err(|e| warn!("Page {} could not be measured: {}", page + 1, e))
                .ok()
        });
        let Some(geometry) = measured.as_ref() else {
            continue;
        };
        let geometry_only = annotation.source == MatchSource::GeometryOnly;
        let quads = if geometry_only && annotation.rect.is_empty() {
            geometry.fallback_block()
        } else if geometry_only && geometry.line_count(annotation.start, annotation.end) == 1 {
            // The device rectangle already covers a single line.
            continue;
        } else {
            geometry.snake(annotation.start, annotation.end)
        };
        apply_quads(annotation, quads);
    }
}

fn apply_quads(annotation: &mut ReconciledAnnotation, quads: Vec<Rect>) {
    let Some(bounds) = Rect::union_all(&quads) else {
        return;
    };
    annotation.rect = bounds;
    annotation.secondary_rects = if quads.len() > 1 { quads } else { Vec::new() };
}

fn set_matched(annotation: &mut ReconciledAnnotation, rects: Vec<Rect>) {
    let (Some(first), Some(last), Some(bounds)) =
        (rects.first(), rects.last(), Rect::union_all(&rects))
    else {
        return;
    };
    annotation.start = first.top_left();
    annotation.end = Point::new(last.x1, last.y0);
    annotation.rect = bounds;
    annotation.secondary_rects = rects;
    annotation.source = MatchSource::TextMatched;
}

fn miss(page: usize, content: &str) -> MatchMiss {
    let m = MatchMiss {
        page,
        content_prefix: content.chars().take(MISS_PREFIX_CHARS).collect(),
        strategies_tried: STRATEGY_COUNT,
    };
    debug!("{}", m);
    m
}

/// Convert one store record into document space.
fn convert(record: &AnnotationRecord, frame: &PageFrame, config: &AnnotatorConfig) -> ReconciledAnnotation {
    let coords = &config.coordinates;
    let start_rect = transform_position(&record.start, frame, coords);
    let start = start_rect.top_left();

    let (rect, end, end_anchor, content) = match record.kind {
        AnnotationKind::Highlight | AnnotationKind::Underline => {
            let end_rect = if record.end.page == record.start.page {
                transform_position(&record.end, frame, coords)
            } else {
                debug!(
                    "Highlight runs from page {} to {}, keeping its first page",
                    record.start.page, record.end.page
                );
                start_rect
            };
            let same_line =
                (end_rect.y0 - start_rect.y0).abs() <= config.same_line_tolerance;
            let rect = if same_line {
                Rect::new(
                    start_rect.x0,
                    start_rect.y0,
                    end_rect.x1,
                    start_rect.y1.max(end_rect.y1),
                )
                .normalized()
            } else {
                start_rect.union(&end_rect)
            };
            let content = record.matched_content.clone().unwrap_or_default();
            (
                rect,
                Point::new(end_rect.x1, end_rect.y0),
                end_rect.top_left(),
                content,
            )
        }
        AnnotationKind::Note => {
            let size = config.note_icon_size;
            let rect = Rect::from_xywh(
                start.x.min((frame.width - size).max(0.0)),
                start.y.min((frame.height - size).max(0.0)),
                size,
                size,
            );
            (rect, start, start, record.note_text.clone())
        }
        AnnotationKind::Bookmark => (
            Rect::new(start.x, start.y, start.x, start.y),
            start,
            start,
            String::new(),
        ),
    };

    ReconciledAnnotation {
        kind: record.kind,
        page: record.page(),
        rect,
        secondary_rects: Vec::new(),
        content,
        source: MatchSource::GeometryOnly,
        highlight_content: record.highlight_content.clone(),
        created_at: record.created_at,
        start,
        end,
        end_anchor,
    }
}

/// Clipping highlights grouped by document page, in log order.
fn clipping_highlights_by_page(
    clippings: &[Clipping],
    page_offset: i64,
    page_count: usize,
) -> BTreeMap<usize, Vec<&Clipping>> {
    let mut by_page: BTreeMap<usize, Vec<&Clipping>> = BTreeMap::new();
    for c in clippings.iter().filter(|c| c.kind == ClippingKind::Highlight) {
        let Some(page) = c
            .page_1based
            .and_then(|p| document_page(p, page_offset, page_count))
        else {
            debug!("Clipping without a document page: {:?}", c.page_1based);
            continue;
        };
        if !c.content.trim().is_empty() {
            by_page.entry(page).or_default().push(c);
        }
    }
    by_page
}

/// Pair the span records of one page with its clippings.
///
/// Equal counts are matched by proximity: every clipping is searched for
/// literally and the globally closest (clipping, record) pair is taken
/// first. Pairs nothing was found for, and pages with unequal counts, fall
/// back to reading order: records by device y, clippings as logged.
///
/// Returns `(record index, clipping index)` pairs.
fn pair_page(
    doc: &dyn Document,
    page: usize,
    records: &[AnnotationRecord],
    span_records: &[usize],
    clippings: &[&Clipping],
    config: &AnnotatorConfig,
) -> Vec<(usize, usize)> {
    if span_records.is_empty() {
        return Vec::new();
    }
    let mut by_y: Vec<usize> = span_records.to_vec();
    by_y.sort_by_key(|&i| (records[i].start.y, records[i].start.x));

    let mut pairs: Vec<(usize, usize)> = Vec::new();
    let mut record_free = vec![true; by_y.len()];
    let mut clip_free = vec![true; clippings.len()];

    let frame = if by_y.len() == clippings.len() {
        PageFrame::of(doc, page)
            .map_err(|e| warn!("Page {} could not be measured for pairing: {}", page + 1, e))
            .ok()
    } else {
        debug!(
            "Page {}: {} store highlights vs {} clippings, pairing in reading order",
            page + 1,
            by_y.len(),
            clippings.len()
        );
        None
    };
    if let Some(frame) = frame {
        let anchors: Vec<Point> = by_y
            .iter()
            .map(|&i| transform_position(&records[i].start, &frame, &config.coordinates).top_left())
            .collect();
        let mut distances: Vec<Vec<f64>> = Vec::with_capacity(clippings.len());
        for c in clippings {
            let hits = doc
                .search_text(page, &normalize(&c.content))
                .unwrap_or_else(|e| {
                    warn!("Page {}: search failed, pairing in reading order: {}", page + 1, e);
                    Vec::new()
                });
            distances.push(
                anchors
                    .iter()
                    .map(|a| {
                        hits.iter()
                            .map(|h| h.top_left().distance(a))
                            .fold(f64::INFINITY, f64::min)
                    })
                    .collect(),
            );
        }
        loop {
            let mut best: Option<(usize, usize, f64)> = None;
            for (ci, row) in distances.iter().enumerate().filter(|(ci, _)| clip_free[*ci]) {
                for (ri, &d) in row.iter().enumerate().filter(|(ri, _)| record_free[*ri]) {
                    if d.is_finite() && best.is_none_or(|(_, _, bd)| d < bd) {
                        best = Some((ci, ri, d));
                    }
                }
            }
            let Some((ci, ri, d)) = best else { break };
            debug!("Page {}: clipping {} pairs with record {} at {:.1}pt", page + 1, ci, ri, d);
            pairs.push((by_y[ri], ci));
            clip_free[ci] = false;
            record_free[ri] = false;
        }
    }

    let free_records = by_y
        .iter()
        .zip(&record_free)
        .filter(|(_, free)| **free)
        .map(|(r, _)| *r);
    let free_clips = (0..clippings.len()).filter(|ci| clip_free[*ci]);
    pairs.extend(free_records.zip(free_clips));
    pairs
}
