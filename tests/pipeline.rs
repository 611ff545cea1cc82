//! Whole-pipeline tests against in-memory documents.
//!
//! Stores are encoded byte for byte by the fixture encoder below, clippings
//! are written as they appear in `My Clippings.txt`, and the document is a
//! [`MemoryDocument`] of 10pt monospace text (5pt per character, lines 14pt
//! apart from y=100). Device units convert to points at 0.72.

use std::path::Path;

use kindle_pdf_annotator::document::{AddedAnnotation, Word};
use kindle_pdf_annotator::{
    annotate, apply, AnnotationKind, AnnotatorConfig, AnnotatorError, Document, MatchSource,
    Markup, MemoryDocument, MemoryPage, Point, Rect,
};
use krds::{AnnotationClass, SIGNATURE};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const TAG_INT: u8 = 1;
const TAG_LONG: u8 = 2;
const TAG_UTF: u8 = 3;
const TAG_OBJECT_BEGIN: u8 = 0xFE;
const TAG_OBJECT_END: u8 = 0xFF;

const CREATED: i64 = 1_700_000_000_000;

/// Writes a reader data store.
struct StoreBuilder {
    values: usize,
    body: Vec<u8>,
}

impl StoreBuilder {
    fn new() -> Self {
        Self {
            values: 0,
            body: Vec::new(),
        }
    }

    fn int(&mut self, v: i32) -> &mut Self {
        self.body.push(TAG_INT);
        self.body.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn long(&mut self, v: i64) -> &mut Self {
        self.body.push(TAG_LONG);
        self.body.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn raw_utf(&mut self, s: &str) -> &mut Self {
        if s.is_empty() {
            self.body.push(1);
        } else {
            self.body.push(0);
            self.body.extend_from_slice(&(s.len() as u16).to_be_bytes());
            self.body.extend_from_slice(s.as_bytes());
        }
        self
    }

    fn utf(&mut self, s: &str) -> &mut Self {
        self.body.push(TAG_UTF);
        self.raw_utf(s)
    }

    fn begin(&mut self, name: &str) -> &mut Self {
        self.body.push(TAG_OBJECT_BEGIN);
        self.raw_utf(name)
    }

    fn end(&mut self) -> &mut Self {
        self.body.push(TAG_OBJECT_END);
        self
    }

    fn record(&mut self, class: AnnotationClass, start: &str, end: &str, note: &str) -> &mut Self {
        self.begin(class.type_name())
            .utf(start)
            .utf(end)
            .long(CREATED)
            .long(-1)
            .utf("");
        if class == AnnotationClass::Note {
            self.utf(note);
        }
        self.end()
    }

    /// A top-level annotation object.
    fn annotation(&mut self, class: AnnotationClass, start: &str, end: &str) -> &mut Self {
        self.values += 1;
        self.record(class, start, end, "")
    }

    fn note(&mut self, position: &str, text: &str) -> &mut Self {
        self.values += 1;
        self.record(AnnotationClass::Note, position, position, text)
    }

    /// An `annotation.cache.object` holding one bucket of highlights.
    fn highlight_cache(&mut self, positions: &[(&str, &str)]) -> &mut Self {
        self.values += 1;
        self.begin("annotation.cache.object").int(1);
        self.int(1)
            .begin("saved.avl.interval.tree")
            .int(positions.len() as i32);
        for (start, end) in positions {
            self.record(AnnotationClass::Highlight, start, end, "");
        }
        self.end().end()
    }

    fn bytes(&self) -> Vec<u8> {
        let mut out = SIGNATURE.to_vec();
        out.push(TAG_LONG);
        out.extend_from_slice(&1i64.to_be_bytes());
        out.push(TAG_LONG);
        out.extend_from_slice(&(self.values as i64).to_be_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

fn clippings(entries: &[(u32, &str)]) -> String {
    entries
        .iter()
        .map(|(page, text)| {
            format!(
                "Design of Software (Someone)\n- Your Highlight on Page {page} | Added on Monday, January 15, 2024 10:30:45 AM\n\n{text}\n==========\n"
            )
        })
        .collect()
}

fn doc(lines: &[&str]) -> MemoryDocument {
    let page = lines
        .iter()
        .enumerate()
        .fold(MemoryPage::new(612.0, 792.0), |p, (i, l)| {
            p.text_line(72.0, 100.0 + i as f64 * 14.0, 10.0, l)
        });
    MemoryDocument::with_pages([page])
}

/// A backend whose text layer cannot be read: searching and word
/// extraction fail, everything else is delegated.
struct UnreadableText(MemoryDocument);

impl UnreadableText {
    fn fail(operation: &'static str, page: usize) -> AnnotatorError {
        AnnotatorError::DocumentOperation {
            operation,
            page,
            detail: "text layer is damaged".into(),
        }
    }
}

impl Document for UnreadableText {
    fn page_count(&self) -> usize {
        self.0.page_count()
    }

    fn page_rect(&self, page: usize) -> Result<Rect, AnnotatorError> {
        self.0.page_rect(page)
    }

    fn page_crop_rect(&self, page: usize) -> Result<Rect, AnnotatorError> {
        self.0.page_crop_rect(page)
    }

    fn search_text(&self, page: usize, _needle: &str) -> Result<Vec<Rect>, AnnotatorError> {
        Err(Self::fail("search_text", page))
    }

    fn extract_text(&self, page: usize) -> Result<String, AnnotatorError> {
        self.0.extract_text(page)
    }

    fn extract_text_in_rect(&self, page: usize, rect: &Rect) -> Result<String, AnnotatorError> {
        self.0.extract_text_in_rect(page, rect)
    }

    fn words(&self, page: usize) -> Result<Vec<Word>, AnnotatorError> {
        Err(Self::fail("words", page))
    }

    fn add_highlight(
        &mut self,
        page: usize,
        rects: &[Rect],
        markup: &Markup,
    ) -> Result<(), AnnotatorError> {
        self.0.add_highlight(page, rects, markup)
    }

    fn add_point_note(
        &mut self,
        page: usize,
        at: Point,
        text: &str,
        title: &str,
    ) -> Result<(), AnnotatorError> {
        self.0.add_point_note(page, at, text, title)
    }

    fn add_bookmark(&mut self, page: usize, title: &str) -> Result<(), AnnotatorError> {
        self.0.add_bookmark(page, title)
    }

    fn save(&mut self, path: &Path) -> Result<(), AnnotatorError> {
        self.0.save(path)
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 0.5,
        "expected {expected}, got {actual}"
    );
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn device_rectangle_lands_in_points() {
    init_tracing();
    let mut store = StoreBuilder::new();
    store.annotation(
        AnnotationClass::Highlight,
        "0 0 0 0 284 231 46 21",
        "0 0 0 0 284 231 46 21",
    );
    let d = MemoryDocument::with_pages([MemoryPage::new(612.0, 792.0)]);

    let run = annotate(&store.bytes(), "", &d, &AnnotatorConfig::default()).unwrap();

    assert_eq!(run.annotations.len(), 1);
    let a = &run.annotations[0];
    assert_eq!(a.source, MatchSource::GeometryOnly);
    assert_close(a.rect.x0, 204.5);
    assert_close(a.rect.y0, 166.3);
    assert_close(a.rect.x1, 237.6);
    assert_close(a.rect.y1, 181.4);
    assert_eq!(run.stats.geometry_only, 1);
    assert!(run.misses.is_empty());
}

#[test]
fn highlight_note_and_bookmark_end_to_end() {
    init_tracing();
    let mut store = StoreBuilder::new();
    store
        .annotation(
            AnnotationClass::Highlight,
            "0 0 0 0 246 139 50 14",
            "0 0 0 0 371 139 10 14",
        )
        .note("0 0 0 0 246 139 10 10", "remember this")
        .annotation(AnnotationClass::Bookmark, "0 0 0 0", "0 0 0 0");
    let mut d = doc(&["The art of design is choosing the right concepts."]);
    let text = clippings(&[(1, "choosing the right")]);
    let config = AnnotatorConfig::default();

    let mut run = annotate(&store.bytes(), &text, &d, &config).unwrap();

    assert_eq!(run.page_offset, 0);
    assert_eq!(run.stats.store_annotations, 3);
    assert_eq!(run.stats.clippings, 1);
    assert_eq!(run.stats.unified, 1);
    assert_eq!(run.annotations.len(), 2);

    let unified = &run.annotations[0];
    assert_eq!(unified.kind, AnnotationKind::Note);
    assert_eq!(unified.content, "remember this");
    assert_eq!(unified.highlight_content.as_deref(), Some("choosing the right"));
    assert_eq!(unified.source, MatchSource::TextMatched);
    assert_eq!(unified.rect, Rect::new(177.0, 100.0, 267.0, 110.0));
    assert_eq!(run.annotations[1].kind, AnnotationKind::Bookmark);

    apply(&mut run, &mut d, &config);
    assert_eq!(run.stats.rendered, 2);
    assert_eq!(run.stats.render_failures, 0);
    match &d.added()[0] {
        AddedAnnotation::Highlight { rects, markup, .. } => {
            assert_eq!(rects, &vec![Rect::new(177.0, 100.0, 267.0, 110.0)]);
            assert_eq!(markup.title, "Kindle Note");
            assert_eq!(markup.contents, "remember this");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        d.added()[1],
        AddedAnnotation::Bookmark {
            page: 0,
            title: "Page 1".into()
        }
    );
}

#[test]
fn unification_does_not_depend_on_store_order() {
    let d = doc(&["The art of design is choosing the right concepts."]);
    let text = clippings(&[(1, "choosing the right")]);
    let config = AnnotatorConfig::default();

    let mut highlight_first = StoreBuilder::new();
    highlight_first
        .annotation(
            AnnotationClass::Highlight,
            "0 0 0 0 246 139 50 14",
            "0 0 0 0 371 139 10 14",
        )
        .note("0 0 0 0 371 139 10 10", "at the end");
    let mut note_first = StoreBuilder::new();
    note_first
        .note("0 0 0 0 371 139 10 10", "at the end")
        .annotation(
            AnnotationClass::Highlight,
            "0 0 0 0 246 139 50 14",
            "0 0 0 0 371 139 10 14",
        );

    let a = annotate(&highlight_first.bytes(), &text, &d, &config).unwrap();
    let b = annotate(&note_first.bytes(), &text, &d, &config).unwrap();
    assert_eq!(a.annotations.len(), 1);
    assert!(a.annotations[0].is_unified());
    assert_eq!(a.annotations, b.annotations);
}

#[test]
fn geometry_only_highlight_unifies_with_note_at_its_end() {
    init_tracing();
    let d = doc(&["The art of design is choosing the right concepts."]);
    let mut store = StoreBuilder::new();
    // The end position is 20 units wide, so the drawn end lies 14.4pt to
    // the right of where the note is stored.
    store
        .annotation(
            AnnotationClass::Highlight,
            "0 0 0 0 246 139 50 14",
            "0 0 0 0 371 139 20 14",
        )
        .note("0 0 0 0 371 139 20 14", "ends here");

    let run = annotate(&store.bytes(), "", &d, &AnnotatorConfig::default()).unwrap();

    assert_eq!(run.stats.unified, 1);
    assert_eq!(run.annotations.len(), 1);
    let a = &run.annotations[0];
    assert_eq!(a.kind, AnnotationKind::Note);
    assert_eq!(a.source, MatchSource::GeometryOnly);
    assert_eq!(a.content, "ends here");
    assert!(a
        .highlight_content
        .as_deref()
        .is_some_and(|t| t.starts_with("choosing the right")));
}

#[test]
fn repeated_runs_are_identical() {
    let d = doc(&["The art of design is choosing the right concepts."]);
    let text = clippings(&[(1, "choosing the right")]);
    let mut store = StoreBuilder::new();
    store.highlight_cache(&[("0 0 0 0 246 139 50 14", "0 0 0 0 371 139 10 14")]);
    let config = AnnotatorConfig::default();

    let first = annotate(&store.bytes(), &text, &d, &config).unwrap();
    let second = annotate(&store.bytes(), &text, &d, &config).unwrap();
    assert_eq!(first.annotations, second.annotations);
    assert_eq!(first.stats, second.stats);
    assert_eq!(first.stats.text_matched, 1);
}

#[test]
fn multi_line_device_highlight_becomes_three_quads() {
    let lines: Vec<String> = (0..20)
        .map(|i| format!("line number {i:02} of the page text"))
        .collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let mut d = doc(&refs);
    let mut store = StoreBuilder::new();
    // Line 1 (y=114pt) to line 3 (y=142pt).
    store.annotation(
        AnnotationClass::Highlight,
        "0 0 0 0 200 158 20 14",
        "0 0 0 0 250 197 20 14",
    );
    let config = AnnotatorConfig::default();

    let mut run = annotate(&store.bytes(), "", &d, &config).unwrap();
    let a = &run.annotations[0];
    assert_eq!(a.secondary_rects.len(), 3);
    assert_eq!(a.secondary_rects[0].x0, a.start.x);
    assert_eq!(a.secondary_rects[2].x1, a.end.x);
    assert!(a.secondary_rects[1].x0 <= a.secondary_rects[2].x0);

    apply(&mut run, &mut d, &config);
    match &d.added()[0] {
        AddedAnnotation::Highlight { rects, .. } => assert_eq!(rects.len(), 3),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn highlight_ending_at_the_left_margin_keeps_its_last_line() {
    let lines: Vec<String> = (0..20)
        .map(|i| format!("line number {i:02} of the page text"))
        .collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let mut d = doc(&refs);
    let mut store = StoreBuilder::new();
    // Ends 2.9pt past the left margin of line 3.
    store.annotation(
        AnnotationClass::Highlight,
        "0 0 0 0 200 158 20 14",
        "0 0 0 0 98 197 6 14",
    );
    let config = AnnotatorConfig::default();

    let mut run = annotate(&store.bytes(), "", &d, &config).unwrap();
    let a = &run.annotations[0];
    assert_eq!(a.secondary_rects.len(), 3);
    let last = a.secondary_rects[2];
    assert_eq!(last.x1, a.end.x);
    assert!(last.width() > 9.99, "last line is {last:?}");

    apply(&mut run, &mut d, &config);
    match &d.added()[0] {
        AddedAnnotation::Highlight { rects, .. } => assert_eq!(rects.len(), 3),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unreadable_text_layer_degrades_to_device_geometry() {
    init_tracing();
    let d = UnreadableText(doc(&["The art of design is choosing the right concepts."]));
    let mut store = StoreBuilder::new();
    store.annotation(
        AnnotationClass::Highlight,
        "0 0 0 0 246 139 50 14",
        "0 0 0 0 371 139 10 14",
    );
    let text = clippings(&[(1, "choosing the right")]);

    let run = annotate(&store.bytes(), &text, &d, &AnnotatorConfig::default()).unwrap();

    assert_eq!(run.page_offset, 0);
    assert_eq!(run.annotations.len(), 1);
    let a = &run.annotations[0];
    assert_eq!(a.source, MatchSource::GeometryOnly);
    assert_eq!(a.content, "choosing the right");
    assert_close(a.rect.x0, 177.1);
    assert_close(a.rect.x1, 274.3);
    assert_eq!(run.misses.len(), 1);
    assert_eq!(run.stats.geometry_only, 1);
}

#[test]
fn short_text_keeps_only_the_nearest_occurrence() {
    // 80 occurrences of "the", four per line.
    let lines = vec!["the the the the"; 20];
    let d = doc(&lines);
    let mut store = StoreBuilder::new();
    // Third word of line 5: x=112pt, y=170pt.
    store.annotation(
        AnnotationClass::Highlight,
        "0 0 0 0 156 236 20 14",
        "0 0 0 0 156 236 20 14",
    );
    let text = clippings(&[(1, "the")]);

    let run = annotate(&store.bytes(), &text, &d, &AnnotatorConfig::default()).unwrap();
    let a = &run.annotations[0];
    assert_eq!(a.source, MatchSource::TextMatched);
    assert_eq!(a.rect, Rect::new(112.0, 170.0, 127.0, 180.0));
    assert!(a.secondary_rects.is_empty());
}

#[test]
fn one_substituted_character_still_matches() {
    let mut d = doc(&[
        "Software design is the art of choosing",
        "the right concepts and composing them well.",
    ]);
    let mut store = StoreBuilder::new();
    store.annotation(
        AnnotationClass::Highlight,
        "0 0 0 0 100 139 10 14",
        "0 0 0 0 390 158 10 14",
    );
    let text = clippings(&[(
        1,
        "Software design is the art of ch0osing the right concepts and composing them well.",
    )]);
    let config = AnnotatorConfig::default();

    let mut run = annotate(&store.bytes(), &text, &d, &config).unwrap();
    assert!(run.misses.is_empty());
    let a = &run.annotations[0];
    assert_eq!(a.source, MatchSource::TextMatched);
    assert_eq!(a.secondary_rects.len(), 2);
    assert_eq!(a.start.x, 72.0);
    // "the right concepts and composing them well." ends at 72 + 43 * 5.
    assert_eq!(a.secondary_rects[1].x1, 287.0);

    apply(&mut run, &mut d, &config);
    assert_eq!(run.stats.rendered, 1);
}

#[test]
fn text_that_is_not_on_the_page_is_reported() {
    let d = doc(&["Nothing relevant is printed here."]);
    let mut store = StoreBuilder::new();
    store.annotation(
        AnnotationClass::Highlight,
        "0 0 0 0 100 139 50 14",
        "0 0 0 0 100 139 50 14",
    );
    let text = clippings(&[(1, "entirely different words from another book")]);

    let run = annotate(&store.bytes(), &text, &d, &AnnotatorConfig::default()).unwrap();
    assert_eq!(run.annotations.len(), 1);
    assert_eq!(run.annotations[0].source, MatchSource::GeometryOnly);
    assert_eq!(run.misses.len(), 1);
    assert_eq!(run.misses[0].page, 0);
    assert_eq!(run.stats.geometry_only, 1);
}

#[test]
fn records_past_the_last_page_become_warnings() {
    let d = doc(&["only one page"]);
    let mut store = StoreBuilder::new();
    store
        .annotation(AnnotationClass::Bookmark, "0 0 0 0", "0 0 0 0")
        .annotation(AnnotationClass::Bookmark, "9 0 0 0", "9 0 0 0");

    let run = annotate(&store.bytes(), "", &d, &AnnotatorConfig::default()).unwrap();
    assert_eq!(run.annotations.len(), 1);
    assert_eq!(run.warnings.len(), 1);
    assert!(run.warnings[0].to_string().contains("page 9"));
}
