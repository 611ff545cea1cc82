//! Top-level entry points.
//!
//! [`annotate`] works out where every annotation belongs without touching the
//! document. [`apply`] draws a finished run. [`annotate_pdf`] does both for
//! files on disk and writes the result atomically.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::annotations;
use crate::clippings::{decode_text, parse_clippings};
use crate::config::AnnotatorConfig;
use crate::dedup::{deduplicate, unify};
use crate::document::{bind_pdfium, Document, PdfiumDocument};
use crate::error::AnnotatorError;
use crate::output::{AnnotationRun, MatchSource, RunStats};
use crate::page_offset::detect_page_offset;
use crate::progress::Stage;
use crate::reconcile::{build_geometry, reconcile};
use crate::render::render_annotations;

/// Reconstruct every annotation in a reader data store against `doc`.
///
/// `clippings_text` is the contents of a clippings file (empty if there is
/// none); it supplies the highlighted text that lets highlights be placed by
/// text search instead of device coordinates alone.
///
/// # Errors
/// Only a store that cannot be decoded is fatal. Unparseable records, and
/// records on pages the backend cannot measure, come back as
/// [`AnnotationRun::warnings`]. Text that could not be found or searched
/// comes back as [`AnnotationRun::misses`].
pub fn annotate(
    store_bytes: &[u8],
    clippings_text: &str,
    doc: &dyn Document,
    config: &AnnotatorConfig,
) -> Result<AnnotationRun, AnnotatorError> {
    let started = Instant::now();
    let progress = config.progress.as_deref();

    // ── Step 1: Decode the store ─────────────────────────────────────────
    let store = krds::decode(store_bytes)?;
    let (records, mut warnings) = annotations::from_store(&store);
    info!("Store holds {} annotation records", records.len());
    if let Some(cb) = progress {
        cb.on_stage_start(Stage::DecodeStore, records.len());
    }

    // ── Step 2: Parse clippings ──────────────────────────────────────────
    let (clippings, clipping_warnings) =
        parse_clippings(clippings_text, config.book_filter.as_deref());
    warnings.extend(clipping_warnings);
    debug!("{} clippings for this book", clippings.len());
    if let Some(cb) = progress {
        cb.on_stage_start(Stage::ParseClippings, clippings.len());
    }

    let mut stats = RunStats {
        store_annotations: records.len(),
        clippings: clippings.len(),
        ..RunStats::default()
    };

    // ── Step 3: Page offset ──────────────────────────────────────────────
    let page_offset = detect_page_offset(doc, &clippings, config);

    // ── Step 4: Pair, convert and text-match ─────────────────────────────
    if let Some(cb) = progress {
        cb.on_stage_start(Stage::Reconcile, records.len());
    }
    let reconciled = reconcile(doc, records, &clippings, page_offset, config);
    warnings.extend(reconciled.warnings);
    let mut resolved = reconciled.annotations;
    if let Some(cb) = progress {
        for a in &resolved {
            cb.on_annotation_resolved(a.page, a.source);
        }
        for miss in &reconciled.misses {
            cb.on_match_miss(miss);
        }
    }
    for miss in &reconciled.misses {
        warn!("{}", miss);
    }

    // ── Step 5: Per-line geometry ────────────────────────────────────────
    if let Some(cb) = progress {
        cb.on_stage_start(Stage::BuildGeometry, resolved.len());
    }
    build_geometry(doc, &mut resolved, config);

    // ── Step 6: Duplicates and unification ───────────────────────────────
    if let Some(cb) = progress {
        cb.on_stage_start(Stage::Deduplicate, resolved.len());
    }
    let (deduped, duplicates_removed) = deduplicate(resolved);
    let (annotations, unified) = unify(deduped, config.unify_tolerance);

    // ── Step 7: Stats ────────────────────────────────────────────────────
    stats.duplicates_removed = duplicates_removed;
    stats.unified = unified;
    stats.text_matched = annotations
        .iter()
        .filter(|a| a.source == MatchSource::TextMatched)
        .count();
    stats.geometry_only = annotations.len() - stats.text_matched;

    info!(
        "Reconciled {} annotations ({} text-matched, {} geometry-only, {} misses) in {}ms",
        annotations.len(),
        stats.text_matched,
        stats.geometry_only,
        reconciled.misses.len(),
        started.elapsed().as_millis()
    );
    if let Some(cb) = progress {
        cb.on_complete(&stats);
    }

    Ok(AnnotationRun {
        annotations,
        stats,
        warnings,
        misses: reconciled.misses,
        page_offset,
    })
}

/// Draw a run's annotations into `doc` and record the counts in its stats.
///
/// Drawing failures are counted in [`RunStats::render_failures`]; they never
/// abort the run.
pub fn apply(run: &mut AnnotationRun, doc: &mut dyn Document, config: &AnnotatorConfig) {
    if let Some(cb) = config.progress.as_deref() {
        cb.on_stage_start(Stage::Render, run.annotations.len());
    }
    let counts = render_annotations(doc, &run.annotations, &config.render);
    run.stats.rendered = counts.rendered;
    run.stats.render_failures = counts.failures;
    info!(
        "Drew {}/{} annotations",
        counts.rendered,
        run.annotations.len()
    );
}

/// Annotate a PDF on disk.
///
/// Reads the store and (optionally) the clippings file, reconstructs the
/// annotations against `pdf_in`, and writes the annotated copy to `pdf_out`.
/// The output is written to a temporary file next to `pdf_out` and renamed
/// into place, so a failed run never leaves a partial PDF behind.
pub fn annotate_pdf(
    store_path: impl AsRef<Path>,
    clippings_path: Option<&Path>,
    pdf_in: impl AsRef<Path>,
    pdf_out: impl AsRef<Path>,
    config: &AnnotatorConfig,
) -> Result<AnnotationRun, AnnotatorError> {
    let store_path = store_path.as_ref();
    let pdf_out = pdf_out.as_ref();
    info!("Annotating {} from {}", pdf_in.as_ref().display(), store_path.display());

    // ── Step 1: Read inputs ──────────────────────────────────────────────
    let store_bytes = read(store_path)?;
    let clippings_text = match clippings_path {
        Some(path) => decode_text(&read(path)?),
        None => String::new(),
    };

    // ── Step 2: Open the document ────────────────────────────────────────
    let pdfium = bind_pdfium()?;
    let mut doc = PdfiumDocument::open(&pdfium, pdf_in, config.password.as_deref())?;

    // ── Step 3: Reconstruct and draw ─────────────────────────────────────
    let mut run = annotate(&store_bytes, &clippings_text, &doc, config)?;
    apply(&mut run, &mut doc, config);

    // ── Step 4: Atomic save ──────────────────────────────────────────────
    save_atomic(&mut doc, pdf_out)?;
    Ok(run)
}

/// Save through a temporary file in the destination directory, then rename.
pub fn save_atomic(doc: &mut dyn Document, path: &Path) -> Result<(), AnnotatorError> {
    let save_err = |detail: String| AnnotatorError::DocumentSave {
        path: path.to_path_buf(),
        detail,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| save_err(e.to_string()))?;

    let tmp = tempfile::Builder::new()
        .prefix(".annotated-")
        .suffix(".pdf")
        .tempfile_in(dir)
        .map_err(|e| save_err(e.to_string()))?;
    doc.save(tmp.path())?;
    tmp.persist(path).map_err(|e| save_err(e.error.to_string()))?;
    debug!("Renamed temporary output into {}", path.display());
    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>, AnnotatorError> {
    std::fs::read(path).map_err(|source| AnnotatorError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })
}
