//! # kindle-pdf-annotator
//!
//! Put Kindle highlights, notes and bookmarks back onto the PDF they were
//! made in.
//!
//! ## Why this crate?
//!
//! A Kindle keeps the annotations for a side-loaded PDF in a binary sidecar
//! store (`.pds` / `.pdt`) in its own coordinate system, and separately
//! appends the highlighted text to `My Clippings.txt`. Neither is enough on
//! its own: the store knows roughly *where* but not *what*, the clippings know
//! *what* but only to the page. This crate reconciles the two, finds the
//! highlighted text on the page, and draws proper multi-line highlights and
//! notes into a copy of the PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .pds/.pdt ──► krds decoder ──► annotation records ─┐
//!                                                    ├─ 1. Pair      by page, nearest device y
//! My Clippings.txt ──► clippings parser ─────────────┘
//!                                                    ├─ 2. Convert   device units → points
//!                                                    ├─ 3. Match     5 text strategies, nearest hit
//!                                                    ├─ 4. Geometry  column-aware per-line quads
//!                                                    ├─ 5. Dedup     duplicates, note ⇄ highlight
//!                                                    └─ 6. Render    highlights, notes, bookmarks
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kindle_pdf_annotator::{annotate_pdf, AnnotatorConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AnnotatorConfig::builder().book_filter("my book").build()?;
//!     let run = annotate_pdf(
//!         "my book.sdr/my book.pds",
//!         Some(Path::new("My Clippings.txt")),
//!         "my book.pdf",
//!         "my book (annotated).pdf",
//!         &config,
//!     )?;
//!     eprintln!(
//!         "{} annotations, {} text-matched, {} misses",
//!         run.annotations.len(),
//!         run.stats.text_matched,
//!         run.misses.len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Without pdfium
//!
//! [`annotate`] takes any [`Document`], so the reconstruction can run against
//! [`MemoryDocument`] (or your own PDF backend) and the result inspected
//! before anything is drawn:
//!
//! ```rust
//! use kindle_pdf_annotator::{annotate, AnnotatorConfig, MemoryDocument, MemoryPage};
//!
//! let doc = MemoryDocument::with_pages([
//!     MemoryPage::new(612.0, 792.0).text_line(72.0, 100.0, 12.0, "Call me Ishmael."),
//! ]);
//! let run = annotate(&[], "", &doc, &AnnotatorConfig::default());
//! assert!(run.is_err()); // an empty buffer is not a store
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod annotate;
pub mod annotations;
pub mod clippings;
pub mod columns;
pub mod config;
pub mod dedup;
pub mod document;
pub mod error;
pub mod geometry;
pub mod matching;
pub mod output;
pub mod page_offset;
pub mod progress;
pub mod reconcile;
pub mod render;
pub mod snake;
pub mod transform;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use annotate::{annotate, annotate_pdf, apply, save_atomic};
pub use annotations::{AnnotationKind, AnnotationRecord};
pub use clippings::{parse_clippings, parse_clippings_file, Clipping, ClippingKind};
pub use columns::{Column, ColumnLayout};
pub use config::{AnnotatorConfig, AnnotatorConfigBuilder, CoordinateConfig, RenderStyle};
pub use document::{Document, Markup, MemoryDocument, MemoryPage, PdfiumDocument};
pub use error::{AnnotatorError, MatchMiss, ParseWarning};
pub use geometry::{Point, Rect};
pub use output::{AnnotationRun, MatchSource, ReconciledAnnotation, RunStats};
pub use progress::{AnnotationProgress, NoopProgress, Stage};
pub use transform::{transform_position, PageFrame};

pub use krds::{KrdsError, Position, Store};
