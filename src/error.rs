//! Error types for the kindle-pdf-annotator library.
//!
//! Three kinds of failure, handled three different ways:
//!
//! * [`AnnotatorError`]: **fatal**. The store is corrupt, the PDF cannot be
//!   opened or saved, or the configuration is invalid. Returned as `Err` from
//!   the top-level entry points.
//!
//! * [`ParseWarning`]: **skipped input**. A clipping block that does not
//!   parse, a position string that is garbage, an object the store decoder
//!   did not recognise. The record is dropped and the run continues.
//!
//! * [`MatchMiss`]: **degraded output**. No text-search strategy found a
//!   clipping's text in the document. The annotation keeps its
//!   coordinate-derived rectangle and is reported as geometry-only.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the kindle-pdf-annotator library.
#[derive(Debug, Error)]
pub enum AnnotatorError {
    // ── Store errors ──────────────────────────────────────────────────────
    /// The annotation store is not a reader data store or is corrupt.
    #[error("Annotation store could not be decoded: {0}")]
    Format(#[from] krds::KrdsError),

    /// An input file (store, clippings) could not be read.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Document errors ───────────────────────────────────────────────────
    /// The PDF could not be opened or parsed.
    #[error("Failed to open PDF '{path}': {detail}")]
    DocumentOpen { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The annotated PDF could not be written.
    #[error("Failed to save PDF '{path}': {detail}")]
    DocumentSave { path: PathBuf, detail: String },

    /// A page index past the end of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// The document backend rejected an operation on a page.
    #[error("Document operation '{operation}' failed on page {page}: {detail}")]
    DocumentOperation {
        operation: &'static str,
        page: usize,
        detail: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library in the working\n\
directory, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),
}

impl AnnotatorError {
    /// `true` for failures to open or save the document.
    pub fn is_document_io(&self) -> bool {
        matches!(
            self,
            AnnotatorError::DocumentOpen { .. }
                | AnnotatorError::PasswordRequired { .. }
                | AnnotatorError::WrongPassword { .. }
                | AnnotatorError::DocumentSave { .. }
        )
    }
}

/// An input record that was skipped.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum ParseWarning {
    /// A clippings block whose header lines did not parse.
    #[error("Clipping block {index}: {reason}")]
    MalformedClipping { index: usize, reason: String },

    /// An annotation whose position string did not parse.
    #[error("{kind} record has an unparseable position '{raw}'")]
    InvalidPosition { kind: String, raw: String },

    /// An annotation class this pipeline has no rendering for.
    #[error("Skipped {class} record")]
    UnsupportedClass { class: String },

    /// A record that points past the end of the document.
    #[error("{kind} record on page {page} is outside the document ({total} pages)")]
    PageOutOfRange {
        kind: String,
        page: usize,
        total: usize,
    },

    /// A record on a page the document backend could not measure.
    #[error("{kind} record on page {page} skipped: {detail}")]
    PageUnreadable {
        kind: String,
        page: usize,
        detail: String,
    },

    /// Something the store decoder skipped.
    #[error("Store: {0}")]
    Store(String),
}

/// No search strategy found a clipping's text on its page.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
#[error("No text match on page {page} for \"{content_prefix}\" (tried {strategies_tried} strategies)")]
pub struct MatchMiss {
    /// 0-based document page.
    pub page: usize,
    /// First 50 characters of the clipping text.
    pub content_prefix: String,
    pub strategies_tried: usize,
}
