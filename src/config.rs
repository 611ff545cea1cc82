//! Configuration types for annotation reconstruction.
//!
//! Everything the pipeline needs to know is passed in explicitly through
//! [`AnnotatorConfig`], built via its [`AnnotatorConfigBuilder`]. There is no
//! process-wide state: two runs with two configs never influence each other.
//!
//! The numeric defaults are calibration constants measured against real
//! devices. The pipeline only consumes them; deriving new ones is done
//! offline.

use crate::error::AnnotatorError;
use crate::progress::AnnotationProgress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Device-to-document unit conversion.
///
/// Device coordinates are hundredths of an inch; document coordinates are
/// PDF points. `points = units / device_units_per_inch * points_per_inch`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateConfig {
    /// Device units per inch. Default: 100.
    pub device_units_per_inch: f64,
    /// Document points per inch. Default: 72.
    pub points_per_inch: f64,
}

impl Default for CoordinateConfig {
    fn default() -> Self {
        Self {
            device_units_per_inch: 100.0,
            points_per_inch: 72.0,
        }
    }
}

impl CoordinateConfig {
    /// Multiplier from device units to points.
    pub fn scale(&self) -> f64 {
        self.points_per_inch / self.device_units_per_inch
    }

    fn validate(&self) -> Result<(), AnnotatorError> {
        if !(self.device_units_per_inch > 0.0 && self.points_per_inch > 0.0) {
            return Err(AnnotatorError::InvalidConfig(format!(
                "Coordinate units must be positive, got {} units/inch and {} points/inch",
                self.device_units_per_inch, self.points_per_inch
            )));
        }
        Ok(())
    }
}

/// Colours and titles used when writing annotations into the PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderStyle {
    /// Highlight colour as RGB. Default: yellow.
    pub highlight_color: (u8, u8, u8),
    pub highlight_title: String,
    pub note_title: String,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            highlight_color: (255, 255, 0),
            highlight_title: "Kindle Highlight".into(),
            note_title: "Kindle Note".into(),
        }
    }
}

/// Configuration for one reconstruction run.
///
/// # Example
/// ```rust
/// use kindle_pdf_annotator::AnnotatorConfig;
///
/// let config = AnnotatorConfig::builder()
///     .similarity_threshold(0.92)
///     .book_filter("my-thesis")
///     .build()
///     .unwrap();
/// assert_eq!(config.coordinates.points_per_inch, 72.0);
/// ```
#[derive(Clone)]
pub struct AnnotatorConfig {
    /// Device-to-document unit conversion.
    pub coordinates: CoordinateConfig,

    /// Minimum character-level similarity for an anchor-bounded extraction to
    /// be accepted. Range 0.5–1.0. Default: 0.90.
    ///
    /// Clippings logs contain occasional transcription errors. A single
    /// substituted character in a 40-character span still scores above 0.95,
    /// while two unrelated sentences rarely pass 0.6.
    pub similarity_threshold: f64,

    /// Search text at most this long counts as a "short word". Default: 3.
    pub short_text_max_chars: usize,

    /// A short word with more occurrences than this on a page keeps only the
    /// single nearest one. Default: 50.
    pub short_text_min_occurrences: usize,

    /// Vertical distance under which two hits count as the same line. Default: 5pt.
    pub same_line_tolerance: f64,

    /// Vertical distance under which two hits count as adjacent lines. Default: 25pt.
    pub adjacent_line_tolerance: f64,

    /// How far (in characters, each side) around the expected offset the
    /// anchor search looks. Default: 2000.
    pub anchor_window_chars: usize,

    /// Left edges within this distance belong to the same column. Default: 15pt.
    pub column_tolerance: f64,

    /// Lines a cluster needs before it counts as a column. Default: 10.
    pub min_column_lines: usize,

    /// Minimum gap between two columns' left edges. Default: 50pt.
    pub min_column_gap: f64,

    /// Maximum distance between a note and a highlight boundary for the two
    /// to be unified. Default: 5pt.
    pub unify_tolerance: f64,

    /// Line height used when the page has no text to measure. Default: 14pt.
    pub default_line_height: f64,

    /// Side length of the note marker rectangle. Default: 20pt.
    pub note_icon_size: f64,

    /// Pages either side of the naive mapping searched when detecting the
    /// clippings page offset. Default: 3.
    pub page_offset_search_radius: usize,

    /// Restrict clippings to titles containing this book identifier.
    pub book_filter: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// How annotations are drawn into the PDF.
    pub render: RenderStyle,

    /// Optional observer for pipeline events.
    pub progress: Option<Arc<dyn AnnotationProgress>>,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            coordinates: CoordinateConfig::default(),
            similarity_threshold: 0.90,
            short_text_max_chars: 3,
            short_text_min_occurrences: 50,
            same_line_tolerance: 5.0,
            adjacent_line_tolerance: 25.0,
            anchor_window_chars: 2000,
            column_tolerance: 15.0,
            min_column_lines: 10,
            min_column_gap: 50.0,
            unify_tolerance: 5.0,
            default_line_height: 14.0,
            note_icon_size: 20.0,
            page_offset_search_radius: 3,
            book_filter: None,
            password: None,
            render: RenderStyle::default(),
            progress: None,
        }
    }
}

impl fmt::Debug for AnnotatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotatorConfig")
            .field("coordinates", &self.coordinates)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("short_text_max_chars", &self.short_text_max_chars)
            .field("short_text_min_occurrences", &self.short_text_min_occurrences)
            .field("same_line_tolerance", &self.same_line_tolerance)
            .field("adjacent_line_tolerance", &self.adjacent_line_tolerance)
            .field("column_tolerance", &self.column_tolerance)
            .field("unify_tolerance", &self.unify_tolerance)
            .field("book_filter", &self.book_filter)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("render", &self.render)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn AnnotationProgress>"))
            .finish()
    }
}

impl AnnotatorConfig {
    /// Create a new builder for `AnnotatorConfig`.
    pub fn builder() -> AnnotatorConfigBuilder {
        AnnotatorConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnnotatorConfig`].
#[derive(Debug)]
pub struct AnnotatorConfigBuilder {
    config: AnnotatorConfig,
}

impl AnnotatorConfigBuilder {
    pub fn coordinates(mut self, coordinates: CoordinateConfig) -> Self {
        self.config.coordinates = coordinates;
        self
    }

    pub fn similarity_threshold(mut self, t: f64) -> Self {
        self.config.similarity_threshold = t.clamp(0.5, 1.0);
        self
    }

    pub fn short_text_max_chars(mut self, n: usize) -> Self {
        self.config.short_text_max_chars = n;
        self
    }

    pub fn short_text_min_occurrences(mut self, n: usize) -> Self {
        self.config.short_text_min_occurrences = n;
        self
    }

    pub fn same_line_tolerance(mut self, pt: f64) -> Self {
        self.config.same_line_tolerance = pt.max(0.0);
        self
    }

    pub fn adjacent_line_tolerance(mut self, pt: f64) -> Self {
        self.config.adjacent_line_tolerance = pt.max(0.0);
        self
    }

    pub fn anchor_window_chars(mut self, n: usize) -> Self {
        self.config.anchor_window_chars = n.max(100);
        self
    }

    pub fn column_tolerance(mut self, pt: f64) -> Self {
        self.config.column_tolerance = pt.max(0.0);
        self
    }

    pub fn min_column_lines(mut self, n: usize) -> Self {
        self.config.min_column_lines = n.max(1);
        self
    }

    pub fn min_column_gap(mut self, pt: f64) -> Self {
        self.config.min_column_gap = pt.max(0.0);
        self
    }

    pub fn unify_tolerance(mut self, pt: f64) -> Self {
        self.config.unify_tolerance = pt.max(0.0);
        self
    }

    pub fn default_line_height(mut self, pt: f64) -> Self {
        self.config.default_line_height = pt;
        self
    }

    pub fn note_icon_size(mut self, pt: f64) -> Self {
        self.config.note_icon_size = pt.max(1.0);
        self
    }

    pub fn page_offset_search_radius(mut self, pages: usize) -> Self {
        self.config.page_offset_search_radius = pages;
        self
    }

    pub fn book_filter(mut self, book: impl Into<String>) -> Self {
        self.config.book_filter = Some(book.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn render(mut self, style: RenderStyle) -> Self {
        self.config.render = style;
        self
    }

    pub fn progress(mut self, progress: Arc<dyn AnnotationProgress>) -> Self {
        self.config.progress = Some(progress);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnnotatorConfig, AnnotatorError> {
        let c = &self.config;
        c.coordinates.validate()?;
        if !(c.default_line_height > 0.0) {
            return Err(AnnotatorError::InvalidConfig(format!(
                "Default line height must be positive, got {}",
                c.default_line_height
            )));
        }
        if c.adjacent_line_tolerance < c.same_line_tolerance {
            return Err(AnnotatorError::InvalidConfig(format!(
                "Adjacent-line tolerance ({}) must not be smaller than same-line tolerance ({})",
                c.adjacent_line_tolerance, c.same_line_tolerance
            )));
        }
        Ok(self.config)
    }
}
