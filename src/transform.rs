//! Device units to document points.
//!
//! Device coordinates are hundredths of an inch measured from the top-left of
//! the *uncropped* page. Document space is points measured from the top-left
//! of the visible (cropped) page, so the crop offset is subtracted after
//! scaling and the result is clamped to the visible page.

use krds::Position;
use tracing::debug;

use crate::config::CoordinateConfig;
use crate::document::Document;
use crate::error::AnnotatorError;
use crate::geometry::{Point, Rect};

/// Anything further outside the page than this is logged.
const EXTREME_CLAMP_PT: f64 = 72.0;

/// The visible page as the transform needs it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFrame {
    pub width: f64,
    pub height: f64,
    /// Top-left of the crop box relative to the media box.
    pub crop_offset: Point,
}

impl PageFrame {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            crop_offset: Point::default(),
        }
    }

    pub fn with_crop_offset(mut self, x: f64, y: f64) -> Self {
        self.crop_offset = Point::new(x, y);
        self
    }

    /// Read a page's size and crop offset from the document.
    pub fn of(doc: &dyn Document, page: usize) -> Result<Self, AnnotatorError> {
        let rect = doc.page_rect(page)?;
        let crop = doc.page_crop_rect(page)?;
        Ok(Self {
            width: rect.width(),
            height: rect.height(),
            crop_offset: crop.top_left(),
        })
    }
}

/// Scale a device coordinate, remove the crop offset, clamp to `[0, extent]`.
pub fn transform_coordinate(
    device: f64,
    crop_offset: f64,
    extent: f64,
    coords: &CoordinateConfig,
) -> f64 {
    let value = device * coords.scale() - crop_offset;
    if value < -EXTREME_CLAMP_PT || value > extent + EXTREME_CLAMP_PT {
        debug!(
            "Clamping coordinate {:.1}pt far outside page extent {:.1}pt",
            value, extent
        );
    }
    value.clamp(0.0, extent.max(0.0))
}

/// Scale a device extent and clamp it so `origin + result <= extent`.
///
/// Zero or negative extents become 0.
pub fn transform_extent(device: f64, origin: f64, extent: f64, coords: &CoordinateConfig) -> f64 {
    if device <= 0.0 {
        return 0.0;
    }
    let available = (extent - origin).max(0.0);
    (device * coords.scale()).min(available)
}

/// Convert a device-space box into a clamped document rectangle.
pub fn transform_rect(
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    frame: &PageFrame,
    coords: &CoordinateConfig,
) -> Rect {
    let doc_x = transform_coordinate(x, frame.crop_offset.x, frame.width, coords);
    let doc_y = transform_coordinate(y, frame.crop_offset.y, frame.height, coords);
    let doc_w = transform_extent(width, doc_x, frame.width, coords);
    let doc_h = transform_extent(height, doc_y, frame.height, coords);
    Rect::from_xywh(doc_x, doc_y, doc_w, doc_h)
}

/// Convert a position's box. Invalid positions map to the page origin.
pub fn transform_position(pos: &Position, frame: &PageFrame, coords: &CoordinateConfig) -> Rect {
    transform_rect(
        f64::from(pos.x),
        f64::from(pos.y),
        f64::from(pos.width),
        f64::from(pos.height),
        frame,
        coords,
    )
}
