//! pdfium-backed [`Document`].
//!
//! pdfium measures from the bottom-left of the media box with y growing
//! upwards; everything here is flipped into the top-left, y-down space of the
//! visible page before it leaves the module.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

use super::text_page::{Glyph, TextPage, Word};
use super::{check_page, Document, Markup};
use crate::error::AnnotatorError;
use crate::geometry::{Point, Rect};

/// Size of the icon drawn for point notes and bookmarks.
const ICON_SIZE: f32 = 20.0;

/// Bind to a pdfium library.
///
/// Tries `PDFIUM_LIB_PATH`, then a library in the working directory, then the
/// system library.
pub fn bind_pdfium() -> Result<Pdfium, AnnotatorError> {
    if let Ok(env_path) = std::env::var("PDFIUM_LIB_PATH") {
        if Path::new(&env_path).exists() {
            debug!("Binding pdfium from PDFIUM_LIB_PATH={}", env_path);
            return Pdfium::bind_to_library(&env_path)
                .map(Pdfium::new)
                .map_err(|e| {
                    AnnotatorError::PdfiumBindingFailed(format!("{}: {:?}", env_path, e))
                });
        }
        warn!("PDFIUM_LIB_PATH '{}' not found, trying other locations", env_path);
    }
    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| AnnotatorError::PdfiumBindingFailed(format!("{:?}", e)))
}

/// Crop box in pdfium user space.
#[derive(Debug, Clone, Copy)]
struct CropBox {
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
    /// Top-left of the crop box measured from the media box top-left.
    offset: Point,
}

impl CropBox {
    fn to_document(self, r: &PdfRect) -> Rect {
        Rect::new(
            f64::from(r.left().value - self.left),
            f64::from(self.top - r.top().value),
            f64::from(r.right().value - self.left),
            f64::from(self.top - r.bottom().value),
        )
        .normalized()
    }

    fn to_pdf(self, r: &Rect) -> PdfRect {
        PdfRect::new_from_values(
            self.top - r.y1 as f32,
            self.left + r.x0 as f32,
            self.top - r.y0 as f32,
            self.left + r.x1 as f32,
        )
    }

    fn width(self) -> f64 {
        f64::from(self.right - self.left)
    }

    fn height(self) -> f64 {
        f64::from(self.top - self.bottom)
    }
}

/// A PDF opened through pdfium.
pub struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
    path: PathBuf,
    text: RefCell<HashMap<usize, Rc<TextPage>>>,
}

impl<'a> PdfiumDocument<'a> {
    pub fn open(
        pdfium: &'a Pdfium,
        path: impl AsRef<Path>,
        password: Option<&'a str>,
    ) -> Result<Self, AnnotatorError> {
        let path = path.as_ref();
        let document = pdfium.load_pdf_from_file(path, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    AnnotatorError::WrongPassword {
                        path: path.to_path_buf(),
                    }
                } else {
                    AnnotatorError::PasswordRequired {
                        path: path.to_path_buf(),
                    }
                }
            } else {
                AnnotatorError::DocumentOpen {
                    path: path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;
        info!(
            "PDF loaded: {} ({} pages)",
            path.display(),
            document.pages().len()
        );
        Ok(Self {
            document,
            path: path.to_path_buf(),
            text: RefCell::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn page(&self, page: usize, operation: &'static str) -> Result<PdfPage<'a>, AnnotatorError> {
        check_page(page, self.page_count())?;
        let index = u16::try_from(page).map_err(|_| AnnotatorError::PageOutOfRange {
            page,
            total: self.page_count(),
        })?;
        self.document
            .pages()
            .get(index)
            .map_err(|e| op_error(operation, page, e))
    }

    fn crop_box(page: &PdfPage<'_>) -> CropBox {
        let media = page
            .boundaries()
            .media()
            .map(|b| b.bounds)
            .unwrap_or_else(|_| {
                PdfRect::new_from_values(0.0, 0.0, page.height().value, page.width().value)
            });
        let crop = page.boundaries().crop().map(|b| b.bounds).unwrap_or(media);
        CropBox {
            left: crop.left().value,
            top: crop.top().value,
            right: crop.right().value,
            bottom: crop.bottom().value,
            offset: Point::new(
                f64::from(crop.left().value - media.left().value),
                f64::from(media.top().value - crop.top().value),
            ),
        }
    }

    fn text_page(&self, page: usize) -> Result<Rc<TextPage>, AnnotatorError> {
        if let Some(cached) = self.text.borrow().get(&page) {
            return Ok(Rc::clone(cached));
        }
        let pdf_page = self.page(page, "extract_text")?;
        let crop = Self::crop_box(&pdf_page);
        let text = pdf_page
            .text()
            .map_err(|e| op_error("extract_text", page, e))?;
        let glyphs: Vec<Glyph> = text
            .chars()
            .iter()
            .filter_map(|c| {
                let ch = c.unicode_char()?;
                let rect = c
                    .loose_bounds()
                    .map(|b| crop.to_document(&b))
                    .unwrap_or_default();
                Some(Glyph::new(ch, rect))
            })
            .collect();
        let text_page = Rc::new(TextPage::from_glyph_stream(glyphs));
        debug!(
            "Page {}: {} text lines",
            page + 1,
            text_page.lines().len()
        );
        self.text.borrow_mut().insert(page, Rc::clone(&text_page));
        Ok(text_page)
    }

    fn add_icon_note(
        &mut self,
        page: usize,
        at: Point,
        text: &str,
        title: &str,
        operation: &'static str,
    ) -> Result<(), AnnotatorError> {
        let mut pdf_page = self.page(page, operation)?;
        let crop = Self::crop_box(&pdf_page);
        let icon = Rect::from_xywh(at.x, at.y, f64::from(ICON_SIZE), f64::from(ICON_SIZE));
        let mut annotation = pdf_page
            .annotations_mut()
            .create_text_annotation(text)
            .map_err(|e| op_error(operation, page, e))?;
        annotation
            .set_bounds(crop.to_pdf(&icon))
            .and_then(|_| annotation.set_creator(title))
            .map_err(|e| op_error(operation, page, e))?;
        Ok(())
    }
}

fn op_error(operation: &'static str, page: usize, e: PdfiumError) -> AnnotatorError {
    AnnotatorError::DocumentOperation {
        operation,
        page,
        detail: format!("{:?}", e),
    }
}

impl Document for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_rect(&self, page: usize) -> Result<Rect, AnnotatorError> {
        let crop = Self::crop_box(&self.page(page, "page_rect")?);
        Ok(Rect::new(0.0, 0.0, crop.width(), crop.height()))
    }

    fn page_crop_rect(&self, page: usize) -> Result<Rect, AnnotatorError> {
        let crop = Self::crop_box(&self.page(page, "page_crop_rect")?);
        Ok(Rect::from_xywh(
            crop.offset.x,
            crop.offset.y,
            crop.width(),
            crop.height(),
        ))
    }

    fn page_label(&self, page: usize) -> Option<String> {
        let pdf_page = self.page(page, "page_label").ok()?;
        pdf_page.label().map(str::to_string)
    }

    fn search_text(&self, page: usize, needle: &str) -> Result<Vec<Rect>, AnnotatorError> {
        Ok(self.text_page(page)?.search(needle))
    }

    fn extract_text(&self, page: usize) -> Result<String, AnnotatorError> {
        Ok(self.text_page(page)?.text())
    }

    fn extract_text_in_rect(&self, page: usize, rect: &Rect) -> Result<String, AnnotatorError> {
        Ok(self.text_page(page)?.text_in_rect(rect))
    }

    fn words(&self, page: usize) -> Result<Vec<Word>, AnnotatorError> {
        Ok(self.text_page(page)?.words())
    }

    fn line_rects(&self, page: usize) -> Result<Vec<Rect>, AnnotatorError> {
        Ok(self.text_page(page)?.line_rects())
    }

    fn add_highlight(
        &mut self,
        page: usize,
        rects: &[Rect],
        markup: &Markup,
    ) -> Result<(), AnnotatorError> {
        let Some(bounds) = Rect::union_all(rects) else {
            return Ok(());
        };
        let mut pdf_page = self.page(page, "add_highlight")?;
        let crop = Self::crop_box(&pdf_page);
        let err = |e| op_error("add_highlight", page, e);

        let mut annotation = pdf_page
            .annotations_mut()
            .create_highlight_annotation()
            .map_err(err)?;
        for rect in rects {
            annotation
                .attachment_points_mut()
                .create_attachment_point_at_end(PdfQuadPoints::from_rect(&crop.to_pdf(rect)))
                .map_err(err)?;
        }
        let (r, g, b) = markup.color;
        annotation.set_bounds(crop.to_pdf(&bounds)).map_err(err)?;
        annotation.set_stroke_color(PdfColor::new(r, g, b, 255)).map_err(err)?;
        annotation.set_creator(&markup.title).map_err(err)?;
        if !markup.contents.is_empty() {
            annotation.set_contents(&markup.contents).map_err(err)?;
        }
        Ok(())
    }

    fn add_point_note(
        &mut self,
        page: usize,
        at: Point,
        text: &str,
        title: &str,
    ) -> Result<(), AnnotatorError> {
        self.add_icon_note(page, at, text, title, "add_point_note")
    }

    /// pdfium cannot write outline entries, so a bookmark becomes a note icon
    /// in the page's top-left corner.
    fn add_bookmark(&mut self, page: usize, title: &str) -> Result<(), AnnotatorError> {
        self.add_icon_note(page, Point::default(), title, title, "add_bookmark")
    }

    fn save(&mut self, path: &Path) -> Result<(), AnnotatorError> {
        self.document
            .save_to_file(path)
            .map_err(|e| AnnotatorError::DocumentSave {
                path: path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;
        info!("Saved annotated PDF to {}", path.display());
        Ok(())
    }
}
