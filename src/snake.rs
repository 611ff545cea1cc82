//! Multi-line highlight geometry.
//!
//! A device draws a highlight that spans several lines as a "snake": the
//! first line from the start point to the right margin, every middle line
//! from margin to margin, and the last line from the left margin to the end
//! point. Interior word boundaries are ignored.

use tracing::debug;

use crate::columns::{Column, ColumnLayout};
use crate::config::AnnotatorConfig;
use crate::document::Document;
use crate::error::AnnotatorError;
use crate::geometry::{Point, Rect};

/// Share of the space between the text's right edge and the mirrored left
/// margin that a full line reaches into.
const RIGHT_MARGIN_REACH: f64 = 0.95;
/// Narrowest quad: single-line highlights and the first and last lines of a
/// snake are widened to this.
const MIN_LINE_WIDTH: f64 = 10.0;
/// Top margin assumed when a page has no text.
const DEFAULT_TOP: f64 = 50.0;

/// What the geometry builder knows about one page.
#[derive(Debug, Clone)]
pub struct PageGeometry {
    page: Rect,
    layout: ColumnLayout,
    /// Leftmost and rightmost word edges.
    text_left: f64,
    text_right: f64,
    text_top: f64,
    line_pitch: f64,
    line_height: f64,
}

impl PageGeometry {
    /// Measure a document page.
    pub fn measure(
        doc: &dyn Document,
        page: usize,
        config: &AnnotatorConfig,
    ) -> Result<Self, AnnotatorError> {
        let page_rect = doc.page_rect(page)?;
        let lines = doc.line_rects(page)?;
        let words: Vec<Rect> = doc.words(page)?.into_iter().map(|w| w.rect).collect();
        Ok(Self::from_parts(page_rect, &lines, &words, config))
    }

    pub fn from_parts(
        page: Rect,
        lines: &[Rect],
        words: &[Rect],
        config: &AnnotatorConfig,
    ) -> Self {
        let layout = ColumnLayout::detect(lines, &page, config);
        let fallback = &layout.columns[0];
        let text = Rect::union_all(words);

        let mut heights: Vec<f64> = lines.iter().map(Rect::height).filter(|h| *h > 0.0).collect();
        let line_height = median(&mut heights).unwrap_or(config.default_line_height);

        let mut tops: Vec<f64> = lines.iter().map(|l| l.y0).collect();
        tops.sort_by(f64::total_cmp);
        let mut pitches: Vec<f64> = tops
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|d| *d > line_height * 0.5 && *d < line_height * 3.0)
            .collect();
        let line_pitch = median(&mut pitches).unwrap_or(config.default_line_height);

        let geometry = Self {
            page,
            text_left: text.map_or(fallback.left, |t| t.x0),
            text_right: text.map_or(fallback.right, |t| t.x1),
            text_top: text.map_or(DEFAULT_TOP, |t| t.y0),
            layout,
            line_pitch,
            line_height,
        };
        debug!(
            "Page geometry: text {:.1}-{:.1}, pitch {:.1}, line height {:.1}, {} column(s)",
            geometry.text_left,
            geometry.text_right,
            geometry.line_pitch,
            geometry.line_height,
            geometry.layout.columns.len()
        );
        geometry
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn line_height(&self) -> f64 {
        self.line_height
    }

    pub fn line_pitch(&self) -> f64 {
        self.line_pitch
    }

    /// Left and right margins for text at `at`.
    pub fn margins(&self, at: Point) -> (f64, f64) {
        if self.layout.is_multi_column() {
            if let Some(c) = self.layout.column_for(at.x, at.y) {
                return (c.left, c.right);
            }
        }
        let bound = self.page.width() - self.text_left;
        let right = if bound > self.text_right {
            self.text_right + RIGHT_MARGIN_REACH * (bound - self.text_right)
        } else {
            self.text_right
        };
        (self.text_left, right.min(self.page.width()))
    }

    /// Lines a highlight from `start` to `end` covers.
    pub fn line_count(&self, start: Point, end: Point) -> usize {
        let dy = (end.y - start.y).max(0.0);
        ((dy / self.line_pitch).round() as usize + 1).max(1)
    }

    /// One rectangle per line from `start` (top-left of the first line) to
    /// `end` (right edge of the last line, at that line's top).
    pub fn snake(&self, start: Point, end: Point) -> Vec<Rect> {
        if let (Some(a), Some(b)) = (self.column_of(start), self.column_of(end)) {
            if a != b {
                return self.split_across_columns(start, end, &a, &b);
            }
        }
        self.snake_in_column(start, end)
    }

    /// A two-line block at the top of the text for annotations with no
    /// usable position.
    pub fn fallback_block(&self) -> Vec<Rect> {
        let (left, right) = self.margins(Point::new(self.text_left, self.text_top));
        (0..2)
            .map(|i| {
                let y = self.text_top + i as f64 * self.line_pitch;
                Rect::new(left, y, right, y + self.line_height)
            })
            .collect()
    }

    fn column_of(&self, p: Point) -> Option<Column> {
        if !self.layout.is_multi_column() {
            return None;
        }
        self.layout.column_for(p.x, p.y).copied()
    }

    fn split_across_columns(&self, start: Point, end: Point, a: &Column, b: &Column) -> Vec<Rect> {
        debug!("Highlight crosses columns, building two snakes");
        let rows = ((a.bottom - start.y).max(0.0) / self.line_pitch).floor();
        let end_a = Point::new(a.right, start.y + rows * self.line_pitch);
        let start_b = Point::new(b.left, b.top);
        let mut quads = self.snake_in_column(start, end_a);
        quads.extend(self.snake_in_column(start_b, end));
        quads
    }

    fn snake_in_column(&self, start: Point, end: Point) -> Vec<Rect> {
        let n = self.line_count(start, end);
        let h = self.line_height;
        let page_w = self.page.width();

        if n == 1 {
            let x0 = start.x.min(end.x);
            let mut x1 = start.x.max(end.x);
            if x1 - x0 < MIN_LINE_WIDTH {
                x1 = (x0 + MIN_LINE_WIDTH).min(page_w);
            }
            return vec![Rect::new(x0, start.y, x1, start.y + h)];
        }

        let step = (end.y - start.y) / (n - 1) as f64;
        let (left, right) = self.margins(start);
        let mut quads = Vec::with_capacity(n);
        for i in 0..n {
            let y = start.y + i as f64 * step;
            let (x0, x1) = if i == 0 {
                (start.x, right.max(start.x))
            } else if i == n - 1 {
                (left.min(end.x), end.x)
            } else {
                (left, right)
            };
            quads.push(Rect::new(x0, y, x1, y + h));
        }

        let mut quads = if self.layout.is_multi_column() {
            self.layout.constrain_quads(&quads)
        } else {
            quads
        };

        // The first line grows rightwards from its start, the last line
        // leftwards from its end.
        if let Some(first) = quads.first_mut() {
            if first.width() < MIN_LINE_WIDTH {
                first.x1 = (first.x0 + MIN_LINE_WIDTH).min(page_w);
                first.x0 = first.x0.min(first.x1 - MIN_LINE_WIDTH).max(0.0);
            }
        }
        if let Some(last) = quads.last_mut() {
            if last.width() < MIN_LINE_WIDTH {
                last.x0 = (last.x1 - MIN_LINE_WIDTH).max(0.0);
            }
        }
        quads
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    Some(values[values.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Rect {
        Rect::new(0.0, 0.0, 612.0, 792.0)
    }

    /// Single column of 20 lines: left 72, right 540, 10pt tall, 14pt pitch.
    fn single_column() -> PageGeometry {
        let lines: Vec<Rect> = (0..20)
            .map(|i| {
                let y = 100.0 + i as f64 * 14.0;
                Rect::new(72.0, y, 540.0, y + 10.0)
            })
            .collect();
        PageGeometry::from_parts(page(), &lines, &lines, &AnnotatorConfig::default())
    }

    fn two_columns() -> PageGeometry {
        let mut lines = Vec::new();
        for i in 0..20 {
            let y = 100.0 + i as f64 * 14.0;
            lines.push(Rect::new(72.0, y, 290.0, y + 10.0));
            lines.push(Rect::new(320.0, y, 540.0, y + 10.0));
        }
        PageGeometry::from_parts(page(), &lines, &lines, &AnnotatorConfig::default())
    }

    #[test]
    fn measures_pitch_and_height() {
        let g = single_column();
        assert_eq!(g.line_pitch(), 14.0);
        assert_eq!(g.line_height(), 10.0);
    }

    #[test]
    fn empty_page_uses_defaults() {
        let g = PageGeometry::from_parts(page(), &[], &[], &AnnotatorConfig::default());
        assert_eq!(g.line_pitch(), 14.0);
        assert_eq!(g.line_height(), 14.0);
        assert_eq!(g.fallback_block().len(), 2);
    }

    #[test]
    fn right_margin_reaches_toward_mirrored_margin() {
        let (left, right) = single_column().margins(Point::new(100.0, 100.0));
        assert_eq!(left, 72.0);
        // 540 + 0.95 * (540 - 540)
        assert_eq!(right, 540.0);

        let lines = [Rect::new(72.0, 100.0, 500.0, 110.0)];
        let g = PageGeometry::from_parts(page(), &lines, &lines, &AnnotatorConfig::default());
        let (_, right) = g.margins(Point::new(100.0, 100.0));
        assert!((right - 538.0).abs() < 1e-9, "{right}");
    }

    #[test]
    fn three_lines_snake() {
        let g = single_column();
        let quads = g.snake(Point::new(200.0, 114.0), Point::new(300.0, 142.0));
        assert_eq!(quads.len(), 3);
        assert_eq!(quads[0].x0, 200.0);
        assert_eq!(quads[0].x1, 540.0);
        assert_eq!((quads[1].x0, quads[1].x1), (72.0, 540.0));
        assert_eq!(quads[2].x0, 72.0);
        assert_eq!(quads[2].x1, 300.0);
        assert_eq!(quads[2].y0, 142.0);
    }

    #[test]
    fn one_line_runs_start_to_end() {
        let g = single_column();
        let quads = g.snake(Point::new(150.0, 114.0), Point::new(260.0, 115.0));
        assert_eq!(quads, vec![Rect::new(150.0, 114.0, 260.0, 124.0)]);
    }

    #[test]
    fn degenerate_line_gets_minimum_width() {
        let g = single_column();
        let quads = g.snake(Point::new(150.0, 114.0), Point::new(150.0, 114.0));
        assert_eq!(quads, vec![Rect::new(150.0, 114.0, 160.0, 124.0)]);
    }

    #[test]
    fn end_near_left_margin_keeps_the_last_line() {
        let g = single_column();
        let quads = g.snake(Point::new(200.0, 114.0), Point::new(75.0, 142.0));
        assert_eq!(quads.len(), 3);
        assert_eq!(quads[2], Rect::new(65.0, 142.0, 75.0, 152.0));
    }

    #[test]
    fn start_near_right_margin_keeps_the_first_line() {
        let g = single_column();
        let quads = g.snake(Point::new(537.0, 114.0), Point::new(300.0, 142.0));
        assert_eq!(quads.len(), 3);
        assert_eq!(quads[0], Rect::new(537.0, 114.0, 547.0, 124.0));
        assert_eq!(quads[2].x1, 300.0);
    }

    #[test]
    fn narrow_edges_survive_column_clipping() {
        let g = two_columns();
        let quads = g.snake(Point::new(288.0, 114.0), Point::new(74.0, 142.0));
        assert_eq!(quads.len(), 3);
        assert_eq!((quads[0].x0, quads[0].x1), (288.0, 298.0));
        assert_eq!((quads[1].x0, quads[1].x1), (72.0, 290.0));
        assert_eq!((quads[2].x0, quads[2].x1), (64.0, 74.0));
    }

    #[test]
    fn multi_column_uses_column_margins() {
        let g = two_columns();
        let quads = g.snake(Point::new(150.0, 114.0), Point::new(200.0, 142.0));
        assert_eq!(quads.len(), 3);
        assert_eq!(quads[0].x1, 290.0);
        assert_eq!((quads[1].x0, quads[1].x1), (72.0, 290.0));
    }

    #[test]
    fn crossing_columns_builds_two_snakes() {
        let g = two_columns();
        let quads = g.snake(Point::new(150.0, 338.0), Point::new(400.0, 114.0));
        // First column: one line at the bottom; second column: from the top
        // down to the end line.
        assert!(quads.iter().any(|q| q.x0 == 150.0 && q.y0 == 338.0));
        assert!(quads.iter().any(|q| q.x0 == 320.0 && q.y0 == 100.0));
        assert!(quads.iter().all(|q| q.x1 <= 540.0));
        assert!(quads.last().is_some_and(|q| q.x1 == 400.0));
    }
}
