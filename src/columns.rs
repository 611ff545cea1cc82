//! Column detection.
//!
//! Two-column pages are recognised from the left edges of their text lines:
//! two well-populated groups of left edges far enough apart mean two columns.
//! Anything else is one column covering the text.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AnnotatorConfig;
use crate::geometry::Rect;

/// Fewer lines than this are never split into columns.
const MIN_LINES_FOR_DETECTION: usize = 15;
/// Margin used when a page has no text at all.
const EMPTY_PAGE_MARGIN: f64 = 50.0;
/// Space kept between the left column and the start of the right one.
const COLUMN_GUTTER: f64 = 10.0;
/// Narrowest width [`ColumnLayout::constrain`] returns.
const MIN_CONSTRAINED_WIDTH: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Column {
    fn covering(lines: &[&Rect]) -> Option<Self> {
        let first = lines.first()?;
        Some(lines.iter().fold(
            Column {
                left: first.x0,
                right: first.x1,
                top: first.y0,
                bottom: first.y1,
            },
            |c, r| Column {
                left: c.left.min(r.x0),
                right: c.right.max(r.x1),
                top: c.top.min(r.y0),
                bottom: c.bottom.max(r.y1),
            },
        ))
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn center_x(&self) -> f64 {
        (self.left + self.right) / 2.0
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.left..=self.right).contains(&x) && (self.top..=self.bottom).contains(&y)
    }
}

/// The columns of one page, left to right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub columns: Vec<Column>,
}

impl ColumnLayout {
    /// Detect columns from a page's line boxes.
    pub fn detect(lines: &[Rect], page: &Rect, config: &AnnotatorConfig) -> Self {
        let all: Vec<&Rect> = lines.iter().collect();
        let Some(extent) = Column::covering(&all) else {
            return Self::single(Column {
                left: EMPTY_PAGE_MARGIN,
                right: page.width() - EMPTY_PAGE_MARGIN,
                top: EMPTY_PAGE_MARGIN,
                bottom: page.height() - EMPTY_PAGE_MARGIN,
            });
        };

        if lines.len() < MIN_LINES_FOR_DETECTION {
            return Self::single(extent);
        }

        if let Some(layout) = Self::two_columns(lines, config) {
            debug!(
                "Two columns: {:.1}-{:.1} and {:.1}-{:.1}",
                layout.columns[0].left,
                layout.columns[0].right,
                layout.columns[1].left,
                layout.columns[1].right
            );
            return layout;
        }
        Self::single(extent)
    }

    fn single(column: Column) -> Self {
        Self {
            columns: vec![column],
        }
    }

    fn two_columns(lines: &[Rect], config: &AnnotatorConfig) -> Option<Self> {
        let tolerance = config.column_tolerance;

        // Group left edges; each group is keyed by its first member.
        let mut groups: Vec<(f64, usize)> = Vec::new();
        for line in lines {
            match groups
                .iter_mut()
                .find(|(key, _)| (line.x0 - key).abs() <= tolerance)
            {
                Some((_, count)) => *count += 1,
                None => groups.push((line.x0, 1)),
            }
        }
        groups.sort_by(|a, b| b.1.cmp(&a.1));

        let (&(first, _), &(second, second_count)) = (groups.first()?, groups.get(1)?);
        if second_count < config.min_column_lines {
            return None;
        }
        let (left_margin, right_margin) = if first <= second {
            (first, second)
        } else {
            (second, first)
        };
        if right_margin - left_margin <= config.min_column_gap {
            return None;
        }

        let near = |margin: f64| -> Vec<&Rect> {
            lines
                .iter()
                .filter(|l| (l.x0 - margin).abs() <= tolerance)
                .collect()
        };
        let mut left = Column::covering(&near(left_margin))?;
        let right = Column::covering(&near(right_margin))?;
        left.right = left.right.min(right_margin - COLUMN_GUTTER);
        Some(Self {
            columns: vec![left, right],
        })
    }

    pub fn is_multi_column(&self) -> bool {
        self.columns.len() > 1
    }

    /// Gap between the first two columns.
    pub fn separation(&self) -> Option<f64> {
        match self.columns.as_slice() {
            [a, b, ..] => Some(b.left - a.right),
            _ => None,
        }
    }

    /// The column containing `(x, y)`, else the one whose centre is
    /// horizontally nearest.
    pub fn column_for(&self, x: f64, y: f64) -> Option<&Column> {
        if let Some(c) = self.columns.iter().find(|c| c.contains(x, y)) {
            return Some(c);
        }
        if self.columns.len() == 1 {
            return self.columns.first();
        }
        let mut best: Option<(&Column, f64)> = None;
        for c in &self.columns {
            let d = (x - c.center_x()).abs();
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((c, d));
            }
        }
        best.map(|(c, _)| c)
    }

    /// Shorten `width` so a run starting at `x` stays inside its column.
    pub fn constrain(&self, x: f64, y: f64, width: f64) -> (f64, f64) {
        match self.column_for(x, y) {
            Some(c) => (x, width.min(c.right - x).max(MIN_CONSTRAINED_WIDTH)),
            None => (x, width),
        }
    }

    /// Clip each quad to the column of its centre.
    ///
    /// Every quad comes back, in order, however narrow the clip leaves it.
    pub fn constrain_quads(&self, quads: &[Rect]) -> Vec<Rect> {
        quads
            .iter()
            .map(|q| {
                let center = q.center();
                let Some(c) = self.column_for(center.x, center.y) else {
                    return *q;
                };
                let x0 = q.x0.max(c.left).min(c.right);
                let x1 = q.x1.min(c.right).max(x0);
                Rect::new(x0, q.y0, x1, q.y1)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Rect {
        Rect::new(0.0, 0.0, 612.0, 792.0)
    }

    fn two_column_lines() -> Vec<Rect> {
        let mut lines = Vec::new();
        for i in 0..20 {
            let y = 72.0 + i as f64 * 14.0;
            lines.push(Rect::new(72.0, y, 290.0, y + 10.0));
            lines.push(Rect::new(320.0, y, 540.0, y + 10.0));
        }
        lines
    }

    #[test]
    fn empty_page_uses_fixed_margins() {
        let layout = ColumnLayout::detect(&[], &page(), &AnnotatorConfig::default());
        assert_eq!(
            layout.columns,
            vec![Column {
                left: 50.0,
                right: 562.0,
                top: 50.0,
                bottom: 742.0
            }]
        );
    }

    #[test]
    fn few_lines_are_one_column() {
        let lines: Vec<Rect> = (0..5)
            .map(|i| Rect::new(72.0 + i as f64, 100.0 + i as f64 * 14.0, 500.0, 110.0 + i as f64 * 14.0))
            .collect();
        let layout = ColumnLayout::detect(&lines, &page(), &AnnotatorConfig::default());
        assert!(!layout.is_multi_column());
        assert_eq!(layout.columns[0].left, 72.0);
        assert_eq!(layout.columns[0].right, 500.0);
        assert_eq!(layout.columns[0].top, 100.0);
        assert_eq!(layout.columns[0].bottom, 166.0);
    }

    #[test]
    fn two_columns_are_detected() {
        let layout =
            ColumnLayout::detect(&two_column_lines(), &page(), &AnnotatorConfig::default());
        assert!(layout.is_multi_column());
        assert_eq!(layout.columns[0].left, 72.0);
        assert_eq!(layout.columns[0].right, 290.0);
        assert_eq!(layout.columns[1].left, 320.0);
        assert_eq!(layout.separation(), Some(30.0));
    }

    #[test]
    fn left_column_is_clipped_before_the_right_one() {
        let mut lines = two_column_lines();
        lines.push(Rect::new(72.0, 400.0, 330.0, 410.0));
        let layout = ColumnLayout::detect(&lines, &page(), &AnnotatorConfig::default());
        assert_eq!(layout.columns[0].right, 310.0);
    }

    #[test]
    fn indented_paragraphs_stay_one_column() {
        // Second group too close to the first.
        let lines: Vec<Rect> = (0..30)
            .map(|i| {
                let x = if i % 2 == 0 { 72.0 } else { 100.0 };
                let y = 72.0 + i as f64 * 14.0;
                Rect::new(x, y, 540.0, y + 10.0)
            })
            .collect();
        let layout = ColumnLayout::detect(&lines, &page(), &AnnotatorConfig::default());
        assert!(!layout.is_multi_column());
        assert_eq!(layout.columns[0].left, 72.0);
        assert_eq!(layout.columns[0].top, 72.0);
    }

    #[test]
    fn lookup_prefers_exact_box_then_nearest_centre() {
        let layout =
            ColumnLayout::detect(&two_column_lines(), &page(), &AnnotatorConfig::default());
        assert_eq!(layout.column_for(100.0, 100.0).unwrap().left, 72.0);
        // In the gutter, closer to the right column's centre.
        assert_eq!(layout.column_for(310.0, 100.0).unwrap().left, 320.0);
        // Below the text.
        assert_eq!(layout.column_for(500.0, 700.0).unwrap().left, 320.0);
    }

    #[test]
    fn constrain_keeps_runs_in_their_column() {
        let layout =
            ColumnLayout::detect(&two_column_lines(), &page(), &AnnotatorConfig::default());
        assert_eq!(layout.constrain(200.0, 100.0, 300.0), (200.0, 90.0));
        assert_eq!(layout.constrain(288.0, 100.0, 300.0), (288.0, 10.0));

        let quads = [
            Rect::new(200.0, 100.0, 400.0, 110.0),
            Rect::new(287.0, 120.0, 289.0, 130.0),
        ];
        let clipped = layout.constrain_quads(&quads);
        assert_eq!(
            clipped,
            vec![
                Rect::new(200.0, 100.0, 290.0, 110.0),
                Rect::new(287.0, 120.0, 289.0, 130.0),
            ]
        );
    }

    #[test]
    fn constrain_quads_never_drops_a_quad() {
        let layout =
            ColumnLayout::detect(&two_column_lines(), &page(), &AnnotatorConfig::default());
        // Starts in the left column's last few points.
        let quads = [Rect::new(288.0, 100.0, 300.0, 110.0)];
        assert_eq!(
            layout.constrain_quads(&quads),
            vec![Rect::new(288.0, 100.0, 290.0, 110.0)]
        );
    }
}
