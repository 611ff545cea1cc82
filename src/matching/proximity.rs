//! Choosing among several search hits.
//!
//! A literal search returns every occurrence on the page. The one that
//! belongs to the annotation is the one closest to where the device said it
//! was.

use tracing::debug;

use crate::config::AnnotatorConfig;
use crate::geometry::{Point, Rect};

/// Keep the hits that belong to the occurrence nearest `expected`.
///
/// Short needles with very many hits are treated as a single word and keep
/// only the nearest rectangle. Otherwise hits are grouped into clusters of
/// consecutive lines, the cluster nearest `expected` is kept, and any other
/// cluster that shares its vertical band is merged in (text running across
/// two columns on the same visual line). Ties keep the first cluster found.
pub fn select_nearest(
    hits: &[Rect],
    expected: Point,
    needle_chars: usize,
    config: &AnnotatorConfig,
) -> Vec<Rect> {
    if hits.len() <= 1 {
        return hits.to_vec();
    }

    if needle_chars <= config.short_text_max_chars && hits.len() > config.short_text_min_occurrences
    {
        debug!(
            "Short text with {} occurrences, keeping the nearest",
            hits.len()
        );
        return nearest_by(hits, expected, |r| r.top_left())
            .map(|r| vec![*r])
            .unwrap_or_default();
    }

    let clusters = cluster(hits, config);
    let Some(chosen) = nearest_by(&clusters, expected, |c| c[0].top_left()) else {
        return Vec::new();
    };
    let Some(band) = Rect::union_all(chosen) else {
        return Vec::new();
    };

    let mut out: Vec<Rect> = Vec::new();
    for c in &clusters {
        let merge = std::ptr::eq(c, chosen)
            || Rect::union_all(c).is_some_and(|u| u.vertical_overlap(&band) > 0.0);
        if merge {
            out.extend(c.iter().copied());
        }
    }
    out.sort_by(|a, b| a.y0.total_cmp(&b.y0).then(a.x0.total_cmp(&b.x0)));
    out
}

/// Group hits, in order, into runs on the same or adjacent lines.
fn cluster(hits: &[Rect], config: &AnnotatorConfig) -> Vec<Vec<Rect>> {
    let mut clusters: Vec<Vec<Rect>> = Vec::new();
    for &rect in hits {
        let joins = clusters.last().is_some_and(|c| {
            let last = c[c.len() - 1];
            let dy = rect.y0 - last.y0;
            if dy.abs() <= config.same_line_tolerance {
                return true;
            }
            let union = Rect::union_all(c).unwrap_or(last);
            dy > 0.0
                && dy <= config.adjacent_line_tolerance
                && (rect.horizontal_overlap(&union) > 0.0 || rect.x0 < last.x0)
        });
        match clusters.last_mut() {
            Some(c) if joins => c.push(rect),
            _ => clusters.push(vec![rect]),
        }
    }
    clusters
}

/// The item whose anchor is closest to `expected`; the first one wins ties.
fn nearest_by<T>(items: &[T], expected: Point, anchor: impl Fn(&T) -> Point) -> Option<&T> {
    let mut best: Option<(&T, f64)> = None;
    for item in items {
        let d = anchor(item).distance(&expected);
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((item, d));
        }
    }
    best.map(|(item, _)| item)
}
