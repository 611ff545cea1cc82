//! Duplicate removal and note/highlight unification.
//!
//! Devices sometimes record the same annotation twice, and a note attached to
//! a highlight is stored as two records sitting on the highlight's boundary.
//! Both are collapsed here before anything is drawn.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::annotations::AnnotationKind;
use crate::output::ReconciledAnnotation;

/// Characters of content compared when looking for duplicates.
const KEY_CONTENT_CHARS: usize = 50;
/// Separator between several notes unified with one highlight.
const NOTE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    kind: AnnotationKind,
    page: usize,
    x: i64,
    y: i64,
    content: String,
    /// Only set for bookmarks, which have nothing else to tell them apart.
    created_at: Option<i64>,
}

impl DedupKey {
    fn of(a: &ReconciledAnnotation) -> Self {
        Self {
            kind: a.kind,
            page: a.page,
            x: (a.start.x * 10.0).round() as i64,
            y: (a.start.y * 10.0).round() as i64,
            content: a.content.trim().chars().take(KEY_CONTENT_CHARS).collect(),
            created_at: if a.kind == AnnotationKind::Bookmark {
                a.created_at.map(|t| t.timestamp_millis())
            } else {
                None
            },
        }
    }
}

/// Drop annotations identical to an earlier one: same kind and page, start
/// equal to 0.1pt, same leading content. The first one seen is kept.
///
/// Returns the survivors and the number removed.
pub fn deduplicate(annotations: Vec<ReconciledAnnotation>) -> (Vec<ReconciledAnnotation>, usize) {
    let before = annotations.len();
    let mut seen: HashSet<DedupKey> = HashSet::new();
    let kept: Vec<ReconciledAnnotation> = annotations
        .into_iter()
        .filter(|a| seen.insert(DedupKey::of(a)))
        .collect();
    let removed = before - kept.len();
    if removed > 0 {
        debug!("Removed {} duplicate annotations", removed);
    }
    (kept, removed)
}

/// Merge each note with the highlight it was attached to.
///
/// A note belongs to the nearest highlight on its page whose start or
/// recorded end position lies within `tolerance` of the note. The merged
/// record is a note that carries the highlight's geometry, its own text as `content`, and the
/// highlight's text as `highlight_content`. It takes the place of whichever
/// of its parts came first.
///
/// The pairing does not depend on input order. Notes that already carry
/// highlight text are left alone, so running this twice changes nothing.
///
/// Returns the merged list and the number of highlights that absorbed notes.
pub fn unify(
    annotations: Vec<ReconciledAnnotation>,
    tolerance: f64,
) -> (Vec<ReconciledAnnotation>, usize) {
    // highlight index -> note indices
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for (ni, note) in annotations.iter().enumerate() {
        if note.kind != AnnotationKind::Note || note.highlight_content.is_some() {
            continue;
        }
        let nearest = annotations
            .iter()
            .enumerate()
            .filter(|(_, h)| h.kind.is_span() && h.page == note.page)
            .filter_map(|(hi, h)| {
                let d = note
                    .start
                    .distance(&h.start)
                    .min(note.start.distance(&h.end_anchor));
                (d <= tolerance).then_some((hi, d))
            })
            .min_by(|(a, da), (b, db)| {
                da.total_cmp(db)
                    .then_with(|| highlight_order(&annotations[*a], &annotations[*b]))
            });
        if let Some((hi, d)) = nearest {
            debug!(
                "Note on page {} unified with highlight at {:.1}pt",
                note.page + 1,
                d
            );
            groups.entry(hi).or_default().push(ni);
        }
    }
    if groups.is_empty() {
        return (annotations, 0);
    }

    // Each member's group leader (the highlight index).
    let mut leader: HashMap<usize, usize> = HashMap::new();
    for (&hi, notes) in &groups {
        leader.insert(hi, hi);
        for &ni in notes {
            leader.insert(ni, hi);
        }
    }

    let unified = groups.len();
    let mut emitted: HashSet<usize> = HashSet::new();
    let mut out = Vec::with_capacity(annotations.len() - leader.len() + unified);
    for (i, a) in annotations.iter().enumerate() {
        match leader.get(&i) {
            None => out.push(a.clone()),
            Some(&hi) => {
                if emitted.insert(hi) {
                    let notes: Vec<&ReconciledAnnotation> = groups
                        .get(&hi)
                        .map(|ns| ns.iter().map(|&ni| &annotations[ni]).collect())
                        .unwrap_or_default();
                    out.push(merge(&annotations[hi], &notes, a));
                }
            }
        }
    }
    info!("Unified {} notes with their highlights", unified);
    (out, unified)
}

/// Deterministic order between candidate highlights at the same distance.
fn highlight_order(a: &ReconciledAnnotation, b: &ReconciledAnnotation) -> std::cmp::Ordering {
    a.start
        .y
        .total_cmp(&b.start.y)
        .then(a.start.x.total_cmp(&b.start.x))
        .then_with(|| a.content.cmp(&b.content))
}

/// Build the unified note. `first` is whichever member came first in the
/// input and supplies the timestamp.
fn merge(
    highlight: &ReconciledAnnotation,
    notes: &[&ReconciledAnnotation],
    first: &ReconciledAnnotation,
) -> ReconciledAnnotation {
    let mut notes = notes.to_vec();
    notes.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.content.cmp(&b.content))
    });
    let content = notes
        .iter()
        .map(|n| n.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(NOTE_SEPARATOR);

    ReconciledAnnotation {
        kind: AnnotationKind::Note,
        content,
        highlight_content: Some(highlight.content.clone()),
        created_at: first.created_at,
        ..highlight.clone()
    }
}
