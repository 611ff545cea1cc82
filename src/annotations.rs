//! Annotation records extracted from a decoded store.

use chrono::{DateTime, Utc};
use krds::{AnnotationClass, AnnotationEntry, Position, Store};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ParseWarning;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationKind {
    #[default]
    Highlight,
    Note,
    Bookmark,
    Underline,
}

impl AnnotationKind {
    /// Map a store class; `None` for classes that are never rendered.
    pub fn from_class(class: AnnotationClass) -> Option<Self> {
        match class {
            AnnotationClass::Highlight => Some(AnnotationKind::Highlight),
            AnnotationClass::Note
            | AnnotationClass::StickyNote
            | AnnotationClass::HandwrittenNote => Some(AnnotationKind::Note),
            AnnotationClass::Bookmark => Some(AnnotationKind::Bookmark),
            AnnotationClass::Underline => Some(AnnotationKind::Underline),
            AnnotationClass::ClipArticle => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationKind::Highlight => "highlight",
            AnnotationKind::Note => "note",
            AnnotationKind::Bookmark => "bookmark",
            AnnotationKind::Underline => "underline",
        }
    }

    /// Highlights and underlines mark a span of text.
    pub fn is_span(self) -> bool {
        matches!(self, AnnotationKind::Highlight | AnnotationKind::Underline)
    }
}

/// One annotation as the device recorded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub kind: AnnotationKind,
    pub start: Position,
    pub end: Position,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    /// The note's own text; empty for other kinds.
    pub note_text: String,
    /// Text borrowed from the clipping paired with this record.
    pub matched_content: Option<String>,
    /// Set when a note is unified with a highlight.
    pub highlight_content: Option<String>,
}

impl AnnotationRecord {
    /// 0-based document page of the start position.
    pub fn page(&self) -> usize {
        self.start.page as usize
    }

    fn from_entry(entry: &AnnotationEntry) -> Result<Self, ParseWarning> {
        let kind = AnnotationKind::from_class(entry.class).ok_or_else(|| {
            ParseWarning::UnsupportedClass {
                class: entry.class.type_name().to_string(),
            }
        })?;

        let start = Position::parse(&entry.start_position);
        if !start.valid {
            return Err(ParseWarning::InvalidPosition {
                kind: kind.as_str().to_string(),
                raw: entry.start_position.clone(),
            });
        }
        // A missing end falls back to the start.
        let end = match Position::parse(&entry.end_position) {
            p if p.valid => p,
            _ => start,
        };

        Ok(AnnotationRecord {
            kind,
            start,
            end,
            created_at: entry.creation_time.and_then(DateTime::from_timestamp_millis),
            modified_at: entry
                .last_modification_time
                .and_then(DateTime::from_timestamp_millis),
            note_text: if kind == AnnotationKind::Note {
                entry.note.clone().unwrap_or_default()
            } else {
                String::new()
            },
            matched_content: None,
            highlight_content: None,
        })
    }
}

/// Convert every store annotation into a record.
///
/// Records of unsupported classes or with an unparseable start position are
/// skipped and reported. Decoder warnings are passed through.
pub fn from_store(store: &Store) -> (Vec<AnnotationRecord>, Vec<ParseWarning>) {
    let mut warnings: Vec<ParseWarning> = store
        .warnings()
        .iter()
        .map(|w| ParseWarning::Store(w.to_string()))
        .collect();

    let mut records = Vec::new();
    for entry in store.annotations() {
        match AnnotationRecord::from_entry(&entry) {
            Ok(record) => records.push(record),
            Err(w) => {
                warn!("{}", w);
                warnings.push(w);
            }
        }
    }
    debug!(
        "{} annotation records, {} warnings",
        records.len(),
        warnings.len()
    );
    (records, warnings)
}
