//! Typed values produced by the decoder.
//!
//! A store is a flat stream of tagged primitives and named objects. Named
//! objects are turned into [`Object`] variants by their name; anything with an
//! unrecognised name stays available as [`Object::Opaque`].

use serde::{Deserialize, Serialize};
use serde_json::json;

/// One decoded tagged value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Utf(String),
    Double(f64),
    Short(i16),
    Float(f32),
    Byte(i8),
    Char(char),
    Object { name: String, object: Box<Object> },
}

impl Value {
    /// Integer view of any integral variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            Value::Short(v) => Some(i64::from(*v)),
            Value::Byte(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf(s) => Some(s),
            _ => None,
        }
    }

    /// Short type label used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Utf(_) => "utf",
            Value::Double(_) => "double",
            Value::Short(_) => "short",
            Value::Float(_) => "float",
            Value::Byte(_) => "byte",
            Value::Char(_) => "char",
            Value::Object { .. } => "object",
        }
    }

    /// Plain JSON rendering for diagnostics.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => json!(b),
            Value::Int(v) => json!(v),
            Value::Long(v) => json!(v),
            Value::Utf(s) => json!(s),
            Value::Double(v) => json!(v),
            Value::Short(v) => json!(v),
            Value::Float(v) => json!(v),
            Value::Byte(v) => json!(v),
            Value::Char(c) => json!(c.to_string()),
            Value::Object { name, object } => {
                let mut map = serde_json::Map::new();
                map.insert(name.clone(), object.to_json());
                serde_json::Value::Object(map)
            }
        }
    }
}

/// Annotation classes as numbered inside `annotation.cache.object`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationClass {
    Bookmark,
    Highlight,
    Note,
    ClipArticle,
    HandwrittenNote,
    StickyNote,
    Underline,
}

impl AnnotationClass {
    pub const ALL: [AnnotationClass; 7] = [
        AnnotationClass::Bookmark,
        AnnotationClass::Highlight,
        AnnotationClass::Note,
        AnnotationClass::ClipArticle,
        AnnotationClass::HandwrittenNote,
        AnnotationClass::StickyNote,
        AnnotationClass::Underline,
    ];

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(AnnotationClass::Bookmark),
            1 => Some(AnnotationClass::Highlight),
            2 => Some(AnnotationClass::Note),
            3 => Some(AnnotationClass::ClipArticle),
            10 => Some(AnnotationClass::HandwrittenNote),
            11 => Some(AnnotationClass::StickyNote),
            13 => Some(AnnotationClass::Underline),
            _ => None,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            AnnotationClass::Bookmark => 0,
            AnnotationClass::Highlight => 1,
            AnnotationClass::Note => 2,
            AnnotationClass::ClipArticle => 3,
            AnnotationClass::HandwrittenNote => 10,
            AnnotationClass::StickyNote => 11,
            AnnotationClass::Underline => 13,
        }
    }

    /// Object name used in the store, e.g. `annotation.personal.highlight`.
    pub fn type_name(self) -> &'static str {
        match self {
            AnnotationClass::Bookmark => "annotation.personal.bookmark",
            AnnotationClass::Highlight => "annotation.personal.highlight",
            AnnotationClass::Note => "annotation.personal.note",
            AnnotationClass::ClipArticle => "annotation.personal.clip_article",
            AnnotationClass::HandwrittenNote => "annotation.personal.handwritten_note",
            AnnotationClass::StickyNote => "annotation.personal.sticky_note",
            AnnotationClass::Underline => "annotation.personal.underline",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.type_name() == name)
    }
}

/// One `annotation.personal.*` record, fields in store order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationEntry {
    pub class: AnnotationClass,
    /// Raw position string; parse with [`crate::Position::parse`].
    pub start_position: String,
    pub end_position: String,
    /// Milliseconds since the Unix epoch; `None` when stored as -1.
    pub creation_time: Option<i64>,
    pub last_modification_time: Option<i64>,
    pub template: Value,
    /// Note text (`annotation.personal.note` only).
    pub note: Option<String>,
    /// Notebook reference for handwritten and sticky notes.
    pub notebook_ref: Option<String>,
}

impl AnnotationEntry {
    fn to_json(&self) -> serde_json::Value {
        let mut obj = json!({
            "startPosition": self.start_position,
            "endPosition": self.end_position,
            "creationTime": self.creation_time,
            "lastModificationTime": self.last_modification_time,
            "template": self.template.to_json(),
        });
        if let Some(note) = &self.note {
            obj["note"] = json!(note);
        }
        if let Some(r) = &self.notebook_ref {
            let key = match self.class {
                AnnotationClass::HandwrittenNote => "handwritten_note_nbk_ref",
                _ => "sticky_note_nbk_ref",
            };
            obj[key] = json!(r);
        }
        obj
    }
}

/// A named object, decoded according to its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Object {
    /// Objects that wrap exactly one value (`lpu`, `dictionary`, `XRAY_*`, ...).
    Single(Value),
    /// Count-prefixed key/value pairs (`dict.prefs.v2`, `ReaderMetrics`, ...).
    Map(Vec<(Value, Value)>),
    /// `erl`: a bare position.
    Position(String),
    /// `lpr`: last page read.
    LastPageRead {
        position: String,
        time: Option<i64>,
    },
    /// `fpr` / `updated_lpr`.
    PageReadRecord {
        position: String,
        time: Option<i64>,
        time_zone_offset: Option<i64>,
        country: Value,
        device: Value,
    },
    /// `annotation.cache.object`: annotations bucketed by class, in store order.
    AnnotationCache(Vec<(AnnotationClass, Vec<AnnotationEntry>)>),
    /// `saved.avl.interval.tree`.
    IntervalTree(Vec<Value>),
    /// `font.prefs`, `language.store`: first value if any.
    FirstValue(Option<Value>),
    Annotation(AnnotationEntry),
    /// Unrecognised name; raw values preserved.
    Opaque {
        type_name: String,
        raw_values: Vec<Value>,
    },
}

impl Object {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Object::Single(v) => v.to_json(),
            Object::Map(pairs) => {
                let mut map = serde_json::Map::new();
                for (k, v) in pairs {
                    let key = match k {
                        Value::Utf(s) => s.clone(),
                        other => other.to_json().to_string(),
                    };
                    map.insert(key, v.to_json());
                }
                serde_json::Value::Object(map)
            }
            Object::Position(p) => json!(p),
            Object::LastPageRead { position, time } => {
                json!({ "position": position, "time": time })
            }
            Object::PageReadRecord {
                position,
                time,
                time_zone_offset,
                country,
                device,
            } => json!({
                "position": position,
                "time": time,
                "timeZoneOffset": time_zone_offset,
                "country": country.to_json(),
                "device": device.to_json(),
            }),
            Object::AnnotationCache(buckets) => {
                let mut map = serde_json::Map::new();
                for (class, entries) in buckets {
                    let list: Vec<_> = entries.iter().map(AnnotationEntry::to_json).collect();
                    map.insert(class.type_name().to_string(), json!(list));
                }
                serde_json::Value::Object(map)
            }
            Object::IntervalTree(values) => {
                json!(values.iter().map(Value::to_json).collect::<Vec<_>>())
            }
            Object::FirstValue(v) => v.as_ref().map(Value::to_json).unwrap_or(json!(null)),
            Object::Annotation(entry) => entry.to_json(),
            Object::Opaque {
                type_name,
                raw_values,
            } => json!({
                "_raw_values": raw_values.iter().map(Value::to_json).collect::<Vec<_>>(),
                "_unhandled_type": type_name,
            }),
        }
    }
}
