//! Tagged-stream decoder.
//!
//! ```text
//! signature(8) │ 1 │ count │ value × count
//!                        value = tag(i8) payload
//!                        tag -2 = object begin: name(utf) value* tag(-1)
//! ```
//!
//! Objects are decoded by name through a closed [`Layout`] table. Names the
//! table does not know become [`Object::Opaque`] with a warning, so the
//! decoder never fails on schema drift; it only fails on corrupt framing.

use std::collections::VecDeque;

use tracing::{debug, error, warn};

use crate::error::{DecodeWarning, KrdsError};
use crate::reader::ByteReader;
use crate::store::Store;
use crate::value::{AnnotationClass, AnnotationEntry, Object, Value};

/// Every store begins with these bytes.
pub const SIGNATURE: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x1A, 0xB1, 0x26];

/// Object nesting limit; real stores nest three or four levels.
const MAX_DEPTH: usize = 64;

const CACHE_OBJECT: &str = "annotation.cache.object";
const INTERVAL_TREE: &str = "saved.avl.interval.tree";

// ── Type tags ────────────────────────────────────────────────────────────────

const TAG_BOOLEAN: i8 = 0;
const TAG_INT: i8 = 1;
const TAG_LONG: i8 = 2;
const TAG_UTF: i8 = 3;
const TAG_DOUBLE: i8 = 4;
const TAG_SHORT: i8 = 5;
const TAG_FLOAT: i8 = 6;
const TAG_BYTE: i8 = 7;
const TAG_CHAR: i8 = 9;
const TAG_OBJECT_BEGIN: i8 = -2;
const TAG_OBJECT_END: i8 = -1;

// ── Object layouts ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Single,
    KeyValue,
    Erl,
    Lpr,
    PageRead,
    AnnotationCache,
    IntervalTree,
    FirstValue,
    Annotation(AnnotationClass),
    Unknown,
}

fn layout_for(name: &str) -> Layout {
    match name {
        "clock.data.store" | "dictionary" | "lpu" | "pdf.contrast" | "sync_lpr"
        | "tpz.line.spacing" | "XRAY_OTA_UPDATE_STATE" | "XRAY_SHOWING_SPOILERS"
        | "XRAY_SORTING_STATE" | "XRAY_TAB_STATE" | "buy.asin.response.data"
        | "next.in.series.info.data" | "price.info.data" => Layout::Single,
        "dict.prefs.v2" | "EndActions" | "ReaderMetrics" | "StartActions" | "Translator"
        | "Wikipedia" => Layout::KeyValue,
        "erl" => Layout::Erl,
        "lpr" => Layout::Lpr,
        "fpr" | "updated_lpr" => Layout::PageRead,
        CACHE_OBJECT => Layout::AnnotationCache,
        INTERVAL_TREE => Layout::IntervalTree,
        "font.prefs" | "language.store" => Layout::FirstValue,
        other => match AnnotationClass::from_type_name(other) {
            Some(class) => Layout::Annotation(class),
            None => Layout::Unknown,
        },
    }
}

/// Decode a complete store. Fails on the first framing error.
pub fn decode(bytes: &[u8]) -> Result<Store, KrdsError> {
    let mut store = Store::default();
    decode_into(bytes, &mut store)?;
    Ok(store)
}

/// Result of [`decode_lenient`]: whatever decoded before a failure.
#[derive(Debug)]
pub struct PartialDecode {
    pub store: Store,
    pub error: Option<KrdsError>,
}

/// Decode for diagnostics: on failure, keep the objects decoded so far.
///
/// The pipeline uses [`decode`]; a partial store is never fed downstream.
pub fn decode_lenient(bytes: &[u8]) -> PartialDecode {
    let mut store = Store::default();
    let error = decode_into(bytes, &mut store).err();
    PartialDecode { store, error }
}

fn decode_into(bytes: &[u8], store: &mut Store) -> Result<(), KrdsError> {
    let mut decoder = Decoder {
        reader: ByteReader::new(bytes),
        depth: 0,
        warnings: Vec::new(),
    };
    let result = decoder.decode_store(store);
    store.warnings.append(&mut decoder.warnings);
    if let Err(ref e) = result {
        debug!(
            "Store decode failed at offset {} after {} objects: {}",
            decoder.reader.offset(),
            store.entries().len(),
            e
        );
    }
    result
}

struct Decoder<'a> {
    reader: ByteReader<'a>,
    depth: usize,
    warnings: Vec<DecodeWarning>,
}

impl Decoder<'_> {
    fn decode_store(&mut self, store: &mut Store) -> Result<(), KrdsError> {
        if self.reader.remaining() < SIGNATURE.len() {
            return Err(KrdsError::BadSignature {
                found: self.reader.rest().to_vec(),
            });
        }
        let signature = self.reader.take(SIGNATURE.len())?;
        if signature != SIGNATURE {
            return Err(KrdsError::BadSignature {
                found: signature.to_vec(),
            });
        }

        let first = self.decode_next()?;
        if first.as_i64() != Some(1) {
            return Err(KrdsError::BadFirstValue {
                found: format!("{first:?}"),
            });
        }

        let count = self.decode_next()?;
        let count = match count.as_i64() {
            Some(n) if n >= 0 => n,
            _ => {
                return Err(KrdsError::BadValueCount {
                    found: format!("{count:?}"),
                })
            }
        };
        debug!("Store declares {} top-level values", count);

        for _ in 0..count {
            match self.decode_next()? {
                Value::Object { name, object } => store.insert(name, *object),
                other => {
                    debug!("Skipping top-level {} value", other.kind());
                    self.warnings.push(DecodeWarning::TopLevelScalar {
                        kind: other.kind().to_string(),
                    });
                }
            }
        }

        let extra = self.reader.remaining();
        if extra != 0 {
            error!("Reader data store has {} bytes of extra data", extra);
            self.warnings
                .push(DecodeWarning::TrailingBytes { count: extra });
        }
        Ok(())
    }

    fn decode_next(&mut self) -> Result<Value, KrdsError> {
        let offset = self.reader.offset();
        let tag = self.reader.i8()?;
        self.decode_tagged(tag, offset)
    }

    fn decode_tagged(&mut self, tag: i8, offset: usize) -> Result<Value, KrdsError> {
        let value = match tag {
            TAG_BOOLEAN => Value::Bool(self.boolean()?),
            TAG_INT => Value::Int(self.reader.i32()?),
            TAG_LONG => Value::Long(self.reader.i64()?),
            TAG_UTF => Value::Utf(self.utf()?),
            TAG_DOUBLE => Value::Double(self.reader.f64()?),
            TAG_SHORT => Value::Short(self.reader.i16()?),
            TAG_FLOAT => Value::Float(self.reader.f32()?),
            TAG_BYTE => Value::Byte(self.reader.i8()?),
            TAG_CHAR => {
                let at = self.reader.offset();
                let b = self.reader.u8()?;
                if !b.is_ascii() {
                    return Err(KrdsError::InvalidUtf8 { offset: at });
                }
                Value::Char(char::from(b))
            }
            TAG_OBJECT_BEGIN => self.object(offset)?,
            _ => return Err(KrdsError::UnknownTypeTag { tag, offset }),
        };
        Ok(value)
    }

    fn boolean(&mut self) -> Result<bool, KrdsError> {
        let offset = self.reader.offset();
        match self.reader.i8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(KrdsError::InvalidBool { value, offset }),
        }
    }

    /// A leading `true` flag means the empty string.
    fn utf(&mut self) -> Result<String, KrdsError> {
        if self.boolean()? {
            return Ok(String::new());
        }
        let len = self.reader.u16()? as usize;
        let offset = self.reader.offset();
        let bytes = self.reader.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| KrdsError::InvalidUtf8 { offset })
    }

    fn object(&mut self, offset: usize) -> Result<Value, KrdsError> {
        if self.depth >= MAX_DEPTH {
            return Err(KrdsError::TooDeep {
                limit: MAX_DEPTH,
                offset,
            });
        }
        self.depth += 1;
        let name = self.utf()?;
        let mut values = VecDeque::new();
        while self.reader.peek_i8()? != TAG_OBJECT_END {
            values.push_back(self.decode_next()?);
        }
        self.reader.i8()?;
        self.depth -= 1;

        let object = self.decode_object(&name, values)?;
        Ok(Value::Object {
            name,
            object: Box::new(object),
        })
    }

    fn decode_object(&mut self, name: &str, values: VecDeque<Value>) -> Result<Object, KrdsError> {
        let mut fields = Fields {
            object: name,
            values,
        };
        let object = match layout_for(name) {
            Layout::Single => Object::Single(fields.next("value")?),
            Layout::KeyValue => {
                let count = fields.integer("count")?;
                let mut pairs = Vec::new();
                for _ in 0..count.max(0) {
                    let key = fields.next("key")?;
                    let value = fields.next("value")?;
                    pairs.push((key, value));
                }
                Object::Map(pairs)
            }
            Layout::Erl => Object::Position(fields.string("position")?),
            Layout::Lpr => match fields.next("version")? {
                Value::Utf(position) => Object::LastPageRead {
                    position,
                    time: None,
                },
                other => match other.as_i64() {
                    Some(version) if version <= 2 => Object::LastPageRead {
                        position: fields.string("position")?,
                        time: fields.timestamp("time")?,
                    },
                    Some(version) => return Err(KrdsError::UnsupportedLprVersion { version }),
                    None => {
                        return Err(KrdsError::UnexpectedValue {
                            object: name.to_string(),
                            field: "version",
                            expected: "utf or integer",
                            found: other.kind().to_string(),
                        })
                    }
                },
            },
            Layout::PageRead => Object::PageReadRecord {
                position: fields.string("position")?,
                time: fields.timestamp("time")?,
                time_zone_offset: fields.timestamp("timeZoneOffset")?,
                country: fields.next("country")?,
                device: fields.next("device")?,
            },
            Layout::AnnotationCache => self.annotation_cache(&mut fields),
            Layout::IntervalTree => {
                let count = fields.integer("count")?;
                let mut items = Vec::new();
                for _ in 0..count.max(0) {
                    items.push(fields.next("item")?);
                }
                Object::IntervalTree(items)
            }
            Layout::FirstValue => Object::FirstValue(fields.values.pop_front()),
            Layout::Annotation(class) => Object::Annotation(annotation_entry(class, &mut fields)?),
            Layout::Unknown => {
                debug!("Unknown object type '{}' ({} values)", name, fields.values.len());
                self.warnings.push(DecodeWarning::UnknownObject {
                    name: name.to_string(),
                    values: fields.values.len(),
                });
                return Ok(Object::Opaque {
                    type_name: name.to_string(),
                    raw_values: fields.values.into_iter().collect(),
                });
            }
        };
        if !fields.values.is_empty() {
            debug!(
                "Object '{}' left {} values unread",
                name,
                fields.values.len()
            );
        }
        Ok(object)
    }

    /// Malformed caches keep the buckets read so far.
    fn annotation_cache(&mut self, fields: &mut Fields<'_>) -> Object {
        let mut buckets = Vec::new();
        let count = match fields.values.pop_front().and_then(|v| v.as_i64()) {
            Some(n) => n,
            None => {
                warn!("annotation.cache.object without an integer count");
                self.warnings.push(DecodeWarning::MalformedCache {
                    reason: "missing integer count".into(),
                });
                return Object::AnnotationCache(buckets);
            }
        };

        for _ in 0..count.max(0) {
            let Some(id_value) = fields.values.pop_front() else {
                break;
            };
            let Some(id) = id_value.as_i64() else {
                self.warnings.push(DecodeWarning::MalformedCache {
                    reason: format!("expected class id, found {}", id_value.kind()),
                });
                break;
            };
            let Some(payload) = fields.values.pop_front() else {
                break;
            };
            let Some(class) = AnnotationClass::from_id(id) else {
                warn!("Skipping unknown annotation class id {}", id);
                self.warnings
                    .push(DecodeWarning::UnknownAnnotationClass { id });
                continue;
            };

            let entries = unwrap_bucket(payload);
            debug!("{}: {} records", class.type_name(), entries.len());
            if !entries.is_empty() {
                buckets.push((class, entries));
            }
        }
        Object::AnnotationCache(buckets)
    }
}

/// A bucket payload is normally an interval tree of annotation objects.
fn unwrap_bucket(payload: Value) -> Vec<AnnotationEntry> {
    let items = match payload {
        Value::Object { object, .. } => match *object {
            Object::IntervalTree(items) => items,
            Object::Annotation(entry) => return vec![entry],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object { object, .. } => match *object {
                Object::Annotation(entry) => Some(entry),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn annotation_entry(
    class: AnnotationClass,
    fields: &mut Fields<'_>,
) -> Result<AnnotationEntry, KrdsError> {
    let start_position = fields.string("startPosition")?;
    let end_position = fields.string("endPosition")?;
    let creation_time = fields.timestamp("creationTime")?;
    let last_modification_time = fields.timestamp("lastModificationTime")?;
    let template = fields.next("template")?;

    let (note, notebook_ref) = match class {
        AnnotationClass::Note => (Some(fields.string("note")?), None),
        AnnotationClass::HandwrittenNote => {
            (None, Some(fields.string("handwritten_note_nbk_ref")?))
        }
        AnnotationClass::StickyNote => (None, Some(fields.string("sticky_note_nbk_ref")?)),
        _ => (None, None),
    };

    Ok(AnnotationEntry {
        class,
        start_position,
        end_position,
        creation_time,
        last_modification_time,
        template,
        note,
        notebook_ref,
    })
}

/// Values of one object, consumed front to back.
struct Fields<'n> {
    object: &'n str,
    values: VecDeque<Value>,
}

impl Fields<'_> {
    fn next(&mut self, field: &'static str) -> Result<Value, KrdsError> {
        self.values
            .pop_front()
            .ok_or_else(|| KrdsError::MissingField {
                object: self.object.to_string(),
                field,
            })
    }

    fn string(&mut self, field: &'static str) -> Result<String, KrdsError> {
        match self.next(field)? {
            Value::Utf(s) => Ok(s),
            other => Err(self.unexpected(field, "utf", &other)),
        }
    }

    fn integer(&mut self, field: &'static str) -> Result<i64, KrdsError> {
        let value = self.next(field)?;
        value
            .as_i64()
            .ok_or_else(|| self.unexpected(field, "integer", &value))
    }

    /// Millisecond timestamps; -1 means "not set".
    fn timestamp(&mut self, field: &'static str) -> Result<Option<i64>, KrdsError> {
        let v = self.integer(field)?;
        Ok((v != -1).then_some(v))
    }

    fn unexpected(&self, field: &'static str, expected: &'static str, found: &Value) -> KrdsError {
        KrdsError::UnexpectedValue {
            object: self.object.to_string(),
            field,
            expected,
            found: found.kind().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Fixture encoder ──────────────────────────────────────────────────────

    #[derive(Default)]
    struct Enc(Vec<u8>);

    impl Enc {
        fn store(values: usize) -> Self {
            let mut e = Enc(SIGNATURE.to_vec());
            e.long(1);
            e.long(values as i64);
            e
        }
        fn int(&mut self, v: i32) -> &mut Self {
            self.0.push(TAG_INT as u8);
            self.0.extend_from_slice(&v.to_be_bytes());
            self
        }
        fn long(&mut self, v: i64) -> &mut Self {
            self.0.push(TAG_LONG as u8);
            self.0.extend_from_slice(&v.to_be_bytes());
            self
        }
        fn raw_utf(&mut self, s: &str) -> &mut Self {
            if s.is_empty() {
                self.0.push(1);
            } else {
                self.0.push(0);
                self.0.extend_from_slice(&(s.len() as u16).to_be_bytes());
                self.0.extend_from_slice(s.as_bytes());
            }
            self
        }
        fn utf(&mut self, s: &str) -> &mut Self {
            self.0.push(TAG_UTF as u8);
            self.raw_utf(s)
        }
        fn begin(&mut self, name: &str) -> &mut Self {
            self.0.push(TAG_OBJECT_BEGIN as u8);
            self.raw_utf(name)
        }
        fn end(&mut self) -> &mut Self {
            self.0.push(TAG_OBJECT_END as u8);
            self
        }
        fn annotation(&mut self, class: AnnotationClass, start: &str, end: &str) -> &mut Self {
            self.begin(class.type_name())
                .utf(start)
                .utf(end)
                .long(1_700_000_000_000)
                .long(-1)
                .utf("");
            if class == AnnotationClass::Note {
                self.utf("my note");
            }
            self.end()
        }
    }

    fn cache_store() -> Vec<u8> {
        let mut e = Enc::store(1);
        e.begin(CACHE_OBJECT).int(2);
        e.int(1).begin(INTERVAL_TREE).int(2);
        e.annotation(AnnotationClass::Highlight, "3 0 10 1 100 200 50 14", "3 0 20 1 150 200 10 14");
        e.annotation(AnnotationClass::Highlight, "4 0 10 1 100 300 50 14", "4 0 20 1 150 300 10 14");
        e.end();
        e.int(2).begin(INTERVAL_TREE).int(1);
        e.annotation(AnnotationClass::Note, "3 0 20 1 150 200 10 14", "3 0 20 1 150 200 10 14");
        e.end();
        e.end();
        e.0
    }

    // ── Tests ────────────────────────────────────────────────────────────────

    #[test]
    fn rejects_bad_signature() {
        let err = decode(b"%PDF-1.7 not a store").unwrap_err();
        assert!(matches!(err, KrdsError::BadSignature { .. }), "got {err:?}");
    }

    #[test]
    fn rejects_short_input_as_bad_signature() {
        let err = decode(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, KrdsError::BadSignature { .. }), "got {err:?}");
    }

    #[test]
    fn rejects_wrong_first_value() {
        let mut e = Enc(SIGNATURE.to_vec());
        e.long(2).long(0);
        let err = decode(&e.0).unwrap_err();
        assert!(matches!(err, KrdsError::BadFirstValue { .. }));
    }

    #[test]
    fn empty_store_decodes() {
        let store = decode(&Enc::store(0).0).unwrap();
        assert!(store.entries().is_empty());
        assert!(store.warnings().is_empty());
    }

    #[test]
    fn decodes_annotation_cache() {
        let store = decode(&cache_store()).unwrap();
        let annotations = store.annotations();
        assert_eq!(annotations.len(), 3);
        assert_eq!(
            annotations
                .iter()
                .filter(|a| a.class == AnnotationClass::Highlight)
                .count(),
            2
        );
        let note = annotations
            .iter()
            .find(|a| a.class == AnnotationClass::Note)
            .unwrap();
        assert_eq!(note.note.as_deref(), Some("my note"));
        assert_eq!(note.creation_time, Some(1_700_000_000_000));
        assert_eq!(note.last_modification_time, None);
    }

    #[test]
    fn top_level_annotations_are_unioned_without_duplicates() {
        let mut e = Enc::store(3);
        e.begin(CACHE_OBJECT).int(1);
        e.int(1).begin(INTERVAL_TREE).int(1);
        e.annotation(AnnotationClass::Highlight, "1 0 0 0 10 10 10 10", "1 0 0 0 20 10 10 10");
        e.end().end();
        // Same record again at top level, plus a new one.
        e.annotation(AnnotationClass::Highlight, "1 0 0 0 10 10 10 10", "1 0 0 0 20 10 10 10");
        e.annotation(AnnotationClass::Bookmark, "2 0 0 0", "2 0 0 0");
        let store = decode(&e.0).unwrap();
        assert_eq!(store.annotations().len(), 2);
    }

    #[test]
    fn unknown_object_is_preserved() {
        let mut e = Enc::store(1);
        e.begin("some.future.object").int(7).utf("x").end();
        let store = decode(&e.0).unwrap();
        match store.get("some.future.object") {
            Some(Object::Opaque {
                type_name,
                raw_values,
            }) => {
                assert_eq!(type_name, "some.future.object");
                assert_eq!(raw_values.len(), 2);
            }
            other => panic!("expected opaque, got {other:?}"),
        }
        assert!(matches!(
            store.warnings()[0],
            DecodeWarning::UnknownObject { .. }
        ));
    }

    #[test]
    fn unknown_annotation_class_is_skipped() {
        let mut e = Enc::store(1);
        e.begin(CACHE_OBJECT).int(2);
        e.int(99).begin(INTERVAL_TREE).int(0).end();
        e.int(1).begin(INTERVAL_TREE).int(1);
        e.annotation(AnnotationClass::Highlight, "1 0 0 0 10 10 10 10", "1 0 0 0 20 10 10 10");
        e.end().end();
        let store = decode(&e.0).unwrap();
        assert_eq!(store.annotations().len(), 1);
        assert!(store
            .warnings()
            .contains(&DecodeWarning::UnknownAnnotationClass { id: 99 }));
    }

    #[test]
    fn lpr_versions() {
        let mut e = Enc::store(1);
        e.begin("lpr").int(2).utf("12 0 0 0").long(-1).end();
        let store = decode(&e.0).unwrap();
        assert_eq!(
            store.get("lpr"),
            Some(&Object::LastPageRead {
                position: "12 0 0 0".into(),
                time: None
            })
        );

        let mut e = Enc::store(1);
        e.begin("lpr").int(3).end();
        assert!(matches!(
            decode(&e.0).unwrap_err(),
            KrdsError::UnsupportedLprVersion { version: 3 }
        ));
    }

    #[test]
    fn key_value_map() {
        let mut e = Enc::store(1);
        e.begin("ReaderMetrics").int(1).utf("pages").int(42).end();
        let store = decode(&e.0).unwrap();
        let json = store.to_json();
        assert_eq!(json["ReaderMetrics"]["pages"], 42);
    }

    #[test]
    fn trailing_bytes_warn() {
        let mut bytes = Enc::store(0).0;
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        let store = decode(&bytes).unwrap();
        assert_eq!(
            store.warnings(),
            &[DecodeWarning::TrailingBytes { count: 2 }]
        );
    }

    #[test]
    fn invalid_bool_is_fatal() {
        let mut e = Enc::store(1);
        e.0.extend_from_slice(&[TAG_BOOLEAN as u8, 5]);
        assert!(matches!(
            decode(&e.0).unwrap_err(),
            KrdsError::InvalidBool { value: 5, .. }
        ));
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let mut e = Enc::store(1);
        e.0.push(42);
        assert!(matches!(
            decode(&e.0).unwrap_err(),
            KrdsError::UnknownTypeTag { tag: 42, .. }
        ));
    }

    #[test]
    fn lenient_keeps_prefix_objects() {
        let mut e = Enc::store(2);
        e.begin("lpu").int(5).end();
        e.begin("erl"); // truncated
        let partial = decode_lenient(&e.0);
        assert!(partial.error.is_some());
        assert_eq!(partial.store.get("lpu"), Some(&Object::Single(Value::Int(5))));
    }

    #[test]
    fn missing_annotation_field_is_fatal() {
        let mut e = Enc::store(1);
        e.begin("annotation.personal.highlight").utf("1 0 0 0").end();
        assert!(matches!(
            decode(&e.0).unwrap_err(),
            KrdsError::MissingField {
                field: "endPosition",
                ..
            }
        ));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut e = Enc::store(1);
        for _ in 0..(MAX_DEPTH + 1) {
            e.begin("x");
        }
        assert!(matches!(
            decode(&e.0).unwrap_err(),
            KrdsError::TooDeep { .. }
        ));
    }
}
