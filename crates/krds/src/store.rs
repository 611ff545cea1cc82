use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::decoder;
use crate::error::{DecodeWarning, KrdsError};
use crate::value::{AnnotationEntry, Object};

const CACHE_OBJECT: &str = "annotation.cache.object";
const PERSONAL_PREFIX: &str = "annotation.personal.";

/// A decoded reader data store.
///
/// Top-level objects are kept in store order. A later object with the same
/// name replaces the earlier one, except annotation objects, which some
/// stores place at top level one after another and which are all kept.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Store {
    entries: Vec<(String, Object)>,
    pub(crate) warnings: Vec<DecodeWarning>,
}

impl Store {
    /// Decode a store from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KrdsError> {
        decoder::decode(bytes)
    }

    /// Read and decode a `.pds` / `.pdt` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KrdsError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| KrdsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Decoding reader data store {} ({} bytes)", path.display(), bytes.len());
        Self::from_bytes(&bytes)
    }

    pub(crate) fn insert(&mut self, name: String, object: Object) {
        let is_annotation = matches!(object, Object::Annotation(_));
        if !is_annotation {
            if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
                debug!("Top-level object '{}' replaced by a later one", name);
                slot.1 = object;
                return;
            }
        }
        self.entries.push((name, object));
    }

    /// Top-level objects in store order.
    pub fn entries(&self) -> &[(String, Object)] {
        &self.entries
    }

    /// The top-level object with this name, if any.
    pub fn get(&self, name: &str) -> Option<&Object> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, o)| o)
    }

    pub fn warnings(&self) -> &[DecodeWarning] {
        &self.warnings
    }

    /// Every annotation record in the store.
    ///
    /// Flattens the buckets of `annotation.cache.object` and any
    /// `annotation.personal.*` objects stored at top level. A record present
    /// in both places is returned once.
    pub fn annotations(&self) -> Vec<AnnotationEntry> {
        let mut out: Vec<AnnotationEntry> = Vec::new();
        let mut push = |entry: &AnnotationEntry| {
            if !out.contains(entry) {
                out.push(entry.clone());
            }
        };

        if let Some(Object::AnnotationCache(buckets)) = self.get(CACHE_OBJECT) {
            for (_, entries) in buckets {
                entries.iter().for_each(&mut push);
            }
        }
        for (name, object) in &self.entries {
            if !name.starts_with(PERSONAL_PREFIX) {
                continue;
            }
            if let Object::Annotation(entry) = object {
                push(entry);
            }
        }
        debug!("Extracted {} annotation records", out.len());
        out
    }

    /// The whole store as plain JSON, keyed by object name.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, object) in &self.entries {
            map.insert(name.clone(), object.to_json());
        }
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{AnnotationClass, Value};

    fn entry(start: &str) -> AnnotationEntry {
        AnnotationEntry {
            class: AnnotationClass::Highlight,
            start_position: start.into(),
            end_position: start.into(),
            creation_time: None,
            last_modification_time: None,
            template: Value::Utf(String::new()),
            note: None,
            notebook_ref: None,
        }
    }

    #[test]
    fn later_object_replaces_earlier() {
        let mut store = Store::default();
        store.insert("lpu".into(), Object::Single(Value::Int(1)));
        store.insert("lpu".into(), Object::Single(Value::Int(2)));
        assert_eq!(store.entries().len(), 1);
        assert_eq!(store.get("lpu"), Some(&Object::Single(Value::Int(2))));
    }

    #[test]
    fn top_level_annotations_accumulate() {
        let mut store = Store::default();
        let name = AnnotationClass::Highlight.type_name().to_string();
        store.insert(name.clone(), Object::Annotation(entry("1 0 0 0")));
        store.insert(name, Object::Annotation(entry("2 0 0 0")));
        assert_eq!(store.annotations().len(), 2);
    }

    #[test]
    fn from_file_reports_missing_path() {
        let err = Store::from_file("/definitely/not/here.pds").unwrap_err();
        assert!(matches!(err, KrdsError::Io { .. }));
    }

    #[test]
    fn from_file_reads_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.pds");
        let mut bytes = crate::SIGNATURE.to_vec();
        for v in [1i64, 0] {
            bytes.push(2);
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        std::fs::write(&path, bytes).unwrap();
        let store = Store::from_file(&path).unwrap();
        assert!(store.annotations().is_empty());
    }
}
