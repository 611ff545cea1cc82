//! Error and warning types for the store decoder.
//!
//! * [`KrdsError`] is **fatal**: the byte stream is not a reader data store,
//!   or it is corrupt at some offset. Decoding stops at the first one.
//! * [`DecodeWarning`] is **non-fatal**: something was skipped (trailing
//!   bytes, an unknown annotation class, a top-level scalar) but every other
//!   object decoded normally.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Fatal decode errors.
#[derive(Error, Debug)]
pub enum KrdsError {
    // ── Framing ───────────────────────────────────────────────────────────
    /// The first eight bytes are not the store signature.
    #[error("Not a Kindle reader data store: signature {found:02X?} does not match 00 00 00 00 00 1A B1 26")]
    BadSignature { found: Vec<u8> },

    /// The store header value was present but not `1`.
    #[error("Store header must start with the value 1, found {found}")]
    BadFirstValue { found: String },

    /// The top-level value count is not a non-negative integer.
    #[error("Top-level value count must be a non-negative integer, found {found}")]
    BadValueCount { found: String },

    // ── Primitive decoding ────────────────────────────────────────────────
    /// The stream ended in the middle of a value.
    #[error("Unexpected end of data at offset {offset}: need {wanted} bytes, {available} available")]
    UnexpectedEof {
        offset: usize,
        wanted: usize,
        available: usize,
    },

    /// A type tag outside the known set.
    #[error("Unknown type tag {tag} at offset {offset}")]
    UnknownTypeTag { tag: i8, offset: usize },

    /// A boolean byte other than 0 or 1.
    #[error("Invalid boolean byte {value} at offset {offset}")]
    InvalidBool { value: i8, offset: usize },

    /// String bytes that are not valid UTF-8.
    #[error("Invalid UTF-8 data at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// Objects nested deeper than the decoder allows.
    #[error("Objects nested deeper than {limit} levels at offset {offset}")]
    TooDeep { limit: usize, offset: usize },

    // ── Object layouts ────────────────────────────────────────────────────
    /// An `lpr` object with a version this decoder does not understand.
    #[error("Unsupported lpr version {version}")]
    UnsupportedLprVersion { version: i64 },

    /// A field of a known object had the wrong type.
    #[error("Object '{object}', field '{field}': expected {expected}, found {found}")]
    UnexpectedValue {
        object: String,
        field: &'static str,
        expected: &'static str,
        found: String,
    },

    /// A known object ran out of values before all its fields were read.
    #[error("Object '{object}' ended before field '{field}'")]
    MissingField { object: String, field: &'static str },

    // ── I/O ───────────────────────────────────────────────────────────────
    /// The store file could not be read.
    #[error("Failed to read store file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Something the decoder skipped while carrying on.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum DecodeWarning {
    /// Bytes left over after the declared number of top-level values.
    #[error("{count} bytes of extra data after the last top-level value")]
    TrailingBytes { count: usize },

    /// A top-level value that is not an object and has no name to file it under.
    #[error("Skipped top-level {kind} value")]
    TopLevelScalar { kind: String },

    /// An annotation class id with no known name.
    #[error("Skipped unknown annotation class id {id}")]
    UnknownAnnotationClass { id: i64 },

    /// An `annotation.cache.object` whose layout did not match; buckets read
    /// before the problem are kept.
    #[error("Malformed annotation cache: {reason}")]
    MalformedCache { reason: String },

    /// An object name with no known layout; preserved as opaque.
    #[error("Unknown object type '{name}' kept as opaque ({values} values)")]
    UnknownObject { name: String, values: usize },
}
