//! # krds
//!
//! Decoder for the Kindle reader data store: the `.pds` / `.pdt` sidecar files
//! a Kindle writes next to a personal document to remember reading position,
//! preferences and annotations.
//!
//! ## Format
//!
//! ```text
//! 00 00 00 00 00 1A B1 26          signature
//! <long 1>                          header value
//! <long N>                          number of top-level values
//! value × N                         each: i8 type tag + big-endian payload
//! ```
//!
//! | Tag | Type    | Payload                                   |
//! |-----|---------|-------------------------------------------|
//! |  0  | bool    | 1 byte, 0 or 1                            |
//! |  1  | int     | i32                                       |
//! |  2  | long    | i64                                       |
//! |  3  | utf     | bool "empty" flag, else u16 length + UTF-8 |
//! |  4  | double  | f64                                       |
//! |  5  | short   | i16                                       |
//! |  6  | float   | f32                                       |
//! |  7  | byte    | i8                                        |
//! |  9  | char    | 1 byte                                    |
//! | -2  | object  | utf name, values…, then tag -1            |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use krds::{Position, Store};
//!
//! let store = Store::from_file("book.pdf-cdeKey_ABC.sdr/book.pds")?;
//! for entry in store.annotations() {
//!     let start = Position::parse(&entry.start_position);
//!     println!("{:?} on page {}", entry.class, start.page);
//! }
//! # Ok::<(), krds::KrdsError>(())
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

mod decoder;
mod error;
mod position;
mod reader;
mod store;
mod value;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use decoder::{decode, decode_lenient, PartialDecode, SIGNATURE};
pub use error::{DecodeWarning, KrdsError};
pub use position::Position;
pub use store::Store;
pub use value::{AnnotationClass, AnnotationEntry, Object, Value};
