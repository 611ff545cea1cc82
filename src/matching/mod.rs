//! Text matching: locating clipping text inside the document.
//!
//! * [`normalize`]: hyphenation, soft hyphens, whitespace and ligatures, with
//!   an index map back to the raw page text.
//! * [`similarity`]: the character-level ratio that gates fuzzy matches.
//! * [`proximity`]: choosing the occurrence nearest the device position.
//! * [`strategies`]: the ordered search strategies.

pub mod normalize;
pub mod proximity;
pub mod similarity;
pub mod strategies;

pub use normalize::{normalize, Normalized};
pub use proximity::select_nearest;
pub use similarity::ratio;
pub use strategies::{Strategy, TextMatch, TextMatcher, STRATEGY_COUNT};
