//! Position strings.
//!
//! Annotation records locate themselves with a space-separated string:
//!
//! ```text
//! page  sequence  char_offset  unknown  x  y  width  height
//! 15    0         1020         1        377 517 44   14
//! ```
//!
//! Coordinates are device units (100 per inch) relative to the uncropped
//! page. Bookmarks usually carry only the first four tokens.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// 0-based page index.
    pub page: u32,
    pub sequence: u32,
    pub char_offset: u32,
    pub unknown: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// `false` when the string could not be parsed; every field is then zero.
    pub valid: bool,
}

impl Position {
    /// Parse a position string. Never fails; see [`Position::valid`].
    pub fn parse(raw: &str) -> Self {
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        let parsed = if tokens.len() >= 8 {
            parse_numbers::<8>(&tokens[..8]).map(|n| Position {
                page: n[0],
                sequence: n[1],
                char_offset: n[2],
                unknown: n[3],
                x: n[4],
                y: n[5],
                width: n[6],
                height: n[7],
                valid: true,
            })
        } else if tokens.len() >= 4 {
            parse_numbers::<4>(&tokens[..4]).map(|n| Position {
                page: n[0],
                sequence: n[1],
                char_offset: n[2],
                unknown: n[3],
                valid: true,
                ..Position::default()
            })
        } else {
            None
        };
        parsed.unwrap_or_default()
    }

    /// `true` when the position has a non-empty box.
    pub fn has_extent(&self) -> bool {
        self.valid && self.width > 0 && self.height > 0
    }

    /// `[x0, y0, x1, y1]` in device units; all zero when invalid.
    pub fn to_rect(&self) -> [f64; 4] {
        if !self.valid {
            return [0.0; 4];
        }
        let (x, y) = (f64::from(self.x), f64::from(self.y));
        [
            x,
            y,
            x + f64::from(self.width),
            y + f64::from(self.height),
        ]
    }
}

fn parse_numbers<const N: usize>(tokens: &[&str]) -> Option<[u32; N]> {
    let mut out = [0u32; N];
    for (slot, token) in out.iter_mut().zip(tokens) {
        *slot = token.parse().ok()?;
    }
    Some(out)
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {}",
            self.page,
            self.sequence,
            self.char_offset,
            self.unknown,
            self.x,
            self.y,
            self.width,
            self.height
        )
    }
}
