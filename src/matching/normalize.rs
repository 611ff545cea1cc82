//! Text normalisation with a map back to the raw text.
//!
//! Rules, applied in one left-to-right pass:
//!
//! | Raw                 | Normalised |
//! |---------------------|------------|
//! | `-` `U+00AD` `\n`   | `-`        |
//! | `U+00AD`            | removed    |
//! | `-` `\n`            | removed    |
//! | whitespace run      | one space  |
//! | `ﬁ ﬂ ﬀ ﬃ ﬄ`         | letters    |
//!
//! Leading and trailing whitespace is dropped.

use std::ops::Range;

const SOFT_HYPHEN: char = '\u{ad}';

/// Ligatures and the letters they stand for, longest first.
const LIGATURES: [(char, &str); 5] = [
    ('\u{fb03}', "ffi"),
    ('\u{fb04}', "ffl"),
    ('\u{fb00}', "ff"),
    ('\u{fb01}', "fi"),
    ('\u{fb02}', "fl"),
];

/// Normalised text plus, for each of its characters, the index of the raw
/// character it came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    chars: Vec<char>,
    map: Vec<usize>,
    raw: Vec<char>,
}

impl Normalized {
    pub fn new(raw: &str) -> Self {
        let raw: Vec<char> = raw.chars().collect();
        let mut chars = Vec::with_capacity(raw.len());
        let mut map = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            let c = raw[i];
            let next = raw.get(i + 1).copied();
            let after = raw.get(i + 2).copied();
            match c {
                '-' if next == Some(SOFT_HYPHEN) && after == Some('\n') => {
                    chars.push('-');
                    map.push(i);
                    i += 3;
                    continue;
                }
                '-' if next == Some('\n') => {
                    i += 2;
                    continue;
                }
                SOFT_HYPHEN => {}
                c if c.is_whitespace() => {
                    if chars.last().is_some_and(|&l| l != ' ') {
                        chars.push(' ');
                        map.push(i);
                    }
                }
                c => match LIGATURES.iter().find(|(lig, _)| *lig == c) {
                    Some((_, letters)) => {
                        for l in letters.chars() {
                            chars.push(l);
                            map.push(i);
                        }
                    }
                    None => {
                        chars.push(c);
                        map.push(i);
                    }
                },
            }
            i += 1;
        }
        if chars.last() == Some(&' ') {
            chars.pop();
            map.pop();
        }
        Self { chars, map, raw }
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn as_string(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn slice(&self, range: Range<usize>) -> String {
        self.chars[range].iter().collect()
    }

    /// Start indices of every occurrence of `needle`, overlapping allowed.
    pub fn find_all(&self, needle: &[char]) -> Vec<usize> {
        if needle.is_empty() || needle.len() > self.chars.len() {
            return Vec::new();
        }
        self.chars
            .windows(needle.len())
            .enumerate()
            .filter(|(_, w)| *w == needle)
            .map(|(i, _)| i)
            .collect()
    }

    /// Occurrences of `needle` starting inside `window`.
    pub fn find_in(&self, needle: &[char], window: &Range<usize>) -> Vec<usize> {
        self.find_all(needle)
            .into_iter()
            .filter(|i| window.contains(i))
            .collect()
    }

    /// The raw text behind a normalised range.
    pub fn raw_text(&self, range: Range<usize>) -> String {
        if range.is_empty() || range.end > self.map.len() {
            return String::new();
        }
        let start = self.map[range.start];
        let end = self.map[range.end - 1] + 1;
        self.raw[start..end].iter().collect()
    }
}

/// Normalise text without keeping the index map.
pub fn normalize(text: &str) -> String {
    Normalized::new(text).as_string()
}

/// `text` with plain letters turned back into ligatures, one variant per
/// ligature found plus one with all of them.
pub fn ligature_variants(text: &str) -> Vec<String> {
    let mut variants: Vec<String> = Vec::new();
    let mut all = text.to_string();
    for (lig, letters) in LIGATURES {
        if text.contains(letters) {
            variants.push(text.replace(letters, &lig.to_string()));
        }
        all = all.replace(letters, &lig.to_string());
    }
    if all != text && !variants.contains(&all) {
        variants.push(all);
    }
    variants
}

/// Space-separated words of already-normalised text.
pub fn words(normalized: &str) -> Vec<&str> {
    normalized.split(' ').filter(|w| !w.is_empty()).collect()
}
