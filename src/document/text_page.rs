//! Glyph-level page text shared by the document backends.
//!
//! A page is a list of text lines, each a list of glyphs with their boxes in
//! document space. Search, extraction and word grouping all work on this one
//! model so every backend behaves the same way.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Glyph {
    pub ch: char,
    /// Empty for generated whitespace.
    pub rect: Rect,
}

impl Glyph {
    pub fn new(ch: char, rect: Rect) -> Self {
        Self { ch, rect }
    }
}

/// A run of non-whitespace glyphs on one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub rect: Rect,
    /// Index of the text line the word sits on.
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextPage {
    lines: Vec<Vec<Glyph>>,
}

/// One character of the folded search view and the glyph it came from.
type Folded = (char, Option<(usize, usize)>);

impl TextPage {
    pub fn from_lines(lines: Vec<Vec<Glyph>>) -> Self {
        Self { lines }
    }

    /// Split a character stream into lines.
    ///
    /// A line ends at `\n`, or where a visible glyph's vertical centre moves
    /// by more than half its height from the previous visible glyph.
    pub fn from_glyph_stream(glyphs: impl IntoIterator<Item = Glyph>) -> Self {
        let mut lines: Vec<Vec<Glyph>> = Vec::new();
        let mut current: Vec<Glyph> = Vec::new();
        let mut last_visible: Option<Rect> = None;

        for glyph in glyphs {
            match glyph.ch {
                '\r' => continue,
                '\n' => {
                    lines.push(std::mem::take(&mut current));
                    last_visible = None;
                    continue;
                }
                _ => {}
            }
            let visible = !glyph.ch.is_whitespace() && !glyph.rect.is_empty();
            if visible {
                if let Some(prev) = last_visible {
                    let jump = (glyph.rect.center().y - prev.center().y).abs();
                    if jump > glyph.rect.height().max(prev.height()) / 2.0 {
                        lines.push(std::mem::take(&mut current));
                    }
                }
                last_visible = Some(glyph.rect);
            }
            current.push(glyph);
        }
        if !current.is_empty() {
            lines.push(current);
        }
        lines.retain(|l| l.iter().any(|g| !g.ch.is_whitespace()));
        Self { lines }
    }

    pub fn lines(&self) -> &[Vec<Glyph>] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Page text, lines joined by `\n`.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.iter().map(|g| g.ch).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Case-insensitive literal search; whitespace in `needle` matches any
    /// run of whitespace or a line break in the page.
    ///
    /// Returns one rectangle per line fragment of every non-overlapping
    /// occurrence, in reading order.
    pub fn search(&self, needle: &str) -> Vec<Rect> {
        let needle: Vec<char> = fold_needle(needle);
        if needle.is_empty() {
            return Vec::new();
        }
        let hay = self.folded();
        let mut out = Vec::new();
        let mut i = 0;
        while i + needle.len() <= hay.len() {
            if hay[i..i + needle.len()]
                .iter()
                .zip(&needle)
                .all(|((c, _), n)| c == n)
            {
                out.extend(self.fragment_rects(&hay[i..i + needle.len()]));
                i += needle.len();
            } else {
                i += 1;
            }
        }
        out
    }

    /// Text of the glyphs whose centre lies inside `rect`.
    pub fn text_in_rect(&self, rect: &Rect) -> String {
        let mut out: Vec<String> = Vec::new();
        for line in &self.lines {
            let inside: Vec<usize> = line
                .iter()
                .enumerate()
                .filter(|(_, g)| !g.ch.is_whitespace() && rect.contains(&g.rect.center()))
                .map(|(i, _)| i)
                .collect();
            let (Some(&first), Some(&last)) = (inside.first(), inside.last()) else {
                continue;
            };
            let text: String = line[first..=last]
                .iter()
                .filter(|g| g.ch.is_whitespace() || rect.contains(&g.rect.center()))
                .map(|g| g.ch)
                .collect();
            out.push(text);
        }
        out.join("\n")
    }

    pub fn words(&self) -> Vec<Word> {
        let mut words = Vec::new();
        let end_of_line = Glyph::new(' ', Rect::default());
        for (line_idx, line) in self.lines.iter().enumerate() {
            let mut text = String::new();
            let mut rects: Vec<Rect> = Vec::new();
            for glyph in line.iter().chain(std::iter::once(&end_of_line)) {
                if glyph.ch.is_whitespace() {
                    if let Some(rect) = Rect::union_all(&rects) {
                        words.push(Word {
                            text: std::mem::take(&mut text),
                            rect,
                            line: line_idx,
                        });
                    }
                    text.clear();
                    rects.clear();
                } else {
                    text.push(glyph.ch);
                    if !glyph.rect.is_empty() {
                        rects.push(glyph.rect);
                    }
                }
            }
        }
        words
    }

    /// Bounding box of each non-blank line.
    pub fn line_rects(&self) -> Vec<Rect> {
        self.lines
            .iter()
            .filter_map(|line| {
                let rects: Vec<Rect> = line
                    .iter()
                    .filter(|g| !g.ch.is_whitespace() && !g.rect.is_empty())
                    .map(|g| g.rect)
                    .collect();
                Rect::union_all(&rects)
            })
            .collect()
    }

    fn folded(&self) -> Vec<Folded> {
        let mut out: Vec<Folded> = Vec::new();
        for (li, line) in self.lines.iter().enumerate() {
            if !out.is_empty() && out.last().map(|(c, _)| *c) != Some(' ') {
                out.push((' ', None));
            }
            for (gi, glyph) in line.iter().enumerate() {
                if glyph.ch.is_whitespace() {
                    if out.last().map(|(c, _)| *c) != Some(' ') {
                        out.push((' ', None));
                    }
                } else {
                    out.push((fold_char(glyph.ch), Some((li, gi))));
                }
            }
        }
        out
    }

    fn fragment_rects(&self, hit: &[Folded]) -> Vec<Rect> {
        let mut out: Vec<Rect> = Vec::new();
        let mut current_line: Option<usize> = None;
        let mut acc: Option<Rect> = None;
        for (line, idx) in hit.iter().filter_map(|(_, r)| *r) {
            let rect = self.lines[line][idx].rect;
            if rect.is_empty() {
                continue;
            }
            if current_line != Some(line) {
                out.extend(acc.take());
                current_line = Some(line);
            }
            acc = Some(acc.map_or(rect, |a| a.union(&rect)));
        }
        out.extend(acc);
        out
    }
}

fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn fold_needle(needle: &str) -> Vec<char> {
    let mut out: Vec<char> = Vec::new();
    for c in needle.trim().chars() {
        if c.is_whitespace() {
            if out.last() != Some(&' ') {
                out.push(' ');
            }
        } else {
            out.push(fold_char(c));
        }
    }
    out
}
