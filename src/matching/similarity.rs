//! Character-level similarity ratio.
//!
//! Ratcliff/Obershelp: find the longest common block, recurse on the pieces
//! either side of it, and score `2 * matched / (len(a) + len(b))`. 1.0 means
//! identical, 0.0 means no character in common.

/// Similarity of two strings in `[0.0, 1.0]`.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]` as
/// `(start in a, start in b, length)`; the earliest one wins ties.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    let width = bhi - blo;
    // prev[j + 1] = length of the common suffix ending at a[i - 1], b[blo + j]
    let mut prev = vec![0usize; width + 1];
    let mut cur = vec![0usize; width + 1];
    for i in alo..ahi {
        for j in 0..width {
            cur[j + 1] = if a[i] == b[blo + j] { prev[j] + 1 } else { 0 };
            let k = cur[j + 1];
            if k > best.2 {
                best = (i + 1 - k, blo + j + 1 - k, k);
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_and_disjoint() {
        assert_eq!(ratio("same text", "same text"), 1.0);
        assert_eq!(ratio("abc", "xyz"), 0.0);
        assert_eq!(ratio("", ""), 1.0);
        assert_eq!(ratio("abc", ""), 0.0);
    }

    #[test]
    fn known_value() {
        // Blocks "ab" and "d": 2 * 3 / 8.
        assert!((ratio("abcd", "abxd") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn one_substitution_stays_above_threshold() {
        let truth = "the quick brown fox jumps over the lazy dog";
        let noisy = "the quick brown fox jumps 0ver the lazy dog";
        assert!(ratio(truth, noisy) >= 0.90);
    }

    #[test]
    fn unrelated_sentences_fall_below_threshold() {
        let a = "Concepts are the building blocks of software design.";
        let b = "Rain is expected over the northern hills tomorrow.";
        assert!(ratio(a, b) < 0.90);
    }
}
