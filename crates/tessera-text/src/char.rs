#![forbid(unsafe_code)]

//! Character-index and grapheme-cluster helpers.
//!
//! Document positions count Unicode scalar values, so everything that
//! touches a line string needs to translate char indices into byte offsets.
//! These helpers keep that translation in one place, along with the
//! cluster-break and column math used by cursor motion in higher layers.
//!
//! # Example
//! ```
//! use tessera_text::char::{count_column, find_cluster_break};
//!
//! // "e" + combining acute is one cluster of two chars.
//! assert_eq!(find_cluster_break("e\u{301}x", 0, true), 2);
//! assert_eq!(count_column("\tab", 4, 3), 6);
//! ```

use unicode_segmentation::UnicodeSegmentation;

/// Length of `s` in chars.
#[inline]
#[must_use]
pub fn char_len(s: &str) -> usize {
    if s.is_ascii() {
        s.len()
    } else {
        s.chars().count()
    }
}

/// Byte offset of the char at `idx`, clamped to `s.len()`.
#[must_use]
pub fn char_to_byte(s: &str, idx: usize) -> usize {
    if s.is_ascii() {
        return idx.min(s.len());
    }
    s.char_indices().nth(idx).map_or(s.len(), |(byte, _)| byte)
}

/// Slice `s` by char range `[from, to)`, clamping both ends.
#[must_use]
pub fn slice_chars(s: &str, from: usize, to: usize) -> &str {
    if from >= to {
        return "";
    }
    let start = char_to_byte(s, from);
    let end = start + char_to_byte(&s[start..], to - from);
    &s[start..end]
}

/// Find the next grapheme cluster break after (`forward`) or before `pos`.
///
/// `pos` and the result are char indices. Returns `pos` itself when there is
/// no further break in that direction.
#[must_use]
pub fn find_cluster_break(s: &str, pos: usize, forward: bool) -> usize {
    let mut at = 0;
    let mut last_before = 0;
    for cluster in s.graphemes(true) {
        let end = at + char_len(cluster);
        if forward {
            if end > pos {
                return end;
            }
        } else {
            if end >= pos {
                return at;
            }
            last_before = end;
        }
        at = end;
    }
    if forward { pos } else { last_before.min(pos) }
}

/// Count the display column at char offset `to`, expanding tabs to the next
/// multiple of `tab_size`. Each grapheme cluster counts as one column.
#[must_use]
pub fn count_column(s: &str, tab_size: usize, to: usize) -> usize {
    let tab_size = tab_size.max(1);
    let mut col = 0;
    let mut at = 0;
    for cluster in s.graphemes(true) {
        if at >= to {
            break;
        }
        if cluster == "\t" {
            col += tab_size - (col % tab_size);
        } else {
            col += 1;
        }
        at += char_len(cluster);
    }
    col
}

/// Find the char offset in `s` that corresponds to display column `col`.
///
/// Returns `None` when the line is shorter than `col`; callers that want
/// clamping can use `unwrap_or(char_len(s))`.
#[must_use]
pub fn find_column(s: &str, col: usize, tab_size: usize) -> Option<usize> {
    let tab_size = tab_size.max(1);
    let mut n = 0;
    let mut at = 0;
    for cluster in s.graphemes(true) {
        if n >= col {
            return Some(at);
        }
        n += if cluster == "\t" {
            tab_size - (n % tab_size)
        } else {
            1
        };
        at += char_len(cluster);
    }
    (n >= col).then_some(at)
}
