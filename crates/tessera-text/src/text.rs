#![forbid(unsafe_code)]

//! Persistent, line-indexed rope.
//!
//! A [`Text`] is an immutable tree of lines. Leaves hold up to [`BRANCH`]
//! line strings; branches hold child texts and cache their aggregate length
//! and line count. Every operation returns a new `Text` and shares untouched
//! subtrees with its input, so cloning and editing are cheap and values can
//! be handed across threads freely.
//!
//! Positions count chars. Lines are joined by a single line break, which is
//! one position wide; there is no break after the last line, and an empty
//! document still has one (empty) line.
//!
//! # Example
//! ```
//! use tessera_text::text::Text;
//!
//! let doc = Text::of(["abc", "def"]).unwrap();
//! assert_eq!(doc.len(), 7);
//! assert_eq!(doc.lines(), 2);
//!
//! let edited = doc.replace(3, 3, &Text::from("X"));
//! assert_eq!(edited.to_string(), "abcX\ndef");
//! assert_eq!(edited.line(2).unwrap().text, "def");
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use bitflags::bitflags;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::char::{char_len, slice_chars};
use crate::cursor::{Direction, LineCursor, PartialTextCursor, RawTextCursor, TextIterator};
use crate::error::{Result, TextError};

/// Shift used to derive chunk sizes from line counts.
pub const BRANCH_SHIFT: u32 = 5;
/// Maximum lines per leaf, and the line count under which a subtree is
/// collapsed back into a single leaf.
pub const BRANCH: usize = 1 << BRANCH_SHIFT;

/// Documents with at least this many lines get a debug event when built.
const LARGE_DOC_LINES: usize = 10_000;

bitflags! {
    /// Which ends of a decomposed range must be joined with their
    /// neighbours rather than emitted as separate lines.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Open: u8 {
        const FROM = 1;
        const TO = 2;
    }
}

/// Immutable rope of lines.
#[derive(Clone)]
pub struct Text(Arc<Node>);

#[derive(Debug)]
pub(crate) enum Node {
    Leaf {
        text: Vec<String>,
        length: usize,
    },
    Branch {
        children: Vec<Text>,
        length: usize,
        lines: usize,
    },
}

/// A line of a document, as returned by [`Text::line_at`] and [`Text::line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// Position of the start of the line.
    pub from: usize,
    /// Position at the end of the line, before the line break.
    pub to: usize,
    /// 1-based line number.
    pub number: usize,
    /// The line's content.
    pub text: &'a str,
}

impl Line<'_> {
    /// Length of the line in chars.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.to - self.from
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }
}

impl Text {
    /// The canonical empty document.
    #[must_use]
    pub fn empty() -> Text {
        static EMPTY: OnceLock<Text> = OnceLock::new();
        EMPTY
            .get_or_init(|| Text::leaf(vec![String::new()], 0))
            .clone()
    }

    /// Build a document from its lines. Lines must not contain line breaks.
    ///
    /// Fails with [`TextError::EmptyDocument`] if no lines are given.
    pub fn of<I, S>(lines: I) -> Result<Text>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        if lines.is_empty() {
            return Err(TextError::EmptyDocument);
        }
        debug_assert!(
            !lines.iter().any(|line| has_line_break(line)),
            "Text::of given a line containing a line break"
        );
        Ok(Text::from_lines(lines))
    }

    /// Build from a non-empty line vector.
    pub(crate) fn from_lines(lines: Vec<String>) -> Text {
        debug_assert!(!lines.is_empty());
        if lines.len() == 1 && lines[0].is_empty() {
            return Text::empty();
        }
        if lines.len() <= BRANCH {
            return Text::leaf_counted(lines);
        }
        if lines.len() >= LARGE_DOC_LINES {
            tracing::debug!(lines = lines.len(), "building large document");
        }
        let length = text_length(&lines);
        let mut leaves = Vec::with_capacity(lines.len() / BRANCH + 1);
        split_leaves(lines, &mut leaves);
        Text::from_children(leaves, length)
    }

    /// Split a string into lines, on `sep` if given or on `\r\n`, `\r` and
    /// `\n` otherwise.
    #[must_use]
    pub fn split_lines(s: &str, sep: Option<&str>) -> Vec<String> {
        match sep {
            Some(sep) if !sep.is_empty() => s.split(sep).map(str::to_string).collect(),
            _ => {
                let mut lines = Vec::new();
                let mut rest = s;
                while let Some(idx) = rest.find(['\r', '\n']) {
                    lines.push(rest[..idx].to_string());
                    let skip = if rest[idx..].starts_with("\r\n") { 2 } else { 1 };
                    rest = &rest[idx + skip..];
                }
                lines.push(rest.to_string());
                lines
            }
        }
    }

    /// Build a document from a string, splitting it with [`Text::split_lines`].
    #[must_use]
    pub fn from_text(s: &str, sep: Option<&str>) -> Text {
        Text::from_lines(Text::split_lines(s, sep))
    }

    fn leaf(text: Vec<String>, length: usize) -> Text {
        Text(Arc::new(Node::Leaf { text, length }))
    }

    fn leaf_counted(text: Vec<String>) -> Text {
        let length = text_length(&text);
        Text::leaf(text, length)
    }

    fn branch(children: Vec<Text>, length: usize) -> Text {
        let lines = children.iter().map(Text::lines).sum();
        Text(Arc::new(Node::Branch {
            children,
            length,
            lines,
        }))
    }

    #[inline]
    pub(crate) fn node(&self) -> &Node {
        &self.0
    }

    /// Total length in chars, counting each line break as one.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self.node() {
            Node::Leaf { length, .. } | Node::Branch { length, .. } => *length,
        }
    }

    /// Number of lines (always at least 1).
    #[inline]
    #[must_use]
    pub fn lines(&self) -> usize {
        match self.node() {
            Node::Leaf { text, .. } => text.len(),
            Node::Branch { lines, .. } => *lines,
        }
    }

    /// Returns `true` if the document has no content.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Child nodes for a branch, or `None` for a leaf.
    #[must_use]
    pub fn children(&self) -> Option<&[Text]> {
        match self.node() {
            Node::Leaf { .. } => None,
            Node::Branch { children, .. } => Some(children),
        }
    }

    /// Number of direct entries (lines for a leaf, children for a branch).
    pub(crate) fn node_size(&self) -> usize {
        match self.node() {
            Node::Leaf { text, .. } => text.len(),
            Node::Branch { children, .. } => children.len(),
        }
    }

    /// Line containing position `pos`.
    pub fn line_at(&self, pos: usize) -> Result<Line<'_>> {
        if pos > self.len() {
            return Err(TextError::PositionOutOfRange {
                pos,
                length: self.len(),
            });
        }
        Ok(self.line_inner(pos, false, 1, 0))
    }

    /// Line by 1-based number.
    pub fn line(&self, n: usize) -> Result<Line<'_>> {
        if n < 1 || n > self.lines() {
            return Err(TextError::LineOutOfRange {
                line: n,
                lines: self.lines(),
            });
        }
        Ok(self.line_inner(n, true, 1, 0))
    }

    fn line_inner(&self, target: usize, is_line: bool, mut line: usize, mut offset: usize) -> Line<'_> {
        match self.node() {
            Node::Leaf { text, .. } => {
                let last = text.len() - 1;
                for string in &text[..last] {
                    let end = offset + char_len(string);
                    if (if is_line { line } else { end }) >= target {
                        return Line {
                            from: offset,
                            to: end,
                            number: line,
                            text: string,
                        };
                    }
                    offset = end + 1;
                    line += 1;
                }
                let string = &text[last];
                Line {
                    from: offset,
                    to: offset + char_len(string),
                    number: line,
                    text: string,
                }
            }
            Node::Branch { children, .. } => {
                let last = children.len() - 1;
                for child in &children[..last] {
                    let end = offset + child.len();
                    let end_line = line + child.lines() - 1;
                    if (if is_line { end_line } else { end }) >= target {
                        return child.line_inner(target, is_line, line, offset);
                    }
                    offset = end + 1;
                    line = end_line + 1;
                }
                children[last].line_inner(target, is_line, line, offset)
            }
        }
    }

    /// Replace `[from, to)` with `text`. Bounds are clipped to the document.
    #[must_use]
    pub fn replace(&self, from: usize, to: usize, text: &Text) -> Text {
        let (from, to) = clip(self, from, to);
        match (self.node(), text.node()) {
            (Node::Leaf { text: lines, length }, Node::Leaf { text: ins, length: ins_len }) => {
                let mut head = slice_text(lines, 0, from);
                append_text(ins, &mut head, 0, usize::MAX);
                append_text(lines, &mut head, to, usize::MAX);
                let new_len = length - (to - from) + ins_len;
                if head.len() <= BRANCH {
                    return Text::leaf(head, new_len);
                }
                let mut leaves = Vec::new();
                split_leaves(head, &mut leaves);
                Text::from_children(leaves, new_len)
            }
            (Node::Branch { children, length, lines }, _) if text.lines() < *lines => {
                let mut pos = 0;
                for (i, child) in children.iter().enumerate() {
                    let end = pos + child.len();
                    // Only one child is affected; keep the rest of the
                    // branch if that child stays within balance.
                    if from >= pos && to <= end {
                        let updated = child.replace(from - pos, to - pos, text);
                        let total_lines = lines - child.lines() + updated.lines();
                        if updated.lines() < (total_lines >> (BRANCH_SHIFT - 1))
                            && updated.lines() > (total_lines >> (BRANCH_SHIFT + 1))
                        {
                            let mut copy = children.clone();
                            copy[i] = updated;
                            return Text::branch(copy, length - (to - from) + text.len());
                        }
                        tracing::debug!(
                            child_lines = updated.lines(),
                            total_lines,
                            "child out of balance, rebuilding branch"
                        );
                        return self.replace_general(pos, end, &updated);
                    }
                    pos = end + 1;
                }
                self.replace_general(from, to, text)
            }
            _ => self.replace_general(from, to, text),
        }
    }

    fn replace_general(&self, from: usize, to: usize, text: &Text) -> Text {
        let mut parts = Vec::new();
        self.decompose(0, from, &mut parts, Open::TO);
        if !text.is_empty() {
            text.decompose(0, text.len(), &mut parts, Open::FROM | Open::TO);
        }
        self.decompose(to, self.len(), &mut parts, Open::FROM);
        Text::from_children(parts, self.len() - (to - from) + text.len())
    }

    /// Append another document. Equivalent to `replace(len, len, other)`.
    #[must_use]
    pub fn append(&self, other: &Text) -> Text {
        self.replace(self.len(), self.len(), other)
    }

    /// The sub-document in `[from, to)`. Bounds are clipped.
    #[must_use]
    pub fn slice(&self, from: usize, to: usize) -> Text {
        let (from, to) = clip(self, from, to);
        let mut parts = Vec::new();
        self.decompose(from, to, &mut parts, Open::empty());
        Text::from_children(parts, to - from)
    }

    /// Push the pieces of `[from, to)` (relative to this node) onto `target`.
    fn decompose(&self, from: usize, to: usize, target: &mut Vec<Text>, open: Open) {
        match self.node() {
            Node::Leaf { text: lines, length } => {
                let piece = if from == 0 && to >= *length {
                    self.clone()
                } else {
                    Text::leaf(slice_text(lines, from, to), to.min(*length) - from)
                };
                if !open.contains(Open::FROM) {
                    target.push(piece);
                    return;
                }
                let Some(prev) = target.pop() else {
                    target.push(piece);
                    return;
                };
                let mut joined = Vec::with_capacity(prev.lines() + piece.lines());
                prev.flatten(&mut joined);
                if let Node::Leaf { text: piece_lines, .. } = piece.node() {
                    append_text(piece_lines, &mut joined, 0, usize::MAX);
                }
                if joined.len() <= BRANCH {
                    target.push(Text::leaf(joined, prev.len() + piece.len()));
                } else {
                    let tail = joined.split_off(joined.len() >> 1);
                    target.push(Text::leaf_counted(joined));
                    target.push(Text::leaf_counted(tail));
                }
            }
            Node::Branch { children, .. } => {
                let mut pos = 0;
                for child in children {
                    if pos > to {
                        break;
                    }
                    let end = pos + child.len();
                    if from <= end && to >= pos {
                        let mut child_open = Open::empty();
                        if pos <= from {
                            child_open |= Open::FROM;
                        }
                        if end >= to {
                            child_open |= Open::TO;
                        }
                        let child_open = open & child_open;
                        if pos >= from && end <= to && child_open.is_empty() {
                            target.push(child.clone());
                        } else {
                            child.decompose(from.saturating_sub(pos), to - pos, target, child_open);
                        }
                    }
                    pos = end + 1;
                }
            }
        }
    }

    /// Build a balanced node from a sequence of children that are separated
    /// by line breaks.
    fn from_children(children: Vec<Text>, length: usize) -> Text {
        let lines: usize = children.iter().map(Text::lines).sum();
        if lines < BRANCH {
            let mut flat = Vec::with_capacity(lines);
            for child in &children {
                child.flatten(&mut flat);
            }
            return Text::leaf(flat, length);
        }
        let chunk = BRANCH.max(lines >> BRANCH_SHIFT);
        let mut chunker = Chunker {
            chunk,
            max_chunk: chunk << 1,
            min_chunk: chunk >> 1,
            chunked: Vec::new(),
            current: Vec::new(),
            current_lines: 0,
            current_len: 0,
        };
        for child in children {
            chunker.add(child);
        }
        chunker.flush();
        let mut chunked = chunker.chunked;
        if chunked.len() == 1 {
            return chunked.remove(0);
        }
        Text::branch(chunked, length)
    }

    /// Push all line strings onto `target`.
    pub(crate) fn flatten(&self, target: &mut Vec<String>) {
        match self.node() {
            Node::Leaf { text, .. } => target.extend(text.iter().cloned()),
            Node::Branch { children, .. } => {
                for child in children {
                    child.flatten(target);
                }
            }
        }
    }

    /// Length of the run of structurally shared children at the start
    /// (`forward`) or end of two trees, including the trailing line breaks.
    fn scan_identical(&self, other: &Text, forward: bool) -> usize {
        let (Node::Branch { children: a, .. }, Node::Branch { children: b, .. }) =
            (self.node(), other.node())
        else {
            return 0;
        };
        let mut length = 0;
        for i in 0..a.len().min(b.len()) {
            let (ch_a, ch_b) = if forward {
                (&a[i], &b[i])
            } else {
                (&a[a.len() - 1 - i], &b[b.len() - 1 - i])
            };
            if !Arc::ptr_eq(&ch_a.0, &ch_b.0) {
                return length + ch_a.scan_identical(ch_b, forward);
            }
            length += ch_a.len() + 1;
        }
        length
    }

    /// Materialise `[from, to)` as a string, joining lines with `sep`.
    #[must_use]
    pub fn slice_string(&self, from: usize, to: usize, sep: &str) -> String {
        let (from, to) = clip(self, from, to);
        let mut out = String::new();
        self.write_slice(&mut out, from, to, sep);
        out
    }

    fn write_slice(&self, out: &mut String, from: usize, to: usize, sep: &str) {
        let mut pos = 0;
        match self.node() {
            Node::Leaf { text, .. } => {
                for (i, line) in text.iter().enumerate() {
                    if pos > to {
                        break;
                    }
                    let end = pos + char_len(line);
                    if pos > from && i > 0 {
                        out.push_str(sep);
                    }
                    if from < end && to > pos {
                        out.push_str(slice_chars(line, from.saturating_sub(pos), to - pos));
                    }
                    pos = end + 1;
                }
            }
            Node::Branch { children, .. } => {
                for (i, child) in children.iter().enumerate() {
                    if pos > to {
                        break;
                    }
                    let end = pos + child.len();
                    if pos > from && i > 0 {
                        out.push_str(sep);
                    }
                    if from < end && to > pos {
                        child.write_slice(out, from.saturating_sub(pos), (to - pos).min(child.len()), sep);
                    }
                    pos = end + 1;
                }
            }
        }
    }

    /// Iterate over line contents and line-break tokens.
    #[must_use]
    pub fn iter(&self, dir: Direction) -> RawTextCursor<'_> {
        RawTextCursor::new(self, dir)
    }

    /// Iterate over `[from, to)`; iterates backwards if `from > to`.
    #[must_use]
    pub fn iter_range(&self, from: usize, to: usize) -> PartialTextCursor<'_> {
        PartialTextCursor::new(self, from, to)
    }

    /// Iterate over line contents (no break tokens), optionally limited to
    /// lines `from..to` (1-based, `to` exclusive).
    pub fn iter_lines(&self, from: Option<usize>, to: Option<usize>) -> Result<LineCursor<'_>> {
        let Some(from) = from else {
            return Ok(LineCursor::new(self.iter_range(0, self.len())));
        };
        let to = to.unwrap_or(self.lines() + 1);
        let start = self.line(from)?.from;
        let end = if to == self.lines() + 1 {
            self.len()
        } else if to <= 1 {
            0
        } else {
            self.line(to - 1)?.to
        };
        Ok(LineCursor::new(self.iter_range(start, start.max(end))))
    }

    /// The document's lines as owned strings.
    #[must_use]
    pub fn to_json(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.lines());
        self.flatten(&mut lines);
        lines
    }

    /// Rebuild a document from a JSON array of line strings.
    pub fn from_json(json: &serde_json::Value) -> Result<Text> {
        let invalid = || TextError::InvalidJson("Text".into());
        let parts = json.as_array().ok_or_else(invalid)?;
        let lines = parts
            .iter()
            .map(|line| {
                line.as_str()
                    .filter(|line| !has_line_break(line))
                    .map(str::to_string)
                    .ok_or_else(invalid)
            })
            .collect::<Result<Vec<_>>>()?;
        Text::of(lines)
    }
}

struct Chunker {
    chunk: usize,
    max_chunk: usize,
    min_chunk: usize,
    chunked: Vec<Text>,
    current: Vec<Text>,
    current_lines: usize,
    /// Sum of `len + 1` over `current`.
    current_len: usize,
}

impl Chunker {
    fn add(&mut self, child: Text) {
        if child.lines() > self.max_chunk
            && let Some(children) = child.children()
        {
            for node in children {
                self.add(node.clone());
            }
            return;
        }
        if child.lines() > self.min_chunk
            && (self.current_lines > self.min_chunk || self.current_lines == 0)
        {
            self.flush();
            self.chunked.push(child);
            return;
        }
        if self.current_lines > 0
            && let Node::Leaf { text: child_lines, .. } = child.node()
            && let Some(last) = self.current.last_mut()
            && let Node::Leaf { text: last_lines, length: last_len } = last.node()
            && child_lines.len() + last_lines.len() <= BRANCH
        {
            let mut merged = Vec::with_capacity(child_lines.len() + last_lines.len());
            merged.extend(last_lines.iter().cloned());
            merged.extend(child_lines.iter().cloned());
            let merged = Text::leaf(merged, last_len + 1 + child.len());
            self.current_lines += child.lines();
            self.current_len += child.len() + 1;
            *last = merged;
            return;
        }
        if self.current_lines + child.lines() > self.chunk {
            self.flush();
        }
        self.current_lines += child.lines();
        self.current_len += child.len() + 1;
        self.current.push(child);
    }

    fn flush(&mut self) {
        if self.current_lines == 0 {
            return;
        }
        let mut current = std::mem::take(&mut self.current);
        let node = if current.len() == 1 {
            current.remove(0)
        } else {
            Text::from_children(current, self.current_len - 1)
        };
        self.chunked.push(node);
        self.current_len = 0;
        self.current_lines = 0;
    }
}

/// `true` if `line` holds a `\n` or `\r`, which a stored line never does.
pub(crate) fn has_line_break(line: &str) -> bool {
    line.contains(['\n', '\r'])
}

fn text_length(lines: &[String]) -> usize {
    lines.iter().map(|line| char_len(line) + 1).sum::<usize>() - 1
}

fn split_leaves(lines: Vec<String>, target: &mut Vec<Text>) {
    let mut part = Vec::with_capacity(BRANCH);
    for line in lines {
        part.push(line);
        if part.len() == BRANCH {
            target.push(Text::leaf_counted(std::mem::replace(
                &mut part,
                Vec::with_capacity(BRANCH),
            )));
        }
    }
    if !part.is_empty() {
        target.push(Text::leaf_counted(part));
    }
}

/// Append the `[from, to)` portion of `text` onto `target`, joining the first
/// appended piece onto the last line already in `target`.
fn append_text(text: &[String], target: &mut Vec<String>, from: usize, to: usize) {
    let mut pos = 0;
    let mut first = true;
    for line in text {
        if pos > to {
            break;
        }
        let line_len = char_len(line);
        let end = pos + line_len;
        if end >= from {
            let piece = slice_chars(line, from.saturating_sub(pos), (to - pos).min(line_len));
            match target.last_mut() {
                Some(last) if first => last.push_str(piece),
                _ => target.push(piece.to_string()),
            }
            first = false;
        }
        pos = end + 1;
    }
}

fn slice_text(text: &[String], from: usize, to: usize) -> Vec<String> {
    let mut target = vec![String::new()];
    append_text(text, &mut target, from, to);
    target
}

fn clip(text: &Text, from: usize, to: usize) -> (usize, usize) {
    let from = from.min(text.len());
    (from, to.min(text.len()).max(from))
}

impl PartialEq for Text {
    /// Content equality. Structurally shared runs at either end are skipped
    /// before the remaining content is compared.
    fn eq(&self, other: &Text) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if self.len() != other.len() || self.lines() != other.lines() {
            return false;
        }
        let start = self.scan_identical(other, true);
        let end = self.len().saturating_sub(self.scan_identical(other, false));
        let mut a = self.iter(Direction::Forward);
        let mut b = other.iter(Direction::Forward);
        let mut skip = start;
        let mut pos = start;
        loop {
            a.advance(skip);
            b.advance(skip);
            skip = 0;
            if a.line_break() != b.line_break() || a.done() != b.done() || a.value() != b.value()
            {
                return false;
            }
            pos += char_len(a.value());
            if a.done() || pos >= end {
                return true;
            }
        }
    }
}

impl Eq for Text {}

impl fmt::Debug for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Text")
            .field("length", &self.len())
            .field("lines", &self.lines())
            .field("node", self.node())
            .finish()
    }
}

impl Default for Text {
    fn default() -> Self {
        Text::empty()
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chunk in self.iter(Direction::Forward) {
            f.write_str(chunk)?;
        }
        Ok(())
    }
}

impl FromStr for Text {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Text::from_text(s, None))
    }
}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Text::from_text(s, None)
    }
}

impl From<String> for Text {
    fn from(s: String) -> Self {
        Text::from_text(&s, None)
    }
}

impl Serialize for Text {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.to_json())
    }
}

impl<'de> Deserialize<'de> for Text {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let lines = Vec::<String>::deserialize(deserializer)?;
        if lines.iter().any(|line| has_line_break(line)) {
            return Err(D::Error::custom(TextError::InvalidJson("Text".into())));
        }
        Text::of(lines).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("line {i}")).collect()
    }

    fn depth(text: &Text) -> usize {
        text.children()
            .map_or(1, |children| 1 + children.iter().map(depth).max().unwrap_or(0))
    }

    #[test]
    fn text_basic_counts() {
        let text = Text::from("Hello, world!");
        assert_eq!(text.len(), 13);
        assert_eq!(text.lines(), 1);
    }

    #[test]
    fn text_multiline_lines() {
        let text = Text::from("Line 1\nLine 2\nLine 3");
        assert_eq!(text.lines(), 3);
        assert_eq!(text.line(1).unwrap().text, "Line 1");
        assert_eq!(text.line(3).unwrap().text, "Line 3");
    }

    #[test]
    fn of_rejects_empty() {
        assert_eq!(Text::of(Vec::<String>::new()), Err(TextError::EmptyDocument));
    }

    #[test]
    fn of_single_empty_line_is_singleton() {
        let text = Text::of([""]).unwrap();
        assert!(Arc::ptr_eq(&text.0, &Text::empty().0));
        assert_eq!(text.len(), 0);
        assert_eq!(text.lines(), 1);
    }

    #[test]
    fn split_lines_default_and_custom() {
        assert_eq!(Text::split_lines("a\r\nb\rc\nd", None), vec!["a", "b", "c", "d"]);
        assert_eq!(Text::split_lines("a\n", None), vec!["a", ""]);
        assert_eq!(Text::split_lines("a|b", Some("|")), vec!["a", "b"]);
        assert_eq!(Text::split_lines("", None), vec![""]);
    }

    #[test]
    fn line_at_positions() {
        let text = Text::of(["abc", "def"]).unwrap();
        let line = text.line_at(3).unwrap();
        assert_eq!((line.from, line.to, line.number, line.text), (0, 3, 1, "abc"));
        let line = text.line_at(4).unwrap();
        assert_eq!((line.from, line.to, line.number, line.text), (4, 7, 2, "def"));
        assert_eq!(text.line_at(7).unwrap().number, 2);
        assert_eq!(line.len(), 3);
    }

    #[test]
    fn line_lookup_out_of_range() {
        let text = Text::of(["abc", "def"]).unwrap();
        assert_eq!(
            text.line_at(8),
            Err(TextError::PositionOutOfRange { pos: 8, length: 7 })
        );
        assert_eq!(text.line(0), Err(TextError::LineOutOfRange { line: 0, lines: 2 }));
        assert_eq!(text.line(3), Err(TextError::LineOutOfRange { line: 3, lines: 2 }));
    }

    #[test]
    fn line_lookup_in_large_document() {
        let text = Text::of(numbered(5000)).unwrap();
        assert!(text.children().is_some());
        for n in [1, 33, 1024, 4999, 5000] {
            let line = text.line(n).unwrap();
            assert_eq!(line.text, format!("line {}", n - 1));
            assert_eq!(text.line_at(line.from).unwrap().number, n);
            assert_eq!(text.line_at(line.to).unwrap().number, n);
        }
    }

    #[test]
    fn large_document_stays_shallow() {
        let text = Text::of(numbered(100_000)).unwrap();
        assert!(depth(&text) <= 4, "depth {}", depth(&text));
        assert_eq!(text.lines(), 100_000);
    }

    #[test]
    fn replace_inside_leaf() {
        let text = Text::from("Hello!");
        let text = text.replace(5, 5, &Text::from(", world"));
        assert_eq!(text.to_string(), "Hello, world!");
        let text = text.replace(5, 12, &Text::empty());
        assert_eq!(text.to_string(), "Hello!");
    }

    #[test]
    fn replace_inserting_line_breaks() {
        let text = Text::from("ab");
        let text = text.replace(1, 1, &Text::from("1\n2\n3"));
        assert_eq!(text.to_string(), "a1\n2\n3b");
        assert_eq!(text.lines(), 3);
        assert_eq!(text.len(), 7);
    }

    #[test]
    fn replace_clips_bounds() {
        let text = Text::from("hi");
        assert_eq!(text.replace(100, 200, &Text::from("!")).to_string(), "hi!");
    }

    #[test]
    fn replace_in_large_document_shares_structure() {
        let text = Text::of(numbered(3000)).unwrap();
        let pos = text.line(1500).unwrap().from;
        let edited = text.replace(pos, pos + 4, &Text::from("LINE"));
        assert_eq!(edited.line(1500).unwrap().text, "LINE 1499");
        assert_eq!(edited.line(1).unwrap().text, "line 0");
        let (Some(before), Some(after)) = (text.children(), edited.children()) else {
            panic!("expected branches");
        };
        let shared = before
            .iter()
            .zip(after)
            .filter(|(a, b)| Arc::ptr_eq(&a.0, &b.0))
            .count();
        assert!(shared > 0);
    }

    #[test]
    fn many_small_edits_keep_balance() {
        let mut text = Text::of(numbered(2000)).unwrap();
        for i in 0..2000 {
            let pos = (i * 7919) % text.len();
            text = text.replace(pos, pos, &Text::from("x\ny"));
        }
        assert_eq!(text.lines(), 4000);
        assert!(depth(&text) <= 5, "depth {}", depth(&text));
    }

    #[test]
    fn slice_basic() {
        let text = Text::from("hello world");
        assert_eq!(text.slice(0, 5).to_string(), "hello");
        assert_eq!(text.slice(6, 11).to_string(), "world");
        assert_eq!(text.slice(100, 200).to_string(), "");
    }

    #[test]
    fn slice_across_lines() {
        let text = Text::of(numbered(200)).unwrap();
        let from = text.line(10).unwrap().from + 2;
        let to = text.line(120).unwrap().from + 3;
        let slice = text.slice(from, to);
        assert_eq!(slice.lines(), 111);
        assert_eq!(slice.line(1).unwrap().text, "ne 9");
        assert_eq!(slice.line(111).unwrap().text, "lin");
        assert_eq!(slice.to_string(), text.slice_string(from, to, "\n"));
    }

    #[test]
    fn append_joins_lines() {
        let text = Text::from("ab\nc").append(&Text::from("d\nef"));
        assert_eq!(text.to_json(), vec!["ab", "cd", "ef"]);
    }

    #[test]
    fn slice_string_with_separator() {
        let text = Text::of(["one", "two", "three"]).unwrap();
        assert_eq!(text.slice_string(0, text.len(), "\r\n"), "one\r\ntwo\r\nthree");
        assert_eq!(text.slice_string(2, 5, "\n"), "e\nt");
        assert_eq!(text.slice_string(4, 4, "\n"), "");
    }

    #[test]
    fn unicode_positions_count_chars() {
        let text = Text::from("a\u{1F600}b\ncaf\u{e9}");
        assert_eq!(text.len(), 8);
        assert_eq!(text.slice(1, 2).to_string(), "\u{1F600}");
        assert_eq!(text.line_at(5).unwrap().text, "caf\u{e9}");
        let edited = text.replace(2, 2, &Text::from("\u{e9}"));
        assert_eq!(edited.to_string(), "a\u{1F600}\u{e9}b\ncaf\u{e9}");
    }

    #[test]
    fn eq_compares_content() {
        let a = Text::from("abc\ndef");
        let b = Text::of(["abc", "def"]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Text::from("abc\ndeg"));
        assert_ne!(a, Text::from("abcd\nef"));
    }

    #[test]
    fn eq_large_shared_trees() {
        let base = Text::of(numbered(5000)).unwrap();
        let pos = base.line(2500).unwrap().from;
        let a = base.replace(pos, pos + 1, &Text::from("L"));
        let b = base.replace(pos, pos + 1, &Text::from("L"));
        let c = base.replace(pos, pos + 1, &Text::from("M"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, base);
    }

    #[test]
    fn iter_lines_ranges() {
        let text = Text::of(["a", "", "c", "d"]).unwrap();
        let all: Vec<&str> = text.iter_lines(None, None).unwrap().collect();
        assert_eq!(all, vec!["a", "", "c", "d"]);
        let mid: Vec<&str> = text.iter_lines(Some(2), Some(4)).unwrap().collect();
        assert_eq!(mid, vec!["", "c"]);
        assert!(text.iter_lines(Some(9), None).is_err());
    }

    #[test]
    fn json_roundtrip() {
        let text = Text::of(["a", "b", ""]).unwrap();
        let json = serde_json::to_value(&text).unwrap();
        assert_eq!(json, serde_json::json!(["a", "b", ""]));
        assert_eq!(Text::from_json(&json).unwrap(), text);
        let back: Text = serde_json::from_value(json).unwrap();
        assert_eq!(back, text);
        assert!(Text::from_json(&serde_json::json!([])).is_err());
        assert!(Text::from_json(&serde_json::json!([1])).is_err());
        assert!(serde_json::from_str::<Text>("[]").is_err());
    }

    #[test]
    fn json_rejects_embedded_breaks() {
        assert_eq!(
            Text::from_json(&serde_json::json!(["a\nb"])),
            Err(TextError::InvalidJson("Text".into()))
        );
        assert!(Text::from_json(&serde_json::json!(["ok", "x\ry"])).is_err());
        assert!(serde_json::from_str::<Text>(r#"["a", "b\n"]"#).is_err());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "line containing a line break")]
    fn of_rejects_embedded_breaks_in_debug() {
        let _ = Text::of(["a\nb"]);
    }

    #[test]
    fn eq_scans_shared_runs_from_both_ends() {
        let base = Text::of(numbered(5000)).unwrap();
        let first = base.replace(2, 3, &Text::from("Q"));
        let last_line = base.line(5000).unwrap();
        let last = base.replace(last_line.from, last_line.from + 1, &Text::from("Q"));
        let shared_tail = first.scan_identical(&base, false);
        assert!(shared_tail >= base.len() - base.children().unwrap()[0].len());
        assert!(shared_tail <= base.len());
        assert_eq!(first.scan_identical(&base, true), 0);
        assert_ne!(first, base);
        assert_ne!(last, base);
        assert_eq!(last, base.replace(last_line.from, last_line.from + 1, &Text::from("Q")));
        assert_eq!(first.scan_identical(&first, true), first.len() + 1);
    }

    #[test]
    fn display_and_parse() {
        let text: Text = "a\nb".parse().unwrap();
        assert_eq!(format!("{text}"), "a\nb");
        assert_eq!(Text::default(), Text::empty());
    }

    #[test]
    fn text_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Text>();
    }
}
