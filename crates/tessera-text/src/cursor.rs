#![forbid(unsafe_code)]

//! Explicit-state cursors over a [`Text`].
//!
//! Each cursor walks the rope without materialising it, yielding line
//! contents and single `"\n"` tokens for the breaks between them. Cursors
//! own their position state; several cursors over the same `Text` are
//! independent.
//!
//! | Cursor | Yields | Built by |
//! |--------|--------|----------|
//! | [`RawTextCursor`] | content + break tokens, whole doc | [`Text::iter`] |
//! | [`PartialTextCursor`] | content + break tokens, clipped | [`Text::iter_range`] |
//! | [`LineCursor`] | one value per line, no breaks | [`Text::iter_lines`] |
//!
//! The raw cursor never yields empty strings: empty lines show up only as
//! adjacent break tokens. [`LineCursor`] restores them.

use crate::char::{char_len, slice_chars};
use crate::text::{Node, Text};

/// Iteration direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    #[inline]
    fn is_forward(self) -> bool {
        matches!(self, Direction::Forward)
    }
}

/// Shared interface of the text cursors.
///
/// `advance(skip)` moves past `skip` positions and then reads the next
/// token. After the call, [`value`](TextIterator::value) holds the token,
/// [`done`](TextIterator::done) reports exhaustion and
/// [`line_break`](TextIterator::line_break) whether the token is a break.
pub trait TextIterator<'a>: Iterator<Item = &'a str> {
    fn advance(&mut self, skip: usize) -> &mut Self
    where
        Self: Sized;

    fn value(&self) -> &'a str;

    fn done(&self) -> bool;

    fn line_break(&self) -> bool;
}

/// Cursor over a whole document, forwards or backwards.
#[derive(Debug, Clone)]
pub struct RawTextCursor<'a> {
    dir: Direction,
    nodes: Vec<&'a Text>,
    /// Per node: `index * 2 + 1` while the next item is content (forward),
    /// even values while the next item is a line break.
    offsets: Vec<usize>,
    value: &'a str,
    done: bool,
    line_break: bool,
}

impl<'a> RawTextCursor<'a> {
    pub(crate) fn new(text: &'a Text, dir: Direction) -> Self {
        Self {
            dir,
            nodes: vec![text],
            offsets: vec![start_offset(text, dir)],
            value: "",
            done: false,
            line_break: false,
        }
    }

    /// Direction this cursor moves in.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.dir
    }

    fn step(&mut self, last: usize, forward: bool) {
        if forward {
            self.offsets[last] += 1;
        } else {
            self.offsets[last] -= 1;
        }
    }

    fn next_inner(&mut self, mut skip: usize) -> &mut Self {
        let forward = self.dir.is_forward();
        self.done = false;
        self.line_break = false;
        loop {
            let last = self.nodes.len() - 1;
            let top = self.nodes[last];
            let offset_value = self.offsets[last];
            let offset = offset_value >> 1;
            let size = top.node_size();
            if offset == if forward { size } else { 0 } {
                if last == 0 {
                    self.done = true;
                    self.value = "";
                    return self;
                }
                if forward {
                    self.offsets[last - 1] += 1;
                }
                self.nodes.pop();
                self.offsets.pop();
            } else if (offset_value & 1) == usize::from(!forward) {
                self.step(last, forward);
                if skip == 0 {
                    self.line_break = true;
                    self.value = "\n";
                    return self;
                }
                skip -= 1;
            } else {
                let index = if forward { offset } else { offset - 1 };
                match top.node() {
                    Node::Leaf { text, .. } => {
                        let next = text[index].as_str();
                        self.step(last, forward);
                        let len = char_len(next);
                        if len > skip {
                            self.value = if skip == 0 {
                                next
                            } else if forward {
                                slice_chars(next, skip, len)
                            } else {
                                slice_chars(next, 0, len - skip)
                            };
                            return self;
                        }
                        skip -= len;
                    }
                    Node::Branch { children, .. } => {
                        let next = &children[index];
                        if skip > next.len() {
                            skip -= next.len();
                            self.step(last, forward);
                        } else {
                            if !forward {
                                self.offsets[last] -= 1;
                            }
                            self.nodes.push(next);
                            self.offsets.push(start_offset(next, self.dir));
                        }
                    }
                }
            }
        }
    }
}

fn start_offset(text: &Text, dir: Direction) -> usize {
    if dir.is_forward() {
        1
    } else {
        text.node_size() << 1
    }
}

impl<'a> TextIterator<'a> for RawTextCursor<'a> {
    fn advance(&mut self, skip: usize) -> &mut Self {
        self.next_inner(skip)
    }

    fn value(&self) -> &'a str {
        self.value
    }

    fn done(&self) -> bool {
        self.done
    }

    fn line_break(&self) -> bool {
        self.line_break
    }
}

impl<'a> Iterator for RawTextCursor<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        self.next_inner(0);
        (!self.done).then_some(self.value)
    }
}

/// Cursor over `[from, to)` of a document.
#[derive(Debug, Clone)]
pub struct PartialTextCursor<'a> {
    cursor: RawTextCursor<'a>,
    value: &'a str,
    done: bool,
    pos: usize,
    from: usize,
    to: usize,
}

impl<'a> PartialTextCursor<'a> {
    pub(crate) fn new(text: &'a Text, start: usize, end: usize) -> Self {
        let (start, end) = (start.min(text.len()), end.min(text.len()));
        let dir = if start > end {
            Direction::Backward
        } else {
            Direction::Forward
        };
        Self {
            cursor: RawTextCursor::new(text, dir),
            value: "",
            done: false,
            pos: if start > end { text.len() } else { 0 },
            from: start.min(end),
            to: start.max(end),
        }
    }

    fn next_inner(&mut self, mut skip: usize) -> &mut Self {
        let forward = self.cursor.dir.is_forward();
        if if forward {
            self.pos >= self.to
        } else {
            self.pos <= self.from
        } {
            self.value = "";
            self.done = true;
            return self;
        }
        skip += if forward {
            self.from.saturating_sub(self.pos)
        } else {
            self.pos.saturating_sub(self.to)
        };
        let mut limit = if forward {
            self.to - self.pos
        } else {
            self.pos - self.from
        };
        skip = skip.min(limit);
        limit -= skip;
        let value = self.cursor.next_inner(skip).value;
        let len = char_len(value);
        if forward {
            self.pos += len + skip;
        } else {
            self.pos = self.pos.saturating_sub(len + skip);
        }
        self.value = if len <= limit {
            value
        } else if forward {
            slice_chars(value, 0, limit)
        } else {
            slice_chars(value, len - limit, len)
        };
        self.done = self.value.is_empty();
        self
    }
}

impl<'a> TextIterator<'a> for PartialTextCursor<'a> {
    fn advance(&mut self, skip: usize) -> &mut Self {
        let room = if self.cursor.dir.is_forward() {
            self.to.saturating_sub(self.pos)
        } else {
            self.pos.saturating_sub(self.from)
        };
        self.next_inner(skip.min(room))
    }

    fn value(&self) -> &'a str {
        self.value
    }

    fn done(&self) -> bool {
        self.done
    }

    fn line_break(&self) -> bool {
        self.cursor.line_break && !self.value.is_empty()
    }
}

impl<'a> Iterator for PartialTextCursor<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        self.advance(0);
        (!self.done).then_some(self.value)
    }
}

/// Cursor yielding one value per line, including empty lines.
#[derive(Debug, Clone)]
pub struct LineCursor<'a> {
    inner: PartialTextCursor<'a>,
    value: &'a str,
    done: bool,
    after_break: bool,
}

impl<'a> LineCursor<'a> {
    pub(crate) fn new(inner: PartialTextCursor<'a>) -> Self {
        Self {
            inner,
            value: "",
            done: false,
            after_break: true,
        }
    }
}

impl<'a> TextIterator<'a> for LineCursor<'a> {
    fn advance(&mut self, skip: usize) -> &mut Self {
        let mut skip = skip;
        loop {
            self.inner.advance(skip);
            skip = 0;
            let (done, line_break, value) =
                (self.inner.done, self.inner.line_break(), self.inner.value);
            if done && self.after_break {
                self.value = "";
                self.after_break = false;
            } else if done {
                self.done = true;
                self.value = "";
            } else if line_break {
                if self.after_break {
                    self.value = "";
                } else {
                    self.after_break = true;
                    continue;
                }
            } else {
                self.value = value;
                self.after_break = false;
            }
            return self;
        }
    }

    fn value(&self) -> &'a str {
        self.value
    }

    fn done(&self) -> bool {
        self.done
    }

    fn line_break(&self) -> bool {
        false
    }
}

impl<'a> Iterator for LineCursor<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        self.advance(0);
        (!self.done).then_some(self.value)
    }
}
