#![forbid(unsafe_code)]

//! Low-level cursor over a run-length section list.
//!
//! A section list is a flat sequence of `(len, ins)` pairs. `ins == -1`
//! keeps `len` chars; `ins >= 0` replaces `len` old chars with `ins` new
//! ones. Composition, mapping and filtering all walk two of these lists in
//! lockstep, consuming partial sections as they go.

use crate::text::Text;

/// Insert length marking an unchanged span.
pub(crate) const KEEP: isize = -1;
/// Insert length reported by an exhausted [`SectionIter`].
const DONE: isize = -2;

/// Cursor over the sections of a change, tracking how much of the current
/// section has been consumed.
#[derive(Debug, Clone)]
pub(crate) struct SectionIter<'a> {
    sections: &'a [isize],
    inserted: &'a [Text],
    /// Index just past the current section's pair.
    pub(crate) i: usize,
    /// Remaining old-document length of the current section.
    pub(crate) len: usize,
    /// Remaining insert length, [`KEEP`] for unchanged spans.
    pub(crate) ins: isize,
    /// Amount already consumed from the current section.
    pub(crate) off: usize,
}

impl<'a> SectionIter<'a> {
    pub(crate) fn new(sections: &'a [isize], inserted: &'a [Text]) -> Self {
        let mut iter = Self {
            sections,
            inserted,
            i: 0,
            len: 0,
            ins: DONE,
            off: 0,
        };
        iter.next();
        iter
    }

    pub(crate) fn next(&mut self) {
        if self.i < self.sections.len() {
            self.len = self.sections[self.i] as usize;
            self.ins = self.sections[self.i + 1];
            self.i += 2;
        } else {
            self.len = 0;
            self.ins = DONE;
        }
        self.off = 0;
    }

    #[inline]
    pub(crate) fn done(&self) -> bool {
        self.ins == DONE
    }

    /// Remaining length on the new-document side.
    #[inline]
    pub(crate) fn len2(&self) -> usize {
        if self.ins < 0 {
            self.len
        } else {
            self.ins as usize
        }
    }

    fn index(&self) -> usize {
        self.i.saturating_sub(2) >> 1
    }

    /// Full inserted text of the current section.
    pub(crate) fn text(&self) -> Text {
        self.inserted
            .get(self.index())
            .cloned()
            .unwrap_or_else(Text::empty)
    }

    /// The next `len` chars of the current section's insertion, starting at
    /// the consumed offset.
    pub(crate) fn text_bit(&self, len: usize) -> Text {
        match self.inserted.get(self.index()) {
            Some(text) => text.slice(self.off, self.off + len),
            None => Text::empty(),
        }
    }

    /// Consume `len` chars of the old-document side.
    pub(crate) fn forward(&mut self, len: usize) {
        if len == self.len {
            self.next();
        } else {
            self.len -= len;
            self.off += len;
        }
    }

    /// Consume `len` chars of the new-document side.
    pub(crate) fn forward2(&mut self, len: usize) {
        if self.ins == KEEP {
            self.forward(len);
        } else if len as isize == self.ins {
            self.next();
        } else {
            self.ins -= len as isize;
            self.off += len;
        }
    }
}

/// Append a section, dropping empty ones and merging with the previous
/// section where the result describes the same change.
pub(crate) fn add_section(sections: &mut Vec<isize>, len: usize, ins: isize, force_join: bool) {
    if len == 0 && ins <= 0 {
        return;
    }
    let len = len as isize;
    if let Some(last) = sections.len().checked_sub(2) {
        if ins <= 0 && ins == sections[last + 1] {
            sections[last] += len;
            return;
        }
        if len == 0 && sections[last] == 0 {
            sections[last + 1] += ins;
            return;
        }
        if force_join {
            sections[last] += len;
            sections[last + 1] += ins;
            return;
        }
    }
    sections.push(len);
    sections.push(ins);
}

/// Record inserted text for the last section in `sections`, padding the
/// insert list with empty texts for any sections in between.
pub(crate) fn add_insert(values: &mut Vec<Text>, sections: &[isize], value: Text) {
    if value.is_empty() {
        return;
    }
    let index = sections.len().saturating_sub(2) >> 1;
    if index < values.len() {
        if let Some(last) = values.last_mut() {
            *last = last.append(&value);
        }
    } else {
        values.resize_with(index, Text::empty);
        values.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_section_merges_keeps() {
        let mut sections = Vec::new();
        add_section(&mut sections, 3, KEEP, false);
        add_section(&mut sections, 2, KEEP, false);
        assert_eq!(sections, vec![5, -1]);
    }

    #[test]
    fn add_section_drops_empty() {
        let mut sections = Vec::new();
        add_section(&mut sections, 0, 0, false);
        add_section(&mut sections, 0, KEEP, false);
        assert!(sections.is_empty());
    }

    #[test]
    fn add_section_merges_deletions_and_inserts() {
        let mut sections = Vec::new();
        add_section(&mut sections, 2, 0, false);
        add_section(&mut sections, 1, 0, false);
        assert_eq!(sections, vec![3, 0]);

        let mut sections = Vec::new();
        add_section(&mut sections, 0, 2, false);
        add_section(&mut sections, 0, 3, false);
        assert_eq!(sections, vec![0, 5]);
    }

    #[test]
    fn add_section_force_join() {
        let mut sections = vec![1, -1, 2, 1];
        add_section(&mut sections, 1, 2, true);
        assert_eq!(sections, vec![1, -1, 3, 3]);
        add_section(&mut sections, 1, 2, false);
        assert_eq!(sections, vec![1, -1, 3, 3, 1, 2]);
    }

    #[test]
    fn add_insert_pads_and_appends() {
        let mut values = Vec::new();
        let sections = vec![2, -1, 0, 1];
        add_insert(&mut values, &sections, Text::from("a"));
        assert_eq!(values.len(), 2);
        assert!(values[0].is_empty());
        add_insert(&mut values, &sections, Text::from("b"));
        assert_eq!(values[1].to_string(), "ab");
    }

    #[test]
    fn iter_walks_and_splits_sections() {
        let sections = vec![3, -1, 2, 4];
        let inserted = vec![Text::empty(), Text::from("wxyz")];
        let mut iter = SectionIter::new(&sections, &inserted);
        assert_eq!((iter.len, iter.ins), (3, KEEP));
        iter.forward(1);
        assert_eq!((iter.len, iter.off), (2, 1));
        iter.forward(2);
        assert_eq!((iter.len, iter.ins, iter.len2()), (2, 4, 4));
        assert_eq!(iter.text().to_string(), "wxyz");
        iter.forward2(1);
        assert_eq!(iter.text_bit(2).to_string(), "xy");
        iter.forward2(3);
        assert!(iter.done());
        assert_eq!(iter.len, 0);
    }
}
