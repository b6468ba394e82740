#![forbid(unsafe_code)]

//! Change descriptions and change sets.
//!
//! A [`ChangeDesc`] records only the shape of an edit: which spans of the
//! old document are kept and which are replaced, and by how many chars. A
//! [`ChangeSet`] adds the inserted content, which makes it applicable to a
//! [`Text`].
//!
//! # Invariants
//!
//! 1. **Lengths**: `len()` equals the length of the document the change
//!    applies to; `new_len()` equals the length of the result.
//! 2. **Canonical form**: empty sections are never stored and adjacent
//!    sections with the same effect are merged, so equal net effects give
//!    equal section lists.
//! 3. **Convergence**: for changes `x` and `y` from the same document,
//!    `x.compose(&y.map(&x, false))` and `y.compose(&x.map(&y, true))`
//!    produce the same document.
//!
//! # Example
//! ```
//! use tessera_text::change::{Assoc, ChangeSet, ChangeSpec};
//! use tessera_text::text::Text;
//!
//! let doc = Text::of(["abc", "def"]).unwrap();
//! let changes = ChangeSet::of(ChangeSpec::insert(3, "X"), doc.len(), None).unwrap();
//! assert_eq!(changes.new_len(), 8);
//! assert_eq!(changes.apply(&doc).unwrap().to_json(), vec!["abcX", "def"]);
//! assert_eq!(changes.map_pos(3, Assoc::Before).unwrap(), 3);
//! assert_eq!(changes.map_pos(3, Assoc::After).unwrap(), 4);
//! ```

use std::fmt;
use std::ops::Deref;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{Result, TextError};
use crate::section::{KEEP, SectionIter, add_insert, add_section};
use crate::text::{Text, has_line_break};

/// Which side of an insertion at the mapped position to end up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Assoc {
    /// Stay before text inserted at the position.
    #[default]
    Before,
    /// Move past text inserted at the position.
    After,
}

/// How [`ChangeDesc::map_pos_tracked`] treats positions in replaced spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapMode {
    /// Always map to a position.
    #[default]
    Simple,
    /// Report deletion when a replaced span strictly contains the position.
    TrackDel,
    /// Report deletion when a replaced span starts before the position.
    TrackBefore,
    /// Report deletion when a replaced span ends after the position.
    TrackAfter,
}

/// Result of [`ChangeDesc::touches_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touch {
    /// No change overlaps the range.
    No,
    /// Some change overlaps or touches the range.
    Yes,
    /// A single change covers the whole range, extending past both ends.
    Cover,
}

/// A changed span in old (`a`) and new (`b`) document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedRange {
    pub from_a: usize,
    pub to_a: usize,
    pub from_b: usize,
    pub to_b: usize,
}

/// The shape of a document change, without inserted content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeDesc {
    sections: Vec<isize>,
}

impl ChangeDesc {
    /// Wrap a raw section list. The list is taken as-is.
    #[must_use]
    pub fn create(sections: Vec<isize>) -> Self {
        Self { sections }
    }

    /// The flat `(len, ins)` section list.
    #[must_use]
    pub fn sections(&self) -> &[isize] {
        &self.sections
    }

    /// Length of the document this change applies to.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.chunks_exact(2).map(|s| s[0] as usize).sum()
    }

    /// Length of the document after the change.
    #[must_use]
    pub fn new_len(&self) -> usize {
        self.sections
            .chunks_exact(2)
            .map(|s| (if s[1] < 0 { s[0] } else { s[1] }) as usize)
            .sum()
    }

    /// `true` when the change leaves the document untouched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() || (self.sections.len() == 2 && self.sections[1] < 0)
    }

    /// Call `f(pos_a, pos_b, len)` for each unchanged span.
    pub fn iter_gaps(&self, mut f: impl FnMut(usize, usize, usize)) {
        let (mut pos_a, mut pos_b) = (0, 0);
        for pair in self.sections.chunks_exact(2) {
            let (len, ins) = (pair[0] as usize, pair[1]);
            if ins < 0 {
                f(pos_a, pos_b, len);
                pos_b += len;
            } else {
                pos_b += ins as usize;
            }
            pos_a += len;
        }
    }

    /// Call `f` for each changed span. Adjacent changes are reported as one
    /// range unless `individual` is set.
    pub fn iter_changed_ranges(&self, mut f: impl FnMut(ChangedRange), individual: bool) {
        iter_changes(&self.sections, &[], individual, |range, _| f(range));
    }

    /// The inverse shape, swapping kept and inserted lengths.
    #[must_use]
    pub fn inverted_desc(&self) -> ChangeDesc {
        let mut sections = Vec::with_capacity(self.sections.len());
        for pair in self.sections.chunks_exact(2) {
            let (len, ins) = (pair[0], pair[1]);
            if ins < 0 {
                sections.extend([len, ins]);
            } else {
                sections.extend([ins, len]);
            }
        }
        ChangeDesc::create(sections)
    }

    /// Shape of applying `self` and then `other`.
    ///
    /// # Panics
    ///
    /// Panics if `other.len() != self.new_len()`.
    #[must_use]
    pub fn compose_desc(&self, other: &ChangeDesc) -> ChangeDesc {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        let (sections, _) = compose_sets(
            SectionIter::new(&self.sections, &[]),
            SectionIter::new(&other.sections, &[]),
            false,
        );
        ChangeDesc::create(sections)
    }

    /// Rebase this change over `other`, which starts from the same document.
    /// With `before` set, this change's insertions go first where both
    /// insert at the same position.
    ///
    /// # Panics
    ///
    /// Panics if `other.len() != self.len()`.
    #[must_use]
    pub fn map_desc(&self, other: &ChangeDesc, before: bool) -> ChangeDesc {
        if other.is_empty() {
            return self.clone();
        }
        let (sections, _) = map_set(
            SectionIter::new(&self.sections, &[]),
            SectionIter::new(&other.sections, &[]),
            before,
            false,
        );
        ChangeDesc::create(sections)
    }

    /// Map a position in the old document to the new one.
    pub fn map_pos(&self, pos: usize, assoc: Assoc) -> Result<usize> {
        self.map_pos_inner(pos, assoc, MapMode::Simple)
            .map(|mapped| mapped.unwrap_or(pos))
    }

    /// Map a position, returning `Ok(None)` when `mode` considers the
    /// position deleted.
    pub fn map_pos_tracked(&self, pos: usize, assoc: Assoc, mode: MapMode) -> Result<Option<usize>> {
        self.map_pos_inner(pos, assoc, mode)
    }

    fn map_pos_inner(&self, pos: usize, assoc: Assoc, mode: MapMode) -> Result<Option<usize>> {
        let (mut pos_a, mut pos_b) = (0, 0);
        for pair in self.sections.chunks_exact(2) {
            let (len, ins) = (pair[0] as usize, pair[1]);
            let end_a = pos_a + len;
            if ins < 0 {
                if end_a > pos {
                    return Ok(Some(pos_b + (pos - pos_a)));
                }
                pos_b += len;
            } else {
                let ins = ins as usize;
                if mode != MapMode::Simple
                    && end_a >= pos
                    && match mode {
                        MapMode::TrackDel => pos_a < pos && end_a > pos,
                        MapMode::TrackBefore => pos_a < pos,
                        MapMode::TrackAfter => end_a > pos,
                        MapMode::Simple => false,
                    }
                {
                    return Ok(None);
                }
                if end_a > pos || (end_a == pos && assoc == Assoc::Before && len == 0) {
                    return Ok(Some(if pos == pos_a || assoc == Assoc::Before {
                        pos_b
                    } else {
                        pos_b + ins
                    }));
                }
                pos_b += ins;
            }
            pos_a = end_a;
        }
        if pos > pos_a {
            return Err(TextError::PositionOutOfRange { pos, length: pos_a });
        }
        Ok(Some(pos_b))
    }

    /// Whether any change touches `[from, to]`.
    #[must_use]
    pub fn touches_range(&self, from: usize, to: usize) -> Touch {
        let mut pos = 0;
        for pair in self.sections.chunks_exact(2) {
            if pos > to {
                break;
            }
            let (len, ins) = (pair[0] as usize, pair[1]);
            let end = pos + len;
            if ins >= 0 && pos <= to && end >= from {
                return if pos < from && end > to {
                    Touch::Cover
                } else {
                    Touch::Yes
                };
            }
            pos = end;
        }
        Touch::No
    }

    /// The flat section list, for serialisation.
    #[must_use]
    pub fn to_json(&self) -> Vec<isize> {
        self.sections.clone()
    }

    /// Parse the representation produced by [`ChangeDesc::to_json`].
    pub fn from_json(json: &Value) -> Result<ChangeDesc> {
        let invalid = || TextError::InvalidJson("ChangeDesc".into());
        let parts = json.as_array().ok_or_else(invalid)?;
        if parts.len() % 2 != 0 {
            return Err(invalid());
        }
        let sections = parts
            .iter()
            .map(|part| part.as_i64().map(|n| n as isize).ok_or_else(invalid))
            .collect::<Result<Vec<_>>>()?;
        if !validate_sections(&sections) {
            return Err(invalid());
        }
        Ok(ChangeDesc::create(sections))
    }
}

/// Every pair must keep or replace something; `(0, 0)` is never stored.
fn validate_sections(sections: &[isize]) -> bool {
    sections
        .chunks_exact(2)
        .all(|pair| pair[0] >= 0 && pair[1] >= KEEP && (pair[0], pair[1]) != (0, 0))
}

impl fmt::Display for ChangeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pair) in self.sections.chunks_exact(2).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if pair[1] < 0 {
                write!(f, "{}", pair[0])?;
            } else {
                write!(f, "{}:{}", pair[0], pair[1])?;
            }
        }
        Ok(())
    }
}

impl Serialize for ChangeDesc {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.sections.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChangeDesc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let sections = Vec::<isize>::deserialize(deserializer)?;
        if sections.len() % 2 != 0 || !validate_sections(&sections) {
            return Err(D::Error::custom(TextError::InvalidJson("ChangeDesc".into())));
        }
        Ok(ChangeDesc::create(sections))
    }
}

/// Text to insert for a [`ChangeSpec::Change`].
#[derive(Debug, Clone, Default)]
pub enum Insertion {
    #[default]
    None,
    /// A string, split into lines when the change set is built.
    Str(String),
    Text(Text),
}

impl Insertion {
    fn into_text(self, line_sep: Option<&str>) -> Text {
        match self {
            Insertion::None => Text::empty(),
            Insertion::Str(s) => Text::from_text(&s, line_sep),
            Insertion::Text(text) => text,
        }
    }
}

impl From<&str> for Insertion {
    fn from(s: &str) -> Self {
        Insertion::Str(s.to_string())
    }
}

impl From<String> for Insertion {
    fn from(s: String) -> Self {
        Insertion::Str(s)
    }
}

impl From<Text> for Insertion {
    fn from(text: Text) -> Self {
        Insertion::Text(text)
    }
}

/// Input to [`ChangeSet::of`]: a single edit, an existing change set, or a
/// list of either, all in the coordinates of the starting document.
#[derive(Debug, Clone)]
pub enum ChangeSpec {
    Change {
        from: usize,
        to: usize,
        insert: Insertion,
    },
    Set(ChangeSet),
    Many(Vec<ChangeSpec>),
}

impl ChangeSpec {
    /// Insert at `pos`.
    pub fn insert(pos: usize, insert: impl Into<Insertion>) -> Self {
        ChangeSpec::Change {
            from: pos,
            to: pos,
            insert: insert.into(),
        }
    }

    /// Delete `[from, to)`.
    #[must_use]
    pub fn delete(from: usize, to: usize) -> Self {
        ChangeSpec::Change {
            from,
            to,
            insert: Insertion::None,
        }
    }

    /// Replace `[from, to)`.
    pub fn replace(from: usize, to: usize, insert: impl Into<Insertion>) -> Self {
        ChangeSpec::Change {
            from,
            to,
            insert: insert.into(),
        }
    }
}

impl From<ChangeSet> for ChangeSpec {
    fn from(set: ChangeSet) -> Self {
        ChangeSpec::Set(set)
    }
}

impl From<Vec<ChangeSpec>> for ChangeSpec {
    fn from(specs: Vec<ChangeSpec>) -> Self {
        ChangeSpec::Many(specs)
    }
}

/// Output of [`ChangeSet::filter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResult {
    /// The changes outside the filtered ranges.
    pub changes: ChangeSet,
    /// The shape of the changes that were dropped.
    pub filtered: ChangeDesc,
}

/// A change description together with the text it inserts.
///
/// Dereferences to its [`ChangeDesc`] for the shape-only operations.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    desc: ChangeDesc,
    /// Inserted text per section index; entries for kept spans are empty.
    inserted: Vec<Text>,
}

impl PartialEq for ChangeSet {
    /// Equal shapes with equal text in every inserting section. Padding in
    /// the insert list is ignored.
    fn eq(&self, other: &ChangeSet) -> bool {
        self.desc == other.desc
            && self
                .desc
                .sections
                .chunks_exact(2)
                .enumerate()
                .filter(|(_, pair)| pair[1] > 0)
                .all(|(index, _)| self.inserted.get(index) == other.inserted.get(index))
    }
}

impl Eq for ChangeSet {}

impl Deref for ChangeSet {
    type Target = ChangeDesc;

    fn deref(&self) -> &ChangeDesc {
        &self.desc
    }
}

impl AsRef<ChangeDesc> for ChangeSet {
    fn as_ref(&self) -> &ChangeDesc {
        &self.desc
    }
}

impl ChangeSet {
    fn create(sections: Vec<isize>, inserted: Vec<Text>) -> Self {
        Self {
            desc: ChangeDesc::create(sections),
            inserted,
        }
    }

    /// A change set that leaves a document of `length` untouched.
    #[must_use]
    pub fn empty(length: usize) -> Self {
        let sections = if length > 0 {
            vec![length as isize, KEEP]
        } else {
            Vec::new()
        };
        Self::create(sections, Vec::new())
    }

    /// Build a change set for a document of `length` from `changes`.
    ///
    /// Individual edits are given in the coordinates of the starting
    /// document and may come in any order; overlapping or out-of-order
    /// edits are combined as if applied one after another.
    pub fn of(changes: impl Into<ChangeSpec>, length: usize, line_sep: Option<&str>) -> Result<Self> {
        let mut builder = SetBuilder {
            length,
            line_sep,
            sections: Vec::new(),
            inserted: Vec::new(),
            pos: 0,
            total: None,
        };
        builder.process(changes.into())?;
        let force = builder.total.is_none();
        builder.flush(force);
        Ok(builder.total.unwrap_or_else(|| ChangeSet::empty(length)))
    }

    /// The shape of this change set.
    #[must_use]
    pub fn desc(&self) -> &ChangeDesc {
        &self.desc
    }

    /// Inserted text, indexed by section.
    #[must_use]
    pub fn inserted(&self) -> &[Text] {
        &self.inserted
    }

    /// Apply to a document of length `self.len()`.
    pub fn apply(&self, doc: &Text) -> Result<Text> {
        if self.len() != doc.len() {
            tracing::debug!(
                expected = self.len(),
                actual = doc.len(),
                "change set applied to document of wrong length"
            );
            return Err(TextError::LengthMismatch {
                expected: self.len(),
                actual: doc.len(),
            });
        }
        let mut doc = doc.clone();
        iter_changes(&self.desc.sections, &self.inserted, false, |range, text| {
            doc = doc.replace(range.from_b, range.from_b + (range.to_a - range.from_a), &text);
        });
        Ok(doc)
    }

    /// The change set that undoes this one, given the document it was
    /// applied to.
    pub fn invert(&self, doc: &Text) -> Result<ChangeSet> {
        if self.len() != doc.len() {
            tracing::debug!(
                expected = self.len(),
                actual = doc.len(),
                "change set inverted against document of wrong length"
            );
            return Err(TextError::LengthMismatch {
                expected: self.len(),
                actual: doc.len(),
            });
        }
        let mut sections = self.desc.sections.clone();
        let mut inserted = Vec::new();
        let mut pos = 0;
        for (index, pair) in sections.chunks_exact_mut(2).enumerate() {
            let (len, ins) = (pair[0], pair[1]);
            if ins >= 0 {
                pair[0] = ins;
                pair[1] = len;
                if len > 0 {
                    inserted.resize_with(index, Text::empty);
                    inserted.push(doc.slice(pos, pos + len as usize));
                }
            }
            pos += len as usize;
        }
        Ok(ChangeSet::create(sections, inserted))
    }

    /// Combine with `other`, which applies to the document this set
    /// produces, into one set that goes straight from this set's start
    /// document to `other`'s result.
    ///
    /// # Panics
    ///
    /// Panics if `other.len() != self.new_len()`.
    #[must_use]
    pub fn compose(&self, other: &ChangeSet) -> ChangeSet {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        let (sections, inserted) = compose_sets(
            SectionIter::new(&self.desc.sections, &self.inserted),
            SectionIter::new(&other.desc.sections, &other.inserted),
            true,
        );
        ChangeSet::create(sections, inserted)
    }

    /// Rebase this set over `other`, a change from the same start document,
    /// so it can be applied after `other`. Where both insert at the same
    /// position, `other`'s insertion comes first unless `before` is set.
    ///
    /// # Panics
    ///
    /// Panics if `other.len() != self.len()`.
    #[must_use]
    pub fn map(&self, other: &ChangeDesc, before: bool) -> ChangeSet {
        if other.is_empty() {
            return self.clone();
        }
        let (sections, inserted) = map_set(
            SectionIter::new(&self.desc.sections, &self.inserted),
            SectionIter::new(&other.sections, &[]),
            before,
            true,
        );
        ChangeSet::create(sections, inserted)
    }

    /// Call `f` for each changed span with the text inserted there.
    pub fn iter_changes(&self, mut f: impl FnMut(ChangedRange, &Text), individual: bool) {
        iter_changes(&self.desc.sections, &self.inserted, individual, |range, text| {
            f(range, &text);
        });
    }

    /// Split into the changes outside `ranges` and the shape of the
    /// changes inside them. `ranges` is a sorted flat list of
    /// `from, to` pairs in old-document coordinates.
    #[must_use]
    pub fn filter(&self, ranges: &[usize]) -> FilterResult {
        let mut result_sections = Vec::new();
        let mut result_inserted = Vec::new();
        let mut filtered_sections = Vec::new();
        let mut iter = SectionIter::new(&self.desc.sections, &self.inserted);
        let mut pos = 0;
        let bounds = ranges
            .chunks_exact(2)
            .map(|r| (r[0], r[1]))
            .chain(std::iter::once((usize::MAX, usize::MAX)));
        'done: for (next, end) in bounds {
            while pos < next || (pos == next && iter.len == 0) {
                if iter.done() {
                    break 'done;
                }
                let len = iter.len.min(next - pos);
                add_section(&mut filtered_sections, len, KEEP, false);
                let ins = section_ins(&iter);
                add_section(&mut result_sections, len, ins, false);
                if ins > 0 {
                    add_insert(&mut result_inserted, &result_sections, iter.text());
                }
                iter.forward(len);
                pos += len;
            }
            while pos < end {
                if iter.done() {
                    break 'done;
                }
                let len = iter.len.min(end - pos);
                add_section(&mut result_sections, len, KEEP, false);
                add_section(&mut filtered_sections, len, section_ins(&iter), false);
                iter.forward(len);
                pos += len;
            }
        }
        FilterResult {
            changes: ChangeSet::create(result_sections, result_inserted),
            filtered: ChangeDesc::create(filtered_sections),
        }
    }

    /// Compact JSON form: a kept span is a bare integer, a deletion is
    /// `[len]`, and a replacement is `[len, line, ...]`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let parts = self
            .desc
            .sections
            .chunks_exact(2)
            .enumerate()
            .map(|(index, pair)| {
                let (len, ins) = (pair[0], pair[1]);
                if ins < 0 {
                    Value::from(len)
                } else if ins == 0 {
                    Value::Array(vec![Value::from(len)])
                } else {
                    let mut part = vec![Value::from(len)];
                    let lines = self
                        .inserted
                        .get(index)
                        .map(Text::to_json)
                        .unwrap_or_default();
                    part.extend(lines.into_iter().map(Value::from));
                    Value::Array(part)
                }
            })
            .collect();
        Value::Array(parts)
    }

    /// Parse the representation produced by [`ChangeSet::to_json`].
    pub fn from_json(json: &Value) -> Result<ChangeSet> {
        let invalid = || TextError::InvalidJson("ChangeSet".into());
        let parts = json.as_array().ok_or_else(invalid)?;
        let mut sections = Vec::with_capacity(parts.len() * 2);
        let mut inserted = Vec::new();
        let length = |value: &Value| {
            value
                .as_u64()
                .and_then(|n| isize::try_from(n).ok())
                .ok_or_else(invalid)
        };
        for (index, part) in parts.iter().enumerate() {
            if part.is_number() {
                sections.extend([length(part)?, KEEP]);
                continue;
            }
            let items = part.as_array().ok_or_else(invalid)?;
            let (first, lines) = items.split_first().ok_or_else(invalid)?;
            let len = length(first)?;
            let text = if lines.is_empty() {
                Text::empty()
            } else {
                let lines = lines
                    .iter()
                    .map(|line| {
                        line.as_str()
                            .filter(|line| !has_line_break(line))
                            .map(str::to_string)
                            .ok_or_else(invalid)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Text::of(lines)?
            };
            if len == 0 && text.is_empty() {
                return Err(invalid());
            }
            sections.extend([len, text.len() as isize]);
            if !text.is_empty() {
                inserted.resize_with(index, Text::empty);
                inserted.push(text);
            }
        }
        Ok(ChangeSet::create(sections, inserted))
    }
}

fn section_ins(iter: &SectionIter<'_>) -> isize {
    if iter.ins == KEEP {
        KEEP
    } else if iter.off == 0 {
        iter.ins
    } else {
        0
    }
}

impl Serialize for ChangeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChangeSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = Value::deserialize(deserializer)?;
        ChangeSet::from_json(&json).map_err(D::Error::custom)
    }
}

/// Accumulates edits for [`ChangeSet::of`]. Edits are gathered into one
/// section list while they arrive in document order; an edit that starts
/// before the previous one ended flushes the list into `total`.
struct SetBuilder<'s> {
    length: usize,
    line_sep: Option<&'s str>,
    sections: Vec<isize>,
    inserted: Vec<Text>,
    pos: usize,
    total: Option<ChangeSet>,
}

impl SetBuilder<'_> {
    fn flush(&mut self, force: bool) {
        if !force && self.sections.is_empty() {
            return;
        }
        if self.pos < self.length {
            add_section(&mut self.sections, self.length - self.pos, KEEP, false);
        }
        let set = ChangeSet::create(
            std::mem::take(&mut self.sections),
            std::mem::take(&mut self.inserted),
        );
        self.total = Some(match self.total.take() {
            Some(total) => total.compose(&set.map(&total, false)),
            None => set,
        });
        self.pos = 0;
    }

    fn process(&mut self, spec: ChangeSpec) -> Result<()> {
        match spec {
            ChangeSpec::Many(specs) => {
                for spec in specs {
                    self.process(spec)?;
                }
            }
            ChangeSpec::Set(set) => {
                if set.len() != self.length {
                    return Err(TextError::LengthMismatch {
                        expected: self.length,
                        actual: set.len(),
                    });
                }
                self.flush(false);
                self.total = Some(match self.total.take() {
                    Some(total) => total.compose(&set.map(&total, false)),
                    None => set,
                });
            }
            ChangeSpec::Change { from, to, insert } => {
                if from > to || to > self.length {
                    return Err(TextError::InvalidChangeRange {
                        from,
                        to,
                        length: self.length,
                    });
                }
                let text = insert.into_text(self.line_sep);
                let ins_len = text.len();
                if from == to && ins_len == 0 {
                    return Ok(());
                }
                if from < self.pos {
                    tracing::trace!(from, pos = self.pos, "out-of-order change, flushing");
                    self.flush(false);
                }
                if from > self.pos {
                    add_section(&mut self.sections, from - self.pos, KEEP, false);
                }
                add_section(&mut self.sections, to - from, ins_len as isize, false);
                add_insert(&mut self.inserted, &self.sections, text);
                self.pos = to;
            }
        }
        Ok(())
    }
}

/// Walk the changed sections of a list, calling `f` with the old and new
/// ranges and the inserted text.
fn iter_changes(
    sections: &[isize],
    inserted: &[Text],
    individual: bool,
    mut f: impl FnMut(ChangedRange, Text),
) {
    let (mut pos_a, mut pos_b) = (0, 0);
    let mut i = 0;
    while i < sections.len() {
        let (mut len, mut ins) = (sections[i] as usize, sections[i + 1]);
        i += 2;
        if ins < 0 {
            pos_a += len;
            pos_b += len;
            continue;
        }
        let (mut end_a, mut end_b) = (pos_a, pos_b);
        let mut text = Text::empty();
        loop {
            end_a += len;
            end_b += ins as usize;
            if ins > 0
                && let Some(piece) = inserted.get((i - 2) >> 1)
            {
                text = text.append(piece);
            }
            if individual || i == sections.len() || sections[i + 1] < 0 {
                break;
            }
            len = sections[i] as usize;
            ins = sections[i + 1];
            i += 2;
        }
        f(
            ChangedRange {
                from_a: pos_a,
                to_a: end_a,
                from_b: pos_b,
                to_b: end_b,
            },
            text,
        );
        pos_a = end_a;
        pos_b = end_b;
    }
}

/// Compose `a` (A→B) with `b` (B→C) into a section list for A→C.
fn compose_sets(
    mut a: SectionIter<'_>,
    mut b: SectionIter<'_>,
    mk_set: bool,
) -> (Vec<isize>, Vec<Text>) {
    let mut sections = Vec::new();
    let mut insert = Vec::new();
    let mut open = false;
    loop {
        if a.done() && b.done() {
            return (sections, insert);
        } else if a.ins == 0 {
            // Deletion in A
            add_section(&mut sections, a.len, 0, open);
            a.next();
        } else if b.len == 0 && !b.done() {
            // Insertion in B
            add_section(&mut sections, 0, b.ins, open);
            if mk_set {
                add_insert(&mut insert, &sections, b.text());
            }
            b.next();
        } else if a.done() || b.done() {
            panic!("mismatched change set lengths");
        } else {
            let len = a.len2().min(b.len);
            let section_len = sections.len();
            if a.ins == KEEP {
                let ins_b = if b.ins == KEEP {
                    KEEP
                } else if b.off > 0 {
                    0
                } else {
                    b.ins
                };
                add_section(&mut sections, len, ins_b, open);
                if mk_set && ins_b > 0 {
                    add_insert(&mut insert, &sections, b.text());
                }
            } else if b.ins == KEEP {
                let len_a = if a.off > 0 { 0 } else { a.len };
                add_section(&mut sections, len_a, len as isize, open);
                if mk_set {
                    add_insert(&mut insert, &sections, a.text_bit(len));
                }
            } else {
                let len_a = if a.off > 0 { 0 } else { a.len };
                let ins_b = if b.off > 0 { 0 } else { b.ins };
                add_section(&mut sections, len_a, ins_b, open);
                if mk_set && b.off == 0 {
                    add_insert(&mut insert, &sections, b.text());
                }
            }
            open = (a.ins > len as isize || (b.ins >= 0 && b.len > len))
                && (open || sections.len() > section_len);
            a.forward2(len);
            b.forward(len);
        }
    }
}

/// Map `a` over `b`, both starting from the same document.
fn map_set(
    mut a: SectionIter<'_>,
    mut b: SectionIter<'_>,
    before: bool,
    mk_set: bool,
) -> (Vec<isize>, Vec<Text>) {
    let mut sections = Vec::new();
    let mut insert = Vec::new();
    // Index of the last section of `a` whose insertion has been emitted.
    let mut inserted: isize = -1;
    loop {
        let a_index = a.i as isize;
        if (a.done() && b.len > 0) || (b.done() && a.len > 0) {
            panic!("mismatched change set lengths");
        } else if a.ins == KEEP && b.ins == KEEP {
            // Spans untouched by both sides.
            let len = a.len.min(b.len);
            add_section(&mut sections, len, KEEP, false);
            a.forward(len);
            b.forward(len);
        } else if b.ins >= 0
            && (a.ins < 0
                || inserted == a_index
                || (a.off == 0 && (b.len < a.len || (b.len == a.len && !before))))
        {
            // A change in B comes first: skip over it, emitting any
            // insertion from A that it fully covers.
            let mut len = b.len;
            add_section(&mut sections, b.ins as usize, KEEP, false);
            while len > 0 {
                if a.done() {
                    panic!("mismatched change set lengths");
                }
                let piece = a.len.min(len);
                if a.ins >= 0 && inserted < a.i as isize && a.len <= piece {
                    add_section(&mut sections, 0, a.ins, false);
                    if mk_set {
                        add_insert(&mut insert, &sections, a.text());
                    }
                    inserted = a.i as isize;
                }
                a.forward(piece);
                len -= piece;
            }
            b.next();
        } else if a.ins >= 0 {
            // Emit the part of A's change up to the next non-deletion
            // change in B.
            let mut len = 0;
            let mut left = a.len;
            while left > 0 {
                if b.ins == KEEP {
                    let piece = left.min(b.len);
                    len += piece;
                    left -= piece;
                    b.forward(piece);
                } else if b.ins == 0 && b.len < left {
                    left -= b.len;
                    b.next();
                } else {
                    break;
                }
            }
            let fresh = inserted < a_index;
            add_section(&mut sections, len, if fresh { a.ins } else { 0 }, false);
            if mk_set && fresh {
                add_insert(&mut insert, &sections, a.text());
            }
            inserted = a_index;
            a.forward(a.len - left);
        } else if a.done() && b.done() {
            return (sections, insert);
        } else {
            panic!("mismatched change set lengths");
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn doc_strategy() -> impl Strategy<Value = String> {
        "[a-c\n]{0,30}"
    }

    /// Random edits for a document of `len`, as (from, to, insert) triples.
    fn edits(len: usize) -> impl Strategy<Value = Vec<(usize, usize, String)>> {
        prop::collection::vec((0..=len, 0..=len, "[x-z\n]{0,3}"), 0..4).prop_map(|raw| {
            raw.into_iter()
                .map(|(a, b, s)| (a.min(b), a.max(b), s))
                .collect()
        })
    }

    fn build(len: usize, raw: &[(usize, usize, String)]) -> ChangeSet {
        let specs: Vec<ChangeSpec> = raw
            .iter()
            .map(|(from, to, s)| ChangeSpec::replace(*from, *to, s.as_str()))
            .collect();
        ChangeSet::of(specs, len, None).unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn lengths_match_documents(
            (s, raw) in doc_strategy().prop_flat_map(|s| {
                let len = s.chars().count();
                (Just(s), edits(len))
            })
        ) {
            let d = Text::from(s.as_str());
            let cs = build(d.len(), &raw);
            prop_assert_eq!(cs.len(), d.len());
            prop_assert_eq!(cs.apply(&d).unwrap().len(), cs.new_len());
        }

        #[test]
        fn invert_roundtrip(
            (s, raw) in doc_strategy().prop_flat_map(|s| {
                let len = s.chars().count();
                (Just(s), edits(len))
            })
        ) {
            let d = Text::from(s.as_str());
            let cs = build(d.len(), &raw);
            let changed = cs.apply(&d).unwrap();
            prop_assert_eq!(cs.invert(&d).unwrap().apply(&changed).unwrap(), d);
        }

        #[test]
        fn map_pos_is_monotonic(
            (s, raw, p1, p2) in doc_strategy().prop_flat_map(|s| {
                let len = s.chars().count();
                (Just(s), edits(len), 0..=len, 0..=len)
            })
        ) {
            let d = Text::from(s.as_str());
            let cs = build(d.len(), &raw);
            let (p1, p2) = (p1.min(p2), p1.max(p2));
            for assoc in [Assoc::Before, Assoc::After] {
                let m1 = cs.map_pos(p1, assoc).unwrap();
                let m2 = cs.map_pos(p2, assoc).unwrap();
                prop_assert!(m1 <= m2);
                prop_assert!(m2 <= cs.new_len());
            }
        }

        #[test]
        fn json_roundtrip(
            (s, raw) in doc_strategy().prop_flat_map(|s| {
                let len = s.chars().count();
                (Just(s), edits(len))
            })
        ) {
            let d = Text::from(s.as_str());
            let cs = build(d.len(), &raw);
            let back = ChangeSet::from_json(&cs.to_json()).unwrap();
            prop_assert_eq!(back.apply(&d).unwrap(), cs.apply(&d).unwrap());
            prop_assert_eq!(back.desc(), cs.desc());
        }
    }
}
