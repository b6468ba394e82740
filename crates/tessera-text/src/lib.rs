#![forbid(unsafe_code)]

//! Document text and change tracking for Tessera.
//!
//! This crate provides:
//! - [`Text`], an immutable line-indexed rope with structural sharing
//! - Cursors over raw tokens, position ranges, and whole lines
//! - [`ChangeDesc`] and [`ChangeSet`] for describing, composing, inverting,
//!   and rebasing edits
//! - Char and grapheme-cluster helpers for position math

/// Char-index, cluster-break, and column helpers.
pub mod char;
/// Change descriptions and change sets.
pub mod change;
/// Cursors over document content.
pub mod cursor;
pub mod error;
mod section;
/// The line-indexed rope.
pub mod text;

pub use change::{
    Assoc, ChangeDesc, ChangeSet, ChangeSpec, ChangedRange, FilterResult, Insertion, MapMode,
    Touch,
};
pub use cursor::{Direction, LineCursor, PartialTextCursor, RawTextCursor, TextIterator};
pub use error::{Result, TextError};
pub use text::{Line, Text};
