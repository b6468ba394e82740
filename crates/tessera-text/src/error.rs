#![forbid(unsafe_code)]

//! Error taxonomy for document and change-set operations.
//!
//! Every failure here is a contract violation by the caller: positions and
//! lengths are expected to be validated against the current [`Text`] before
//! an operation is attempted. Nothing is retried or clamped internally.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Variant |
//! |---------|-------|---------|
//! | Empty line array | `Text::of(&[])` | `EmptyDocument` |
//! | Position past end | `line_at`, `map_pos` | `PositionOutOfRange` |
//! | Bad line number | `line`, `iter_lines` | `LineOutOfRange` |
//! | Wrong document | `apply`, `invert`, nested set in `of` | `LengthMismatch` |
//! | Bad edit range | `ChangeSet::of` | `InvalidChangeRange` |
//! | Malformed JSON | `from_json` | `InvalidJson` |
//!
//! [`Text`]: crate::text::Text

/// Errors from rope and change-set operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextError {
    /// A document needs at least one line.
    EmptyDocument,
    /// A position was outside `[0, length]`.
    PositionOutOfRange { pos: usize, length: usize },
    /// A line number was outside `[1, lines]`.
    LineOutOfRange { line: usize, lines: usize },
    /// A change set was used with a document (or set) of another length.
    LengthMismatch { expected: usize, actual: usize },
    /// An edit range was inverted or extended past the document.
    InvalidChangeRange { from: usize, to: usize, length: usize },
    /// A JSON value did not have the expected shape.
    InvalidJson(String),
}

impl std::fmt::Display for TextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyDocument => write!(f, "a document must have at least one line"),
            Self::PositionOutOfRange { pos, length } => {
                write!(f, "invalid position {pos} in document of length {length}")
            }
            Self::LineOutOfRange { line, lines } => {
                write!(f, "invalid line number {line} in {lines}-line document")
            }
            Self::LengthMismatch { expected, actual } => {
                write!(f, "length mismatch (got {actual}, expected {expected})")
            }
            Self::InvalidChangeRange { from, to, length } => {
                write!(f, "invalid change range {from} to {to} (in doc of length {length})")
            }
            Self::InvalidJson(what) => write!(f, "invalid JSON representation of {what}"),
        }
    }
}

impl std::error::Error for TextError {}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TextError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            TextError::PositionOutOfRange { pos: 9, length: 7 }.to_string(),
            "invalid position 9 in document of length 7"
        );
        assert_eq!(
            TextError::LineOutOfRange { line: 0, lines: 2 }.to_string(),
            "invalid line number 0 in 2-line document"
        );
        assert_eq!(
            TextError::InvalidJson("ChangeSet".into()).to_string(),
            "invalid JSON representation of ChangeSet"
        );
    }

    #[test]
    fn is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&TextError::EmptyDocument);
    }
}
