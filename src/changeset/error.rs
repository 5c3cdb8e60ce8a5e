//! Error types for changeset parsing and application

use thiserror::Error;

/// Malformed changeset wire string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The string does not start with `Z:`
    #[error("changeset must start with \"Z:\"")]
    MissingHeader,

    /// The length-change sign is neither `>` nor `<`
    #[error("expected '>' or '<' after old length, found {found:?}")]
    MissingSign { found: Option<char> },

    /// A base-36 operand is empty or not base-36
    #[error("invalid base-36 number {text:?} at offset {offset}")]
    InvalidNumber { text: String, offset: usize },

    /// An op tag other than `=`, `-`, `+`, `*`, `|`
    #[error("unexpected character {found:?} at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },

    /// The ops section was not terminated by `$`
    #[error("changeset is missing the '$' character bank separator")]
    MissingBank,

    /// Character bank length disagrees with the sum of insert lengths
    #[error("character bank holds {actual} chars but inserts declare {declared}")]
    BankLengthMismatch { declared: usize, actual: usize },

    /// Ops consume more characters than the declared old length
    #[error("ops consume {consumed} chars of a {old_len}-char document")]
    OpsExceedOldLength { consumed: usize, old_len: usize },

    /// Ops produce a document of a different length than declared
    #[error("declared new length {declared} but ops produce {actual}")]
    NewLengthMismatch { declared: usize, actual: usize },

    /// The declared shrinkage is larger than the old length
    #[error("length change -{delta} is larger than old length {old_len}")]
    NegativeNewLength { old_len: usize, delta: usize },
}

/// Changeset applied or combined with something of the wrong shape
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// Text (or the other changeset) does not have the required length
    #[error("length mismatch: expected {expected} chars, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// An edit range reaches past the end of the text
    #[error("range of {removed} chars at {pos} out of bounds (length: {len})")]
    RangeOutOfBounds {
        pos: usize,
        removed: usize,
        len: usize,
    },
}
