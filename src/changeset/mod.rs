//! Changesets: immutable edit descriptions and their algebra
//!
//! A changeset turns a text of `old_len` characters into a text of `new_len`
//! characters. It is a list of keep / delete / insert operations plus a
//! character bank holding the inserted text in op order.
//!
//! The algebra used by the sync engine:
//! - [`Changeset::compose`]: `A` then `B` as one changeset
//! - [`Changeset::follow`]: rebase `B` over a concurrent `A`
//! - [`Changeset::apply_to_text`]
//! - [`Changeset::translate_marker`]
//!
//! # Example
//!
//! ```rust
//! use padsync_core::changeset::Changeset;
//!
//! let base = "ab\n";
//! let a = Changeset::simple_edit(base, 1, 0, "X").unwrap();
//! let b = Changeset::simple_edit(base, 1, 0, "Y").unwrap();
//!
//! // Both sides converge on the same text
//! let left = a.compose(&a.follow(&b, false).unwrap()).unwrap();
//! let right = b.compose(&b.follow(&a, true).unwrap()).unwrap();
//! assert_eq!(left.apply_to_text(base).unwrap(), "aXYb\n");
//! assert_eq!(right.apply_to_text(base).unwrap(), "aXYb\n");
//! ```

mod codec;
mod compose;
mod error;
mod follow;
mod op;

pub use error::{ApplyError, ParseError};
pub use op::{Op, OpKind};

pub(crate) use op::split_chars;
use op::Builder;

use crate::marker::Marker;
use std::fmt::Write;

/// Immutable description of an edit
///
/// Always canonical: see the `op` module for the rules. Two changesets are
/// equal iff they describe the same edit in the same encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Changeset {
    pub(crate) old_len: usize,
    pub(crate) new_len: usize,
    pub(crate) ops: Vec<Op>,
    pub(crate) bank: String,
}

impl Changeset {
    /// The no-op changeset over a text of `len` characters
    pub fn identity(len: usize) -> Self {
        Self {
            old_len: len,
            new_len: len,
            ops: Vec::new(),
            bank: String::new(),
        }
    }

    /// True if applying this changeset never changes the text
    pub fn is_identity(&self) -> bool {
        self.ops.is_empty() && self.old_len == self.new_len
    }

    /// Length of the text this changeset applies to
    pub fn old_len(&self) -> usize {
        self.old_len
    }

    /// Length of the text this changeset produces
    pub fn new_len(&self) -> usize {
        self.new_len
    }

    /// Operations, with the trailing keep left implicit
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Inserted text, in op order
    pub fn bank(&self) -> &str {
        &self.bank
    }

    /// Builds `KEEP(pos) DELETE(removed) INSERT(text) KEEP(rest)` over `old_text`
    ///
    /// # Errors
    ///
    /// Returns `ApplyError::RangeOutOfBounds` if `pos + removed` is past the end
    /// of `old_text`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use padsync_core::changeset::Changeset;
    ///
    /// let cs = Changeset::simple_edit("hello\n", 0, 1, "J").unwrap();
    /// assert_eq!(cs.apply_to_text("hello\n").unwrap(), "Jello\n");
    /// assert_eq!(cs.to_string(), "Z:6>0-1+1$J");
    /// ```
    pub fn simple_edit(
        old_text: &str,
        pos: usize,
        removed: usize,
        text: &str,
    ) -> Result<Self, ApplyError> {
        let len = old_text.chars().count();
        match pos.checked_add(removed) {
            Some(end) if end <= len => {}
            _ => return Err(ApplyError::RangeOutOfBounds { pos, removed, len }),
        }

        let mut b = Builder::new(len);
        b.keep(pos);
        b.delete(removed);
        b.insert(text);
        Ok(b.finish())
    }

    /// Applies this changeset to `text`
    ///
    /// Pure: the input is never modified and equal inputs give equal outputs.
    ///
    /// # Errors
    ///
    /// Returns `ApplyError::LengthMismatch` if `text` is not `old_len` chars long.
    pub fn apply_to_text(&self, text: &str) -> Result<String, ApplyError> {
        let actual = text.chars().count();
        if actual != self.old_len {
            return Err(ApplyError::LengthMismatch {
                expected: self.old_len,
                actual,
            });
        }

        let mut out = String::with_capacity(text.len() + self.bank.len());
        let mut rest = text;
        let mut bank = self.bank.as_str();

        for op in &self.ops {
            match op.kind {
                OpKind::Keep => {
                    let (head, tail) = split_chars(rest, op.len);
                    out.push_str(head);
                    rest = tail;
                }
                OpKind::Delete => {
                    rest = split_chars(rest, op.len).1;
                }
                OpKind::Insert => {
                    let (head, tail) = split_chars(bank, op.len);
                    out.push_str(head);
                    bank = tail;
                }
            }
        }
        out.push_str(rest);

        Ok(out)
    }

    /// Where `marker` ends up once this changeset is applied
    ///
    /// - text before the edit point leaves the marker alone
    /// - an insertion strictly before the marker shifts it right
    /// - an insertion exactly at the marker shifts it right, unless the marker
    ///   is a `before` marker, which stays on the left of the new text
    /// - deleting the character the marker binds to collapses the marker to
    ///   the start of the deletion and marks it invalid
    pub fn translate_marker(&self, marker: &Marker) -> Marker {
        let pos = marker.pos;
        let mut old_pos = 0;
        let mut new_pos = 0;

        for op in &self.ops {
            match op.kind {
                OpKind::Keep => {
                    if pos < old_pos + op.len {
                        return Marker {
                            pos: new_pos + (pos - old_pos),
                            ..*marker
                        };
                    }
                    old_pos += op.len;
                    new_pos += op.len;
                }
                OpKind::Delete => {
                    if pos < old_pos + op.len {
                        return Marker {
                            pos: new_pos,
                            before: marker.before,
                            valid: false,
                        };
                    }
                    old_pos += op.len;
                }
                OpKind::Insert => {
                    if old_pos < pos || !marker.before {
                        new_pos += op.len;
                    }
                }
            }
        }

        Marker {
            pos: new_pos + pos.saturating_sub(old_pos),
            ..*marker
        }
    }

    /// Multi-line dump of the ops, for diagnostics and test failures
    ///
    /// ```text
    /// Z:2>1+1$X
    ///   old_len 2 -> new_len 3
    ///   + 1 "X"
    /// ```
    pub fn explain(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self);
        let _ = writeln!(out, "  old_len {} -> new_len {}", self.old_len, self.new_len);

        let mut bank = self.bank.as_str();
        for op in &self.ops {
            match op.kind {
                OpKind::Insert => {
                    let (head, tail) = split_chars(bank, op.len);
                    bank = tail;
                    let _ = writeln!(out, "  {} {} {:?}", op.kind.tag(), op.len, head);
                }
                _ => {
                    let _ = writeln!(out, "  {} {}", op.kind.tag(), op.len);
                }
            }
        }
        let implicit = self.old_len - self.consumed_len();
        if implicit > 0 {
            let _ = writeln!(out, "  = {} (implicit)", implicit);
        }
        out
    }

    /// Characters of the old text covered by explicit ops
    fn consumed_len(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| op.kind != OpKind::Insert)
            .map(|op| op.len)
            .sum()
    }
}
