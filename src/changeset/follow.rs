//! Rebasing a changeset over a concurrent one

use super::op::{Builder, OpKind, OpStream, Piece};
use super::{ApplyError, Changeset};

impl Changeset {
    /// Rebases `other` so it applies after `self`
    ///
    /// `self` and `other` must start from the same text. The result `other'`
    /// starts from `self`'s output and makes the same change `other` made:
    ///
    /// ```text
    /// self.compose(self.follow(other, r)) == other.compose(other.follow(self, !r))
    /// ```
    ///
    /// When both sides insert at the same offset, an insert starting with a
    /// newline goes after one that doesn't. Otherwise `reverse_insert_order`
    /// decides: `false` puts `self`'s text first, `true` puts `other`'s first.
    /// Text deleted by both sides is deleted once.
    ///
    /// # Errors
    ///
    /// Returns `ApplyError::LengthMismatch` unless both changesets have the same `old_len`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use padsync_core::changeset::Changeset;
    ///
    /// let base = "abcdef\n";
    /// let a = Changeset::simple_edit(base, 1, 3, "").unwrap();
    /// let b = Changeset::simple_edit(base, 2, 3, "X").unwrap();
    ///
    /// let b2 = a.follow(&b, false).unwrap();
    /// assert_eq!(b2.apply_to_text("aef\n").unwrap(), "aXf\n");
    /// ```
    pub fn follow(
        &self,
        other: &Changeset,
        reverse_insert_order: bool,
    ) -> Result<Changeset, ApplyError> {
        if self.old_len != other.old_len {
            return Err(ApplyError::LengthMismatch {
                expected: self.old_len,
                actual: other.old_len,
            });
        }

        let mut a = OpStream::new(self);
        let mut b = OpStream::new(other);
        let mut out = Builder::new(self.new_len);

        loop {
            let (a_op, b_op) = (a.peek(), b.peek());
            let a_inserts = a_op.is_some_and(|op| op.kind == OpKind::Insert);
            let b_inserts = b_op.is_some_and(|op| op.kind == OpKind::Insert);

            if a_inserts || b_inserts {
                let a_first = if !b_inserts {
                    true
                } else if !a_inserts {
                    false
                } else {
                    match (a.peek_char() == Some('\n'), b.peek_char() == Some('\n')) {
                        (true, false) => false,
                        (false, true) => true,
                        _ => !reverse_insert_order,
                    }
                };

                if a_first {
                    // Text inserted by `self` is already there: step over it
                    if let Some(op) = a_op {
                        a.take_all();
                        out.keep(op.len);
                    }
                } else if let Some(Piece::Insert(text)) = b.take_all() {
                    out.insert(text);
                }
                continue;
            }

            match (a_op, b_op) {
                (None, None) => break,

                // Already gone on our side: whatever `other` does to it is moot
                (Some(x), _) if x.kind == OpKind::Delete => match b_op {
                    None => {
                        a.take_all();
                    }
                    Some(y) => {
                        let n = x.len.min(y.len);
                        a.take(n);
                        b.take(n);
                    }
                },

                (_, Some(y)) if y.kind == OpKind::Delete => match a_op {
                    None => {
                        b.take_all();
                        out.delete(y.len);
                    }
                    Some(x) => {
                        let n = x.len.min(y.len);
                        a.take(n);
                        b.take(n);
                        out.delete(n);
                    }
                },

                // Only keeps are left from here on
                (None, Some(y)) => {
                    b.take_all();
                    out.keep(y.len);
                }
                (Some(x), None) => {
                    a.take_all();
                    out.keep(x.len);
                }
                (Some(x), Some(y)) => {
                    let n = x.len.min(y.len);
                    a.take(n);
                    b.take(n);
                    out.keep(n);
                }
            }
        }

        Ok(out.finish())
    }
}
