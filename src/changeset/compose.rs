//! Sequential composition

use super::op::{Builder, OpKind, OpStream, Piece};
use super::{ApplyError, Changeset};

impl Changeset {
    /// Combines `self` followed by `other` into one changeset
    ///
    /// `compose(A, B).apply_to_text(t) == B.apply_to_text(A.apply_to_text(t))`.
    /// Text inserted by `self` and deleted by `other` never appears in the
    /// result.
    ///
    /// # Errors
    ///
    /// Returns `ApplyError::LengthMismatch` unless `self.new_len() == other.old_len()`.
    pub fn compose(&self, other: &Changeset) -> Result<Changeset, ApplyError> {
        if self.new_len != other.old_len {
            return Err(ApplyError::LengthMismatch {
                expected: self.new_len,
                actual: other.old_len,
            });
        }

        let mut a = OpStream::new(self);
        let mut b = OpStream::new(other);
        let mut out = Builder::new(self.old_len);

        loop {
            let (a_op, b_op) = (a.peek(), b.peek());

            // Deletes from A touch text B never sees
            if let Some(op) = a_op.filter(|op| op.kind == OpKind::Delete) {
                a.take_all();
                out.delete(op.len);
                continue;
            }
            // Inserts from B consume nothing of A's output
            if b_op.is_some_and(|op| op.kind == OpKind::Insert) {
                if let Some(Piece::Insert(text)) = b.take_all() {
                    out.insert(text);
                }
                continue;
            }

            match (a_op, b_op) {
                (None, None) => break,
                // Past the end of A's ops everything is an implicit keep
                (None, Some(_)) => match b.take_all() {
                    Some(Piece::Keep(n)) => out.keep(n),
                    Some(Piece::Delete(n)) => out.delete(n),
                    _ => {}
                },
                (Some(_), None) => match a.take_all() {
                    Some(Piece::Keep(n)) => out.keep(n),
                    Some(Piece::Insert(text)) => out.insert(text),
                    _ => {}
                },
                (Some(x), Some(y)) => {
                    let n = x.len.min(y.len);
                    match (a.take(n), b.take(n)) {
                        (Some(Piece::Keep(n)), Some(Piece::Keep(_))) => out.keep(n),
                        (Some(Piece::Keep(n)), Some(Piece::Delete(_))) => out.delete(n),
                        (Some(Piece::Insert(text)), Some(Piece::Keep(_))) => out.insert(text),
                        // Inserted by A, deleted by B: cancels out
                        (Some(Piece::Insert(_)), Some(Piece::Delete(_))) => {}
                        _ => unreachable!("deletes of A and inserts of B are handled above"),
                    }
                }
            }
        }

        Ok(out.finish())
    }
}
