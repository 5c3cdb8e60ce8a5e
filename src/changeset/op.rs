//! Changeset operations, the canonicalising builder and the op cursor
//!
//! Every changeset is assembled through [`Builder`], which is what keeps the
//! representation canonical:
//! - adjacent ops of the same kind are merged
//! - inside a run of non-keep ops, deletes come before inserts
//! - the trailing keep is dropped (it is implicit)
//!
//! [`OpStream`] walks an existing changeset and hands out pieces of its ops,
//! splitting them on demand. `compose` and `follow` are written as zips over
//! two streams.

use super::Changeset;
use serde::{Deserialize, Serialize};

/// Kind of a changeset operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// Copy characters from the old text (`=`)
    Keep,
    /// Drop characters of the old text (`-`)
    Delete,
    /// Emit characters from the character bank (`+`)
    Insert,
}

impl OpKind {
    /// Wire tag for this kind
    pub fn tag(self) -> char {
        match self {
            OpKind::Keep => '=',
            OpKind::Delete => '-',
            OpKind::Insert => '+',
        }
    }

    /// Kind for a wire tag
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            '=' => Some(OpKind::Keep),
            '-' => Some(OpKind::Delete),
            '+' => Some(OpKind::Insert),
            _ => None,
        }
    }
}

/// A single operation: a kind and a length in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Op {
    pub kind: OpKind,
    pub len: usize,
}

impl Op {
    pub fn new(kind: OpKind, len: usize) -> Self {
        Self { kind, len }
    }
}

/// Splits `s` after `n` chars. If `s` is shorter, the whole string is the head.
pub(crate) fn split_chars(s: &str, n: usize) -> (&str, &str) {
    match s.char_indices().nth(n) {
        Some((idx, _)) => s.split_at(idx),
        None => (s, ""),
    }
}

/// Assembles a canonical [`Changeset`] over a text of known length
#[derive(Debug, Clone)]
pub(crate) struct Builder {
    old_len: usize,
    consumed: usize,
    produced: usize,
    ops: Vec<Op>,
    bank: String,
}

impl Builder {
    pub(crate) fn new(old_len: usize) -> Self {
        Self {
            old_len,
            consumed: 0,
            produced: 0,
            ops: Vec::new(),
            bank: String::new(),
        }
    }

    pub(crate) fn keep(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.consumed += n;
        self.produced += n;

        match self.ops.last_mut() {
            Some(op) if op.kind == OpKind::Keep => op.len += n,
            _ => self.ops.push(Op::new(OpKind::Keep, n)),
        }
    }

    pub(crate) fn delete(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.consumed += n;

        match self.ops.as_mut_slice() {
            [.., Op { kind: OpKind::Delete, len }]
            | [.., Op { kind: OpKind::Delete, len }, Op { kind: OpKind::Insert, .. }] => {
                *len += n;
            }
            [.., last @ Op { kind: OpKind::Insert, .. }] => {
                let ins = std::mem::replace(last, Op::new(OpKind::Delete, n));
                self.ops.push(ins);
            }
            _ => self.ops.push(Op::new(OpKind::Delete, n)),
        }
    }

    pub(crate) fn insert(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let n = text.chars().count();
        self.produced += n;
        self.bank.push_str(text);

        match self.ops.last_mut() {
            Some(op) if op.kind == OpKind::Insert => op.len += n,
            _ => self.ops.push(Op::new(OpKind::Insert, n)),
        }
    }

    /// Characters of the old text not yet covered by an op
    pub(crate) fn remaining(&self) -> usize {
        self.old_len.saturating_sub(self.consumed)
    }

    pub(crate) fn finish(mut self) -> Changeset {
        debug_assert!(
            self.consumed <= self.old_len,
            "ops consume {} chars of {}",
            self.consumed,
            self.old_len
        );
        if let Some(Op {
            kind: OpKind::Keep,
            len,
        }) = self.ops.last().copied()
        {
            self.ops.pop();
            self.consumed -= len;
            self.produced -= len;
        }

        let new_len = self.produced + self.remaining();
        Changeset {
            old_len: self.old_len,
            new_len,
            ops: self.ops,
            bank: self.bank,
        }
    }
}

/// A piece handed out by [`OpStream`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Piece<'a> {
    Keep(usize),
    Delete(usize),
    Insert(&'a str),
}

/// Cursor over the ops of a changeset that can split the current op
#[derive(Debug, Clone)]
pub(crate) struct OpStream<'a> {
    ops: std::slice::Iter<'a, Op>,
    bank: &'a str,
    current: Option<Op>,
}

impl<'a> OpStream<'a> {
    pub(crate) fn new(cs: &'a Changeset) -> Self {
        let mut ops = cs.ops.iter();
        let current = ops.next().copied();
        Self {
            ops,
            bank: &cs.bank,
            current,
        }
    }

    /// Remaining part of the current op
    pub(crate) fn peek(&self) -> Option<Op> {
        self.current
    }

    /// First character the current insert would emit
    pub(crate) fn peek_char(&self) -> Option<char> {
        match self.current {
            Some(Op {
                kind: OpKind::Insert,
                ..
            }) => self.bank.chars().next(),
            _ => None,
        }
    }

    /// Takes up to `max` characters of the current op
    pub(crate) fn take(&mut self, max: usize) -> Option<Piece<'a>> {
        let op = self.current?;
        let n = op.len.min(max);

        if n == op.len {
            self.current = self.ops.next().copied();
        } else {
            self.current = Some(Op::new(op.kind, op.len - n));
        }

        Some(match op.kind {
            OpKind::Keep => Piece::Keep(n),
            OpKind::Delete => Piece::Delete(n),
            OpKind::Insert => {
                let (head, tail) = split_chars(self.bank, n);
                self.bank = tail;
                Piece::Insert(head)
            }
        })
    }

    /// Takes the rest of the current op
    pub(crate) fn take_all(&mut self) -> Option<Piece<'a>> {
        self.take(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_merges_adjacent_ops() {
        let mut b = Builder::new(6);
        b.keep(1);
        b.keep(2);
        b.delete(1);
        b.delete(1);
        b.insert("ab");
        b.insert("c");
        let cs = b.finish();

        assert_eq!(
            cs.ops(),
            &[
                Op::new(OpKind::Keep, 3),
                Op::new(OpKind::Delete, 2),
                Op::new(OpKind::Insert, 3),
            ]
        );
        assert_eq!(cs.bank(), "abc");
        assert_eq!(cs.new_len(), 7);
    }

    #[test]
    fn test_builder_orders_deletes_before_inserts() {
        let mut b = Builder::new(4);
        b.keep(1);
        b.insert("x");
        b.delete(2);
        b.insert("y");
        b.delete(1);
        let cs = b.finish();

        assert_eq!(
            cs.ops(),
            &[
                Op::new(OpKind::Keep, 1),
                Op::new(OpKind::Delete, 3),
                Op::new(OpKind::Insert, 2),
            ]
        );
        assert_eq!(cs.bank(), "xy");
    }

    #[test]
    fn test_builder_drops_trailing_keep() {
        let mut b = Builder::new(5);
        b.keep(2);
        b.delete(1);
        b.keep(2);
        let cs = b.finish();

        assert_eq!(
            cs.ops(),
            &[Op::new(OpKind::Keep, 2), Op::new(OpKind::Delete, 1)]
        );
        assert_eq!(cs.old_len(), 5);
        assert_eq!(cs.new_len(), 4);
    }

    #[test]
    fn test_stream_splits_inserts_on_char_boundaries() {
        let mut b = Builder::new(0);
        b.insert("héllo");
        let cs = b.finish();

        let mut stream = OpStream::new(&cs);
        assert_eq!(stream.peek_char(), Some('h'));
        assert_eq!(stream.take(2), Some(Piece::Insert("hé")));
        assert_eq!(stream.peek(), Some(Op::new(OpKind::Insert, 3)));
        assert_eq!(stream.take_all(), Some(Piece::Insert("llo")));
        assert_eq!(stream.take_all(), None);
    }

    #[test]
    fn test_split_chars() {
        assert_eq!(split_chars("abc", 0), ("", "abc"));
        assert_eq!(split_chars("abc", 2), ("ab", "c"));
        assert_eq!(split_chars("abc", 7), ("abc", ""));
    }
}
