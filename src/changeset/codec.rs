//! Wire encoding of changesets
//!
//! ```text
//! Z:<old_len> (">"|"<") <|new_len - old_len|> <ops> "$" <char bank>
//! op := ("*" <attrib>)* ("|" <lines>)? ("=" | "-" | "+") <len>
//! ```
//!
//! All numbers are base-36. Attribute references are accepted and dropped
//! (the attribute pool is always empty). Line counts are accepted and
//! ignored on parse; `to_wire_against` emits them for servers that check them.

use super::op::{split_chars, Builder, Op, OpKind};
use super::{ApplyError, Changeset, ParseError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Formats `n` in lowercase base-36
pub(crate) fn to_base36(mut n: usize) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(DIGITS[n % 36]);
        n /= 36;
    }
    digits.reverse();
    // Only ASCII digits were pushed
    String::from_utf8(digits).unwrap_or_default()
}

/// Byte-offset cursor over the ops section of a wire string
struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn number(&mut self) -> Result<usize, ParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        let text = &self.src[start..self.pos];
        usize::from_str_radix(text, 36).map_err(|_| ParseError::InvalidNumber {
            text: text.to_string(),
            offset: start,
        })
    }
}

impl Changeset {
    /// Parses a wire string
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] describing the first problem found; nothing
    /// is partially built.
    ///
    /// # Example
    ///
    /// ```rust
    /// use padsync_core::changeset::Changeset;
    ///
    /// let cs = Changeset::parse("Z:2>1=1*0+1$X").unwrap();
    /// assert_eq!(cs.apply_to_text("ab").unwrap(), "aXb");
    ///
    /// assert!(Changeset::parse("Z:2>1=1+3$X").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let body = s.strip_prefix("Z:").ok_or(ParseError::MissingHeader)?;
        let mut sc = Scanner { src: s, pos: s.len() - body.len() };

        let old_len = sc.number()?;
        let shrinking = match sc.bump() {
            Some('>') => false,
            Some('<') => true,
            found => return Err(ParseError::MissingSign { found }),
        };
        let delta = sc.number()?;
        let declared_new_len = if shrinking {
            old_len
                .checked_sub(delta)
                .ok_or(ParseError::NegativeNewLength { old_len, delta })?
        } else {
            old_len.saturating_add(delta)
        };

        // First pass: read ops so the bank can be checked before slicing it
        let mut ops = Vec::new();
        loop {
            match sc.peek() {
                Some('$') => {
                    sc.bump();
                    break;
                }
                Some('*') | Some('|') => {
                    sc.bump();
                    sc.number()?;
                }
                Some(tag) => {
                    let kind = OpKind::from_tag(tag).ok_or(ParseError::UnexpectedChar {
                        found: tag,
                        offset: sc.pos,
                    })?;
                    sc.bump();
                    ops.push(Op::new(kind, sc.number()?));
                }
                None => return Err(ParseError::MissingBank),
            }
        }
        let bank = &s[sc.pos..];

        let declared: usize = ops
            .iter()
            .filter(|op| op.kind == OpKind::Insert)
            .fold(0usize, |acc, op| acc.saturating_add(op.len));
        let actual = bank.chars().count();
        if declared != actual {
            return Err(ParseError::BankLengthMismatch { declared, actual });
        }

        let mut b = Builder::new(old_len);
        let mut consumed = 0usize;
        let mut rest = bank;
        for op in ops {
            match op.kind {
                OpKind::Keep | OpKind::Delete => {
                    consumed = consumed.saturating_add(op.len);
                    if consumed > old_len {
                        return Err(ParseError::OpsExceedOldLength { consumed, old_len });
                    }
                    if op.kind == OpKind::Keep {
                        b.keep(op.len);
                    } else {
                        b.delete(op.len);
                    }
                }
                OpKind::Insert => {
                    let (head, tail) = split_chars(rest, op.len);
                    rest = tail;
                    b.insert(head);
                }
            }
        }

        let cs = b.finish();
        if cs.new_len != declared_new_len {
            return Err(ParseError::NewLengthMismatch {
                declared: declared_new_len,
                actual: cs.new_len,
            });
        }
        Ok(cs)
    }

    /// Encodes with a `|lines` count on every op, as checked by servers
    ///
    /// Ops that span newlines are split so that each multi-line op ends with
    /// a newline. `old_text` must be the text this changeset applies to.
    ///
    /// # Errors
    ///
    /// Returns `ApplyError::LengthMismatch` if `old_text` has the wrong length.
    pub fn to_wire_against(&self, old_text: &str) -> Result<String, ApplyError> {
        let actual = old_text.chars().count();
        if actual != self.old_len {
            return Err(ApplyError::LengthMismatch {
                expected: self.old_len,
                actual,
            });
        }

        let mut out = self.header();
        let mut rest = old_text;
        let mut bank = self.bank.as_str();
        for op in &self.ops {
            let source = match op.kind {
                OpKind::Keep | OpKind::Delete => &mut rest,
                OpKind::Insert => &mut bank,
            };
            let (covered, tail) = split_chars(*source, op.len);
            *source = tail;
            push_with_lines(&mut out, op.kind, covered);
        }
        out.push('$');
        out.push_str(&self.bank);

        Ok(out)
    }

    fn header(&self) -> String {
        let (sign, delta) = if self.new_len >= self.old_len {
            ('>', self.new_len - self.old_len)
        } else {
            ('<', self.old_len - self.new_len)
        };
        format!("Z:{}{}{}", to_base36(self.old_len), sign, to_base36(delta))
    }
}

/// Emits `text` as one or two ops of `kind`: the part up to the last newline
/// with its line count, then the newline-free remainder.
fn push_with_lines(out: &mut String, kind: OpKind, text: &str) {
    let (lined, tail) = match text.rfind('\n') {
        Some(idx) => text.split_at(idx + 1),
        None => ("", text),
    };

    if !lined.is_empty() {
        let lines = lined.matches('\n').count();
        out.push('|');
        out.push_str(&to_base36(lines));
        out.push(kind.tag());
        out.push_str(&to_base36(lined.chars().count()));
    }
    if !tail.is_empty() {
        out.push(kind.tag());
        out.push_str(&to_base36(tail.chars().count()));
    }
}

impl fmt::Display for Changeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header())?;
        for op in &self.ops {
            write!(f, "{}{}", op.kind.tag(), to_base36(op.len))?;
        }
        write!(f, "${}", self.bank)
    }
}

impl FromStr for Changeset {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Changeset::parse(s)
    }
}

impl Serialize for Changeset {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Changeset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Changeset::parse(&s).map_err(serde::de::Error::custom)
    }
}
