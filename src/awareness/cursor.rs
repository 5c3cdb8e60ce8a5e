//! Cursor positions shared over chat
//!
//! Clients announce their selection as a chat line `!cursor!N` (caret) or
//! `!cursor!N-M` (selection). The marker may appear anywhere in the line.

const PREFIX: &str = "!cursor!";

/// Extracts `(start, end)` from a cursor chat line
pub fn parse_cursor_chat(text: &str) -> Option<(usize, usize)> {
    let rest = &text[text.find(PREFIX)? + PREFIX.len()..];

    let (start, rest) = leading_number(rest)?;
    let end = rest
        .strip_prefix('-')
        .and_then(leading_number)
        .map_or(start, |(end, _)| end);

    Some((start, end))
}

/// Chat line announcing a cursor
pub fn format_cursor_chat(start: usize, end: usize) -> String {
    if start == end {
        format!("{}{}", PREFIX, start)
    } else {
        format!("{}{}-{}", PREFIX, start, end)
    }
}

fn leading_number(s: &str) -> Option<(usize, &str)> {
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    let n = s[..digits].parse().ok()?;
    Some((n, &s[digits..]))
}
