mod cursor;
/// Awareness - Presence of the other participants of a pad
///
/// Unlike the text, presence is not synchronized through changesets:
/// - Who's in the pad (`USER_NEWINFO` / `USER_LEAVE`)
/// - Names and colors
/// - Cursor positions, announced as `!cursor!` chat lines
///
/// Nothing here feeds back into the OT state, and presence problems are
/// never fatal for a session.
mod state;

pub use cursor::{format_cursor_chat, parse_cursor_chat};
pub use state::{Avatar, Roster};
