//! Presence roster
//!
//! Tracks the other participants of a pad: their name, color and cursor.
//! Cursors are kept in client-text coordinates, so every change to the client
//! text must be fed through [`Roster::adjust_for_changeset`].

use super::cursor::parse_cursor_chat;
use crate::changeset::Changeset;
use crate::marker::Marker;
use crate::protocol::{ChatEntry, UserInfo};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Presence record of one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    pub user_id: String,
    pub name: Option<String>,
    /// Resolved color, e.g. `#ffc7c7`
    pub color: Option<String>,
    /// Selection start in the client text
    pub start: usize,
    /// Selection end in the client text; equal to `start` for a caret
    pub end: usize,
    /// Local time of the last edit or cursor move seen from this user
    pub last_seen: Option<DateTime<Utc>>,
}

impl Avatar {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: None,
            color: None,
            start: 0,
            end: 0,
            last_seen: None,
        }
    }

    /// Moves the cursor through `cs`
    ///
    /// The author's own cursor rides along with the text they insert;
    /// everyone else's stays put when text lands right at it.
    pub fn adjust_for_changeset(
        &mut self,
        author: Option<&str>,
        cs: &Changeset,
        time: Option<DateTime<Utc>>,
    ) {
        let own = author == Some(self.user_id.as_str());
        self.start = cs.translate_marker(&Marker::new(self.start, !own)).pos;
        self.end = cs.translate_marker(&Marker::new(self.end, !own)).pos;

        if own && time.is_some() {
            self.last_seen = time;
        }
    }
}

/// All known participants
#[derive(Debug, Clone)]
pub struct Roster {
    avatars: HashMap<String, Avatar>,
    palette: Vec<String>,
    /// Server clock minus local clock
    time_offset: TimeDelta,
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            avatars: HashMap::new(),
            palette: Vec::new(),
            time_offset: TimeDelta::zero(),
        }
    }
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Color palette that `colorId` indices refer to
    pub fn set_palette(&mut self, palette: Vec<String>) {
        self.palette = palette;
    }

    /// Records the server clock so server times can be converted
    ///
    /// Timestamps too far from the local clock to form an offset are ignored.
    pub fn set_server_time(&mut self, server_ms: i64) {
        let offset = server_ms
            .checked_sub(Utc::now().timestamp_millis())
            .and_then(TimeDelta::try_milliseconds);

        match offset {
            Some(offset) => self.time_offset = offset,
            None => warn!(server_ms, "ignoring out-of-range server timestamp"),
        }
    }

    pub fn time_offset(&self) -> TimeDelta {
        self.time_offset
    }

    /// Local time of a server timestamp (milliseconds since the epoch)
    pub fn server_to_local(&self, server_ms: i64) -> Option<DateTime<Utc>> {
        let local = server_ms.checked_sub(self.time_offset.num_milliseconds())?;
        DateTime::from_timestamp_millis(local)
    }

    pub fn get(&self, user_id: &str) -> Option<&Avatar> {
        self.avatars.get(user_id)
    }

    /// The avatar for `user_id`, created at the start of the text if unknown
    pub fn ensure(&mut self, user_id: &str) -> &mut Avatar {
        self.avatars
            .entry(user_id.to_string())
            .or_insert_with(|| Avatar::new(user_id))
    }

    /// Handles `USER_NEWINFO`
    pub fn apply_user_info(&mut self, info: &UserInfo) {
        let color = info.color.as_ref().and_then(|c| c.resolve(&self.palette));
        let avatar = self.ensure(&info.user_id);
        avatar.name = info.name.clone();
        avatar.color = color;
    }

    /// Handles `USER_LEAVE`
    pub fn remove(&mut self, user_id: &str) -> Option<Avatar> {
        self.avatars.remove(user_id)
    }

    /// Handles a chat line; returns true if it was a cursor announcement
    ///
    /// Cursor positions are clamped to `text_len`.
    pub fn apply_chat(&mut self, entry: &ChatEntry, text_len: usize) -> bool {
        let Some((start, end)) = parse_cursor_chat(&entry.text) else {
            return false;
        };
        let seen = entry.time.and_then(|t| self.server_to_local(t));

        let avatar = self.ensure(&entry.user_id);
        if let Some(name) = &entry.user_name {
            avatar.name = Some(name.clone());
        }
        avatar.start = start.min(text_len);
        avatar.end = end.min(text_len).max(avatar.start);
        if seen.is_some() {
            avatar.last_seen = seen;
        }
        true
    }

    /// Moves every cursor through `cs`
    pub fn adjust_for_changeset(
        &mut self,
        author: Option<&str>,
        cs: &Changeset,
        time: Option<DateTime<Utc>>,
    ) {
        for avatar in self.avatars.values_mut() {
            avatar.adjust_for_changeset(author, cs, time);
        }
    }

    /// Pulls every cursor inside a text of `len` chars
    pub fn clamp(&mut self, len: usize) {
        for avatar in self.avatars.values_mut() {
            avatar.start = avatar.start.min(len);
            avatar.end = avatar.end.min(len);
        }
    }

    pub fn len(&self) -> usize {
        self.avatars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.avatars.is_empty()
    }

    /// Copy of all avatars, sorted by user id
    pub fn snapshot(&self) -> Vec<Avatar> {
        let mut avatars: Vec<Avatar> = self.avatars.values().cloned().collect();
        avatars.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        avatars
    }
}
