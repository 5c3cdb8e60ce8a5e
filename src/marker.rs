//! Position anchors that follow the text through edits
//!
//! A [`Marker`] is a plain value: a character offset into the current client
//! text, a binding side and a liveness flag. The [`MarkerRegistry`] owns every
//! marker of a session and replaces them all whenever the text changes.
//!
//! Registry slots are addressed by [`MarkerId`]. Ids are handed out in
//! registration order and stay valid for the lifetime of the registry; there
//! is no removal.
//!
//! # Example
//!
//! ```rust
//! use padsync_core::changeset::Changeset;
//! use padsync_core::marker::{Marker, MarkerRegistry};
//!
//! let mut markers = MarkerRegistry::new();
//! let id = markers.register(Marker::new(3, true));
//!
//! let cs = Changeset::simple_edit("abcdef\n", 0, 0, "XY").unwrap();
//! markers.translate_all(&cs);
//! assert_eq!(markers.get(id).unwrap().pos, 5);
//! ```

use crate::changeset::Changeset;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in the client text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Marker {
    /// Character offset into the current text
    pub pos: usize,
    /// Binds to the character at `pos` from the left: an insertion exactly
    /// at `pos` lands after the marker
    pub before: bool,
    /// Cleared when the character the marker was bound to is deleted
    pub valid: bool,
}

impl Marker {
    /// A live marker at `pos`
    pub fn new(pos: usize, before: bool) -> Self {
        Self {
            pos,
            before,
            valid: true,
        }
    }

    /// Offset to use as a range boundary: one past `pos` for markers that
    /// sit after their character
    pub fn boundary(&self) -> usize {
        if self.before {
            self.pos
        } else {
            self.pos + 1
        }
    }
}

/// Stable handle to a registry slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarkerId(usize);

impl MarkerId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for MarkerId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "marker#{}", self.0)
    }
}

/// Ordered arena of markers
#[derive(Debug, Clone, Default)]
pub struct MarkerRegistry {
    markers: Vec<Marker>,
}

impl MarkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a marker and returns its id
    pub fn register(&mut self, marker: Marker) -> MarkerId {
        self.markers.push(marker);
        MarkerId(self.markers.len() - 1)
    }

    /// Puts a new value in an existing slot
    ///
    /// Returns the previous value, or `None` if `id` was never handed out.
    pub fn replace(&mut self, id: MarkerId, marker: Marker) -> Option<Marker> {
        self.markers
            .get_mut(id.0)
            .map(|slot| std::mem::replace(slot, marker))
    }

    pub fn get(&self, id: MarkerId) -> Option<Marker> {
        self.markers.get(id.0).copied()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Markers with their ids, in registration order
    pub fn iter(&self) -> impl Iterator<Item = (MarkerId, Marker)> + '_ {
        self.markers
            .iter()
            .enumerate()
            .map(|(i, m)| (MarkerId(i), *m))
    }

    /// Replaces every marker with its translation through `cs`
    pub fn translate_all(&mut self, cs: &Changeset) {
        for slot in &mut self.markers {
            *slot = cs.translate_marker(slot);
        }
    }

    /// Invalidates every marker and pulls it inside a text of `len` chars
    ///
    /// Used when the text is replaced by something no changeset relates to
    /// the old one.
    pub fn invalidate_all(&mut self, len: usize) {
        for slot in &mut self.markers {
            *slot = Marker {
                pos: slot.pos.min(len),
                before: slot.before,
                valid: false,
            };
        }
    }

    /// Copy of all markers, indexed by `MarkerId::index`
    pub fn snapshot(&self) -> Vec<Marker> {
        self.markers.clone()
    }
}
