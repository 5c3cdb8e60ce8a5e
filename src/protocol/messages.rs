//! Typed protocol messages
//!
//! Every message the session understands is a variant of a closed enum. Types
//! the session does not know end up in an explicit `Unrecognized` variant so
//! they can be logged and dropped without failing the session.

use crate::changeset::Changeset;
use crate::Revision;
use serde::{Deserialize, Serialize};

/// Message from the server
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Full server state, sent after `CLIENT_READY`
    ClientVars(ClientVars),

    /// Everything exchanged while collaborating
    CollabRoom(CollabRoomMessage),

    /// The server is closing the session
    Disconnect { cause: String },

    /// Top-level `type` the session does not handle
    Unrecognized { kind: String },
}

impl InboundMessage {
    /// Protocol name of the message, for logs
    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::ClientVars(_) => "CLIENT_VARS",
            InboundMessage::CollabRoom(inner) => inner.kind(),
            InboundMessage::Disconnect { .. } => "disconnect",
            InboundMessage::Unrecognized { kind } => kind,
        }
    }
}

/// Payload of `CLIENT_VARS`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClientVars {
    pub rev: Revision,
    pub text: String,
    pub user_id: Option<String>,
    pub read_only: bool,
    pub read_only_id: Option<String>,
    /// Server clock, milliseconds since the epoch
    pub server_timestamp: Option<i64>,
    pub color_palette: Vec<String>,
    pub chat_history: Vec<ChatEntry>,
}

/// Inner message of a `COLLABROOM` envelope
#[derive(Debug, Clone, PartialEq)]
pub enum CollabRoomMessage {
    /// Another client's edit, as committed by the server
    NewChanges {
        new_rev: Revision,
        changeset: Changeset,
        author: Option<String>,
        /// Server time of the edit, milliseconds since the epoch
        current_time: Option<i64>,
    },

    /// Our in-flight submission was committed as `new_rev`
    AcceptCommit { new_rev: Revision },

    /// A raw submission relayed by the server
    UserChanges {
        base_rev: Revision,
        changeset: Changeset,
    },

    UserNewInfo(UserInfo),

    UserLeave { user_id: String },

    ChatMessage(ChatEntry),

    /// Known inner `type` whose fields could not be decoded
    Malformed { kind: String, reason: String },

    /// Inner `type` the session does not handle
    Unrecognized { kind: String },
}

impl CollabRoomMessage {
    pub fn kind(&self) -> &str {
        match self {
            CollabRoomMessage::NewChanges { .. } => "NEW_CHANGES",
            CollabRoomMessage::AcceptCommit { .. } => "ACCEPT_COMMIT",
            CollabRoomMessage::UserChanges { .. } => "USER_CHANGES",
            CollabRoomMessage::UserNewInfo(_) => "USER_NEWINFO",
            CollabRoomMessage::UserLeave { .. } => "USER_LEAVE",
            CollabRoomMessage::ChatMessage(_) => "CHAT_MESSAGE",
            CollabRoomMessage::Malformed { kind, .. } => kind,
            CollabRoomMessage::Unrecognized { kind } => kind,
        }
    }

    /// True for messages that move the revision or the sent changes
    pub fn affects_ot_state(&self) -> bool {
        matches!(self.kind(), "NEW_CHANGES" | "ACCEPT_COMMIT")
    }
}

/// Presence details of a participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub user_id: String,
    pub name: Option<String>,
    pub color: Option<ColorRef>,
}

/// A color, either literal or an index into the pad's palette
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorRef {
    Index(usize),
    Literal(String),
}

impl ColorRef {
    /// Resolves palette indices; unknown indices resolve to `None`
    pub fn resolve(&self, palette: &[String]) -> Option<String> {
        match self {
            ColorRef::Index(i) => palette.get(*i).cloned(),
            ColorRef::Literal(s) => Some(s.clone()),
        }
    }
}

/// A chat line, live or from history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub text: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    /// Server time, milliseconds since the epoch
    #[serde(default)]
    pub time: Option<i64>,
}

/// Message to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Opens the session on a pad
    ClientReady {
        pad_id: String,
        token: String,
        protocol_version: u32,
    },

    /// Submits local changes made on top of `base_rev`
    UserChanges {
        base_rev: Revision,
        /// Wire form with line counts
        changeset: String,
    },

    ChatMessage { text: String },
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::ClientReady { .. } => "CLIENT_READY",
            OutboundMessage::UserChanges { .. } => "USER_CHANGES",
            OutboundMessage::ChatMessage { .. } => "CHAT_MESSAGE",
        }
    }
}
