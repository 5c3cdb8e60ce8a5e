//! Crate-level error type

use crate::changeset::{ApplyError, ParseError};
use crate::config::ConfigError;
use crate::marker::MarkerId;
use crate::sync::ConnectionState;
use crate::Revision;
use thiserror::Error;

/// Errors surfaced by a pad session
#[derive(Debug, Error)]
pub enum PadError {
    #[error("malformed changeset: {0}")]
    Parse(#[from] ParseError),

    #[error("changeset does not fit: {0}")]
    Apply(#[from] ApplyError),

    /// Sent and pending changes no longer reproduce the client text
    #[error("client text diverged from server text + sent + pending (expected {expected:?}, client has {client_text:?})")]
    Consistency {
        expected: String,
        client_text: String,
    },

    /// The server broke the collaboration protocol
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// An inbound message could not be decoded
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("session is {state}, not ready for edits")]
    NotReady { state: ConnectionState },

    #[error("pad is read-only")]
    ReadOnly,

    /// Local edits cannot be reconciled with the server after a gap
    #[error("local edits are based on revision {local_rev} but the server is at {server_rev}")]
    OutOfDate {
        local_rev: Revision,
        server_rev: Revision,
    },

    #[error("no such marker: {0}")]
    MarkerNotFound(MarkerId),

    #[error("marker range {start}..{end} is reversed or out of bounds (length: {len})")]
    InvalidMarkerRange { start: usize, end: usize, len: usize },

    /// The session actor is gone
    #[error("session closed")]
    SessionClosed,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PadError {
    /// True if the session can't continue and must resync from scratch
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PadError::Apply(_)
                | PadError::Consistency { .. }
                | PadError::Protocol(_)
                | PadError::OutOfDate { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PadError>;
