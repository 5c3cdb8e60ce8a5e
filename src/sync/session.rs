//! A client session on one pad
//!
//! [`Session`] ties the OT state, the marker registry and the presence roster
//! to a [`Transport`]. It follows the connection through
//! `Disconnected → Connecting → AwaitingServerState → Ready` and applies
//! inbound messages only from [`Session::update`], in arrival order.
//!
//! # Example
//!
//! ```rust
//! use padsync_core::config::SessionConfig;
//! use padsync_core::protocol::{decode_str, OutboundMessage};
//! use padsync_core::sync::Session;
//!
//! let transport: Vec<OutboundMessage> = Vec::new();
//! let mut session = Session::new(SessionConfig::new("notes"), transport).unwrap();
//!
//! session.connect().unwrap();
//! session.transport_connected();
//! session.deliver(decode_str(
//!     r#"{"type":"CLIENT_VARS","data":{"collab_client_vars":{"rev":0,"initialAttributedText":{"text":"\n"}}}}"#,
//! ).unwrap());
//! session.update(false, true).unwrap();
//!
//! session.make_simple_change(0, 0, "hi\n").unwrap();
//! assert!(!session.update(true, false).unwrap());
//! assert!(session.is_awaiting_ack());
//! ```

use super::state::{OtState, Submission};
use super::transport::Transport;
use crate::awareness::{format_cursor_chat, Avatar, Roster};
use crate::changeset::Changeset;
use crate::config::SessionConfig;
use crate::error::{PadError, Result};
use crate::marker::{Marker, MarkerId, MarkerRegistry};
use crate::protocol::{ClientVars, CollabRoomMessage, InboundMessage, OutboundMessage};
use crate::Revision;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Where the session is in the connection handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    /// Transport is being opened
    Connecting,
    /// `CLIENT_READY` sent, waiting for `CLIENT_VARS`
    AwaitingServerState,
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::AwaitingServerState => "awaiting server state",
            ConnectionState::Ready => "ready",
        })
    }
}

/// Immutable snapshot of the session text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextState {
    pub server_text: String,
    pub server_rev: Revision,
    pub client_text: String,
    /// `None` while local changes are unacknowledged
    pub client_rev: Option<Revision>,
    /// Indexed by `MarkerId::index`
    pub markers: Vec<Marker>,
}

pub struct Session<T: Transport> {
    config: SessionConfig,
    token: String,
    transport: T,
    connection: ConnectionState,
    /// `None` until the first `CLIENT_VARS`
    ot: Option<OtState>,
    inbound: VecDeque<InboundMessage>,
    markers: MarkerRegistry,
    roster: Roster,
    user_id: Option<String>,
    read_only: bool,
    read_only_id: Option<String>,
    /// Set after a fatal error: the next `CLIENT_VARS` replaces all local state
    resync_from_scratch: bool,
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("pad_id", &self.config.pad_id)
            .field("connection", &self.connection)
            .field("ot", &self.ot)
            .field("inbound", &self.inbound.len())
            .field("markers", &self.markers.len())
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl<T: Transport> Session<T> {
    /// Creates a disconnected session
    ///
    /// # Errors
    ///
    /// `PadError::Config` if the configuration does not validate.
    pub fn new(config: SessionConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let token = config.token_or_generate();

        Ok(Self {
            config,
            token,
            transport,
            connection: ConnectionState::Disconnected,
            ot: None,
            inbound: VecDeque::new(),
            markers: MarkerRegistry::new(),
            roster: Roster::new(),
            user_id: None,
            read_only: false,
            read_only_id: None,
            resync_from_scratch: false,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Author token sent in `CLIENT_READY`
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ----- connection lifecycle -----

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// Starts opening the transport
    ///
    /// # Errors
    ///
    /// `PadError::NotReady` unless the session is disconnected.
    pub fn connect(&mut self) -> Result<()> {
        if self.connection != ConnectionState::Disconnected {
            return Err(PadError::NotReady {
                state: self.connection,
            });
        }
        info!(pad_id = %self.config.pad_id, "connecting");
        self.connection = ConnectionState::Connecting;
        Ok(())
    }

    /// The transport is open: sends `CLIENT_READY`
    pub fn transport_connected(&mut self) {
        if self.connection != ConnectionState::Connecting {
            warn!(state = %self.connection, "ignoring transport connect while not connecting");
            return;
        }

        self.transport.send_outbound(OutboundMessage::ClientReady {
            pad_id: self.config.pad_id.clone(),
            token: self.token.clone(),
            protocol_version: self.config.protocol_version,
        });
        self.connection = ConnectionState::AwaitingServerState;
        debug!(pad_id = %self.config.pad_id, "sent CLIENT_READY");
    }

    /// The transport is gone
    ///
    /// Queued messages are dropped and in-flight changes go back to pending;
    /// they are submitted again once a fresh `CLIENT_VARS` confirms the
    /// server is still at the same revision.
    pub fn transport_disconnected(&mut self) {
        if self.connection == ConnectionState::Disconnected {
            return;
        }
        self.drop_connection();
        info!(pad_id = %self.config.pad_id, "disconnected");
    }

    fn drop_connection(&mut self) {
        self.connection = ConnectionState::Disconnected;
        if !self.inbound.is_empty() {
            debug!(dropped = self.inbound.len(), "dropping queued messages");
            self.inbound.clear();
        }
        let requeued = self.ot.as_mut().map_or(Ok(()), OtState::requeue_in_flight);
        if let Err(e) = requeued {
            self.fail(&e);
        }
    }

    /// Fatal error: back to `Disconnected`, local state is discarded on resync
    fn fail(&mut self, err: &PadError) {
        error!(pad_id = %self.config.pad_id, error = %err, "session failed, resync required");
        self.connection = ConnectionState::Disconnected;
        self.inbound.clear();
        self.resync_from_scratch = true;
    }

    /// True after a fatal error until the next `CLIENT_VARS`
    pub fn needs_resync(&self) -> bool {
        self.resync_from_scratch
    }

    // ----- inbound -----

    /// Queues a message from the server; it takes effect in [`Session::update`]
    pub fn deliver(&mut self, message: InboundMessage) {
        if self.connection == ConnectionState::Disconnected {
            debug!(kind = message.kind(), "ignoring message while disconnected");
            return;
        }
        self.inbound.push_back(message);
    }

    /// Number of messages waiting for [`Session::update`]
    pub fn queued(&self) -> usize {
        self.inbound.len()
    }

    /// Processes queued messages and/or submits pending changes
    ///
    /// Returns true if something visible changed: new server state was
    /// adopted or a remote edit reached the client text.
    ///
    /// # Errors
    ///
    /// Fatal errors tear the session down (see [`PadError::is_fatal`]) and
    /// are returned. Non-fatal problems with single messages are logged and
    /// the message is dropped.
    pub fn update(&mut self, is_sending: bool, is_receiving: bool) -> Result<bool> {
        let mut has_new = false;

        if is_receiving {
            while let Some(message) = self.inbound.pop_front() {
                match self.dispatch(message) {
                    Ok(visible) => has_new |= visible,
                    Err(e) if e.is_fatal() => {
                        self.fail(&e);
                        return Err(e);
                    }
                    Err(e) => warn!(error = %e, "dropping message"),
                }
            }
        }

        if is_sending {
            if let Err(e) = self.commit() {
                self.fail(&e);
                return Err(e);
            }
        }

        Ok(has_new)
    }

    fn dispatch(&mut self, message: InboundMessage) -> Result<bool> {
        match message {
            InboundMessage::ClientVars(vars) => self.handle_client_vars(vars),
            InboundMessage::CollabRoom(inner) => {
                if self.connection != ConnectionState::Ready {
                    warn!(kind = inner.kind(), state = %self.connection, "COLLABROOM message before CLIENT_VARS");
                    return Ok(false);
                }
                self.handle_collab_room(inner)
            }
            InboundMessage::Disconnect { cause } => {
                warn!(%cause, "server requested disconnect");
                self.drop_connection();
                Ok(false)
            }
            InboundMessage::Unrecognized { kind } => {
                warn!(%kind, "unknown message type");
                Ok(false)
            }
        }
    }

    fn handle_client_vars(&mut self, vars: ClientVars) -> Result<bool> {
        if self.connection != ConnectionState::AwaitingServerState {
            warn!(state = %self.connection, "unexpected CLIENT_VARS");
            return Ok(false);
        }
        if self.resync_from_scratch {
            self.ot = None;
        }

        match self.ot.as_ref() {
            Some(ot) if ot.is_send_pending() => {
                // Local edits only make sense against the text they were made on
                if vars.rev != ot.server_rev() || vars.text != ot.server_text() {
                    return Err(PadError::OutOfDate {
                        local_rev: ot.server_rev(),
                        server_rev: vars.rev,
                    });
                }
                info!(rev = vars.rev, "resumed with local changes");
            }
            previous => {
                let text_changed = previous.is_some_and(|ot| ot.client_text() != vars.text);
                let state = OtState::new(vars.text, vars.rev);
                if text_changed || previous.is_none() {
                    self.markers.invalidate_all(state.client_len());
                    self.roster.clamp(state.client_len());
                }
                info!(rev = vars.rev, len = state.client_len(), "adopted server state");
                self.ot = Some(state);
            }
        }

        self.user_id = vars.user_id;
        self.read_only = vars.read_only;
        self.read_only_id = vars.read_only_id;
        self.roster.set_palette(vars.color_palette);
        if let Some(ts) = vars.server_timestamp {
            self.roster.set_server_time(ts);
        }

        let len = self.client_len();
        for entry in &vars.chat_history {
            self.roster.apply_chat(entry, len);
        }

        self.connection = ConnectionState::Ready;
        self.resync_from_scratch = false;
        Ok(true)
    }

    fn handle_collab_room(&mut self, message: CollabRoomMessage) -> Result<bool> {
        match message {
            CollabRoomMessage::NewChanges {
                new_rev,
                changeset,
                author,
                current_time,
            } => {
                let d = self.ot_mut()?.apply_remote(&changeset, new_rev)?;
                if d.is_identity() {
                    return Ok(false);
                }

                self.markers.translate_all(&d);
                let time = current_time.and_then(|t| self.roster.server_to_local(t));
                if let Some(author) = author.as_deref() {
                    self.roster.ensure(author);
                }
                self.roster.adjust_for_changeset(author.as_deref(), &d, time);
                Ok(true)
            }
            CollabRoomMessage::AcceptCommit { new_rev } => {
                self.ot_mut()?.apply_accept(new_rev)?;
                Ok(false)
            }
            CollabRoomMessage::UserChanges { base_rev, .. } => {
                debug!(base_rev, "ignoring relayed USER_CHANGES");
                Ok(false)
            }
            CollabRoomMessage::UserNewInfo(info) => {
                self.roster.apply_user_info(&info);
                Ok(false)
            }
            CollabRoomMessage::UserLeave { user_id } => {
                self.roster.remove(&user_id);
                Ok(false)
            }
            CollabRoomMessage::ChatMessage(entry) => {
                let len = self.client_len();
                if !self.roster.apply_chat(&entry, len) {
                    debug!(user_id = %entry.user_id, "ignoring chat message");
                }
                Ok(false)
            }
            CollabRoomMessage::Malformed { kind, reason } => {
                if matches!(kind.as_str(), "NEW_CHANGES" | "ACCEPT_COMMIT") {
                    return Err(PadError::Protocol(format!("malformed {}: {}", kind, reason)));
                }
                warn!(%kind, %reason, "dropping malformed COLLABROOM message");
                Ok(false)
            }
            CollabRoomMessage::Unrecognized { kind } => {
                warn!(%kind, "unsupported COLLABROOM message");
                Ok(false)
            }
        }
    }

    // ----- outbound -----

    /// Submits pending changes if nothing is in flight; returns true if sent
    fn commit(&mut self) -> Result<bool> {
        if self.connection != ConnectionState::Ready || self.read_only {
            return Ok(false);
        }
        let Some(ot) = self.ot.as_mut() else {
            return Ok(false);
        };
        let Some(Submission {
            base_rev,
            changeset,
        }) = ot.take_commit()
        else {
            return Ok(false);
        };

        let wire = changeset.to_wire_against(ot.server_text())?;
        debug!(base_rev, changeset = %wire, "submitting USER_CHANGES");
        self.transport.send_outbound(OutboundMessage::UserChanges {
            base_rev,
            changeset: wire,
        });
        Ok(true)
    }

    /// Announces our selection to the other participants
    pub fn broadcast_cursor(&mut self, start: usize, end: usize) -> Result<()> {
        self.require_ready()?;
        self.transport.send_outbound(OutboundMessage::ChatMessage {
            text: format_cursor_chat(start, end),
        });
        Ok(())
    }

    // ----- local edits -----

    fn require_ready(&self) -> Result<()> {
        if self.connection != ConnectionState::Ready {
            return Err(PadError::NotReady {
                state: self.connection,
            });
        }
        Ok(())
    }

    fn ot(&self) -> Result<&OtState> {
        self.ot.as_ref().ok_or(PadError::NotReady {
            state: self.connection,
        })
    }

    fn ot_mut(&mut self) -> Result<&mut OtState> {
        let state = self.connection;
        self.ot.as_mut().ok_or(PadError::NotReady { state })
    }

    fn client_len(&self) -> usize {
        self.ot.as_ref().map_or(0, OtState::client_len)
    }

    /// Applies a local edit to the client text
    ///
    /// # Errors
    ///
    /// `PadError::NotReady` unless connected, `PadError::ReadOnly` on a
    /// read-only pad, `PadError::Apply` if `cs` does not fit the client text.
    pub fn make_change(&mut self, cs: &Changeset) -> Result<()> {
        self.require_ready()?;
        if self.read_only {
            return Err(PadError::ReadOnly);
        }

        self.ot_mut()?.apply_local(cs)?;
        self.markers.translate_all(cs);
        self.roster
            .adjust_for_changeset(self.user_id.as_deref(), cs, Some(Utc::now()));
        Ok(())
    }

    /// Replaces `removed` chars at `pos` with `text`
    pub fn make_simple_change(&mut self, pos: usize, removed: usize, text: &str) -> Result<()> {
        let cs = Changeset::simple_edit(self.ot()?.client_text(), pos, removed, text)?;
        self.make_change(&cs)
    }

    pub fn prepend_text(&mut self, text: &str) -> Result<()> {
        self.make_simple_change(0, 0, text)
    }

    /// Prepends `text` and marks it: returns a `before` marker on its first
    /// char and an after marker on its last
    pub fn prepend_text_and_mark(&mut self, text: &str) -> Result<(MarkerId, MarkerId)> {
        self.prepend_text(text)?;
        let n = text.chars().count();
        Ok((
            self.markers.register(Marker::new(0, true)),
            self.markers.register(Marker::new(n.saturating_sub(1), false)),
        ))
    }

    /// Position in front of the final newline
    fn append_pos(&self) -> Result<usize> {
        Ok(self.ot()?.client_len().saturating_sub(1))
    }

    /// Inserts `text` in front of the final newline
    pub fn append_text(&mut self, text: &str) -> Result<()> {
        let pos = self.append_pos()?;
        self.make_simple_change(pos, 0, text)
    }

    /// Appends `text` like [`Session::append_text`] and marks it
    pub fn append_text_and_mark(&mut self, text: &str) -> Result<(MarkerId, MarkerId)> {
        let pos = self.append_pos()?;
        self.make_simple_change(pos, 0, text)?;
        let n = text.chars().count();
        Ok((
            self.markers.register(Marker::new(pos, true)),
            self.markers.register(Marker::new((pos + n).saturating_sub(1), false)),
        ))
    }

    // ----- markers -----

    /// Anchors a new marker at `pos` of the client text
    pub fn register_marker(&mut self, pos: usize, before: bool) -> Result<MarkerId> {
        self.check_marker_pos(pos)?;
        Ok(self.markers.register(Marker::new(pos, before)))
    }

    /// Moves an existing marker, making it valid again
    pub fn reregister_marker(&mut self, id: MarkerId, pos: usize, before: bool) -> Result<()> {
        self.check_marker_pos(pos)?;
        self.markers
            .replace(id, Marker::new(pos, before))
            .map(|_| ())
            .ok_or(PadError::MarkerNotFound(id))
    }

    fn check_marker_pos(&self, pos: usize) -> Result<()> {
        let len = self.ot()?.client_len();
        if pos > len {
            return Err(PadError::InvalidMarkerRange {
                start: pos,
                end: pos,
                len,
            });
        }
        Ok(())
    }

    pub fn marker(&self, id: MarkerId) -> Result<Marker> {
        self.markers.get(id).ok_or(PadError::MarkerNotFound(id))
    }

    pub fn markers(&self) -> &MarkerRegistry {
        &self.markers
    }

    /// Inserts at a marker
    ///
    /// With `follow` the marker ends up after the inserted text, otherwise in
    /// front of it.
    pub fn insert_at_marker(&mut self, id: MarkerId, text: &str, follow: bool) -> Result<()> {
        let marker = self.marker(id)?;
        self.make_simple_change(marker.boundary(), 0, text)?;

        let pos = if follow {
            marker.pos + text.chars().count()
        } else {
            marker.pos
        };
        self.markers.replace(id, Marker::new(pos, marker.before));
        Ok(())
    }

    /// Replaces the text between two markers
    ///
    /// A `before` start marker includes its character in the range, an after
    /// start marker excludes it; the other way round for the end marker.
    /// Afterwards both markers are valid and bracket the new text.
    pub fn replace_between_markers(
        &mut self,
        start_id: MarkerId,
        end_id: MarkerId,
        text: &str,
    ) -> Result<()> {
        let start = self.marker(start_id)?;
        let end = self.marker(end_id)?;
        let (from, to) = (start.boundary(), end.boundary());
        if to < from {
            return Err(PadError::InvalidMarkerRange {
                start: from,
                end: to,
                len: self.client_len(),
            });
        }

        self.make_simple_change(from, to - from, text)?;

        let end_boundary = from + text.chars().count();
        let end_pos = if end.before {
            end_boundary
        } else {
            end_boundary.saturating_sub(1)
        };
        self.markers.replace(start_id, Marker::new(start.pos, start.before));
        self.markers.replace(end_id, Marker::new(end_pos, end.before));
        Ok(())
    }

    // ----- queries -----

    /// Coherent copy of the current text state
    pub fn snapshot(&self) -> Option<TextState> {
        self.ot.as_ref().map(|ot| TextState {
            server_text: ot.server_text().to_string(),
            server_rev: ot.server_rev(),
            client_text: ot.client_text().to_string(),
            client_rev: ot.client_rev(),
            markers: self.markers.snapshot(),
        })
    }

    pub fn client_text(&self) -> Option<&str> {
        self.ot.as_ref().map(OtState::client_text)
    }

    pub fn is_awaiting_ack(&self) -> bool {
        self.ot.as_ref().is_some_and(OtState::is_awaiting_ack)
    }

    pub fn is_send_pending(&self) -> bool {
        self.ot.as_ref().is_some_and(OtState::is_send_pending)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn read_only_id(&self) -> Option<&str> {
        self.read_only_id.as_deref()
    }

    /// Our author id, from `CLIENT_VARS`
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Other participants, sorted by user id
    pub fn avatars(&self) -> Vec<Avatar> {
        self.roster.snapshot()
    }
}
