//! Async front for a [`Session`] owned by a single tokio task
//!
//! Every method of [`SessionHandle`] packages a [`SessionCommand`], pushes it
//! onto the actor's channel and, where there is an answer, awaits it on a
//! oneshot channel. Commands are applied one at a time in the order they were
//! sent, so the session itself never needs a lock.
//!
//! ```text
//! ┌───────────────┐   SessionCommand   ┌──────────────────┐
//! │ SessionHandle │ ─────────────────► │ actor task       │
//! │ (cloneable)   │ ◄───────────────── │ owns Session<T>  │
//! └───────────────┘   oneshot reply    └──────────────────┘
//! ```

use super::session::{ConnectionState, Session, TextState};
use super::transport::Transport;
use crate::awareness::Avatar;
use crate::changeset::Changeset;
use crate::error::{PadError, Result};
use crate::marker::{Marker, MarkerId};
use crate::protocol::InboundMessage;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

type Reply<T> = oneshot::Sender<T>;

/// Status flags of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub connection: ConnectionState,
    pub awaiting_ack: bool,
    pub send_pending: bool,
    pub read_only: bool,
    pub read_only_id: Option<String>,
    pub user_id: Option<String>,
    pub needs_resync: bool,
}

/// Commands sent to the session actor
#[derive(Debug)]
pub enum SessionCommand {
    Connect(Reply<Result<()>>),
    TransportConnected,
    TransportDisconnected,
    Deliver(InboundMessage),
    Update {
        is_sending: bool,
        is_receiving: bool,
        reply: Reply<Result<bool>>,
    },
    MakeChange {
        changeset: Changeset,
        reply: Reply<Result<()>>,
    },
    MakeSimpleChange {
        pos: usize,
        removed: usize,
        text: String,
        reply: Reply<Result<()>>,
    },
    PrependText {
        text: String,
        reply: Reply<Result<()>>,
    },
    PrependTextAndMark {
        text: String,
        reply: Reply<Result<(MarkerId, MarkerId)>>,
    },
    AppendText {
        text: String,
        reply: Reply<Result<()>>,
    },
    AppendTextAndMark {
        text: String,
        reply: Reply<Result<(MarkerId, MarkerId)>>,
    },
    RegisterMarker {
        pos: usize,
        before: bool,
        reply: Reply<Result<MarkerId>>,
    },
    ReregisterMarker {
        id: MarkerId,
        pos: usize,
        before: bool,
        reply: Reply<Result<()>>,
    },
    GetMarker {
        id: MarkerId,
        reply: Reply<Result<Marker>>,
    },
    InsertAtMarker {
        id: MarkerId,
        text: String,
        follow: bool,
        reply: Reply<Result<()>>,
    },
    ReplaceBetweenMarkers {
        start: MarkerId,
        end: MarkerId,
        text: String,
        reply: Reply<Result<()>>,
    },
    BroadcastCursor {
        start: usize,
        end: usize,
        reply: Reply<Result<()>>,
    },
    Snapshot(Reply<Option<TextState>>),
    Status(Reply<SessionStatus>),
    Avatars(Reply<Vec<Avatar>>),
    Shutdown,
}

/// Cloneable handle to a session running on its own task
#[derive(Debug, Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Moves `session` onto a new task
    ///
    /// `buffer` bounds the number of commands waiting for the task. Must be
    /// called inside a tokio runtime.
    pub fn spawn<T>(session: Session<T>, buffer: usize) -> (Self, JoinHandle<()>)
    where
        T: Transport + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel(buffer.max(1));
        let task = tokio::spawn(run(session, command_rx));
        (Self { command_tx }, task)
    }

    /// Like [`SessionHandle::spawn`], sized by the session's `command_buffer`
    pub fn start<T>(session: Session<T>) -> (Self, JoinHandle<()>)
    where
        T: Transport + 'static,
    {
        let buffer = session.config().command_buffer;
        Self::spawn(session, buffer)
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| PadError::SessionClosed)
    }

    async fn request<R>(&self, command: impl FnOnce(Reply<R>) -> SessionCommand) -> Result<R> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| PadError::SessionClosed)
    }

    pub async fn connect(&self) -> Result<()> {
        self.request(SessionCommand::Connect).await?
    }

    pub async fn transport_connected(&self) -> Result<()> {
        self.send(SessionCommand::TransportConnected).await
    }

    pub async fn transport_disconnected(&self) -> Result<()> {
        self.send(SessionCommand::TransportDisconnected).await
    }

    /// Queues a server message; it takes effect on the next receiving update
    pub async fn deliver(&self, message: InboundMessage) -> Result<()> {
        self.send(SessionCommand::Deliver(message)).await
    }

    pub async fn update(&self, is_sending: bool, is_receiving: bool) -> Result<bool> {
        self.request(|reply| SessionCommand::Update {
            is_sending,
            is_receiving,
            reply,
        })
        .await?
    }

    pub async fn make_change(&self, changeset: Changeset) -> Result<()> {
        self.request(|reply| SessionCommand::MakeChange { changeset, reply })
            .await?
    }

    pub async fn make_simple_change(
        &self,
        pos: usize,
        removed: usize,
        text: impl Into<String>,
    ) -> Result<()> {
        let text = text.into();
        self.request(|reply| SessionCommand::MakeSimpleChange {
            pos,
            removed,
            text,
            reply,
        })
        .await?
    }

    pub async fn prepend_text(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.request(|reply| SessionCommand::PrependText { text, reply })
            .await?
    }

    pub async fn prepend_text_and_mark(
        &self,
        text: impl Into<String>,
    ) -> Result<(MarkerId, MarkerId)> {
        let text = text.into();
        self.request(|reply| SessionCommand::PrependTextAndMark { text, reply })
            .await?
    }

    pub async fn append_text(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.request(|reply| SessionCommand::AppendText { text, reply })
            .await?
    }

    pub async fn append_text_and_mark(
        &self,
        text: impl Into<String>,
    ) -> Result<(MarkerId, MarkerId)> {
        let text = text.into();
        self.request(|reply| SessionCommand::AppendTextAndMark { text, reply })
            .await?
    }

    pub async fn register_marker(&self, pos: usize, before: bool) -> Result<MarkerId> {
        self.request(|reply| SessionCommand::RegisterMarker { pos, before, reply })
            .await?
    }

    pub async fn reregister_marker(&self, id: MarkerId, pos: usize, before: bool) -> Result<()> {
        self.request(|reply| SessionCommand::ReregisterMarker {
            id,
            pos,
            before,
            reply,
        })
        .await?
    }

    pub async fn marker(&self, id: MarkerId) -> Result<Marker> {
        self.request(|reply| SessionCommand::GetMarker { id, reply })
            .await?
    }

    pub async fn insert_at_marker(
        &self,
        id: MarkerId,
        text: impl Into<String>,
        follow: bool,
    ) -> Result<()> {
        let text = text.into();
        self.request(|reply| SessionCommand::InsertAtMarker {
            id,
            text,
            follow,
            reply,
        })
        .await?
    }

    pub async fn replace_between_markers(
        &self,
        start: MarkerId,
        end: MarkerId,
        text: impl Into<String>,
    ) -> Result<()> {
        let text = text.into();
        self.request(|reply| SessionCommand::ReplaceBetweenMarkers {
            start,
            end,
            text,
            reply,
        })
        .await?
    }

    pub async fn broadcast_cursor(&self, start: usize, end: usize) -> Result<()> {
        self.request(|reply| SessionCommand::BroadcastCursor { start, end, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<Option<TextState>> {
        self.request(SessionCommand::Snapshot).await
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        self.request(SessionCommand::Status).await
    }

    pub async fn avatars(&self) -> Result<Vec<Avatar>> {
        self.request(SessionCommand::Avatars).await
    }

    /// Stops the actor; pending commands sent before this are still handled
    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown).await
    }
}

async fn run<T: Transport>(mut session: Session<T>, mut commands: mpsc::Receiver<SessionCommand>) {
    info!(pad_id = %session.config().pad_id, "session actor started");

    while let Some(command) = commands.recv().await {
        // A dropped reply receiver only means the caller stopped waiting
        match command {
            SessionCommand::Connect(reply) => {
                let _ = reply.send(session.connect());
            }
            SessionCommand::TransportConnected => session.transport_connected(),
            SessionCommand::TransportDisconnected => session.transport_disconnected(),
            SessionCommand::Deliver(message) => session.deliver(message),
            SessionCommand::Update {
                is_sending,
                is_receiving,
                reply,
            } => {
                let _ = reply.send(session.update(is_sending, is_receiving));
            }
            SessionCommand::MakeChange { changeset, reply } => {
                let _ = reply.send(session.make_change(&changeset));
            }
            SessionCommand::MakeSimpleChange {
                pos,
                removed,
                text,
                reply,
            } => {
                let _ = reply.send(session.make_simple_change(pos, removed, &text));
            }
            SessionCommand::PrependText { text, reply } => {
                let _ = reply.send(session.prepend_text(&text));
            }
            SessionCommand::PrependTextAndMark { text, reply } => {
                let _ = reply.send(session.prepend_text_and_mark(&text));
            }
            SessionCommand::AppendText { text, reply } => {
                let _ = reply.send(session.append_text(&text));
            }
            SessionCommand::AppendTextAndMark { text, reply } => {
                let _ = reply.send(session.append_text_and_mark(&text));
            }
            SessionCommand::RegisterMarker { pos, before, reply } => {
                let _ = reply.send(session.register_marker(pos, before));
            }
            SessionCommand::ReregisterMarker {
                id,
                pos,
                before,
                reply,
            } => {
                let _ = reply.send(session.reregister_marker(id, pos, before));
            }
            SessionCommand::GetMarker { id, reply } => {
                let _ = reply.send(session.marker(id));
            }
            SessionCommand::InsertAtMarker {
                id,
                text,
                follow,
                reply,
            } => {
                let _ = reply.send(session.insert_at_marker(id, &text, follow));
            }
            SessionCommand::ReplaceBetweenMarkers {
                start,
                end,
                text,
                reply,
            } => {
                let _ = reply.send(session.replace_between_markers(start, end, &text));
            }
            SessionCommand::BroadcastCursor { start, end, reply } => {
                let _ = reply.send(session.broadcast_cursor(start, end));
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(session.snapshot());
            }
            SessionCommand::Status(reply) => {
                let _ = reply.send(SessionStatus {
                    connection: session.connection_state(),
                    awaiting_ack: session.is_awaiting_ack(),
                    send_pending: session.is_send_pending(),
                    read_only: session.is_read_only(),
                    read_only_id: session.read_only_id().map(str::to_string),
                    user_id: session.user_id().map(str::to_string),
                    needs_resync: session.needs_resync(),
                });
            }
            SessionCommand::Avatars(reply) => {
                let _ = reply.send(session.avatars());
            }
            SessionCommand::Shutdown => break,
        }
    }

    session.transport_disconnected();
    debug!(pad_id = %session.config().pad_id, "session actor stopped");
}
