//! Synchronization engine
//!
//! - [`state`]: the server/sent/pending bookkeeping behind every edit
//! - [`session`]: connection lifecycle, inbound dispatch and the editing API
//! - [`transport`]: where outbound messages go
//! - `handle`: async actor around a session (feature `actor`)

pub mod session;
pub mod state;
pub mod transport;

#[cfg(feature = "actor")]
pub mod handle;

pub use session::{ConnectionState, Session, TextState};
pub use state::{OtState, Submission};
pub use transport::Transport;

#[cfg(feature = "actor")]
pub use handle::{SessionCommand, SessionHandle, SessionStatus};
#[cfg(feature = "actor")]
pub use transport::ChannelTransport;
