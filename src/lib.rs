//! PadSync Core - collaborative pad client engine
//!
//! Keeps a local copy of a shared plain-text pad in step with an
//! Etherpad-style server using operational transformation. It implements:
//! - Changeset algebra (apply, compose, follow, wire codec)
//! - Position markers that track edits
//! - The client synchronization state machine and its message protocol
//! - Presence tracking for other participants
//!
//! # Examples
//!
//! ```rust
//! use padsync_core::Changeset;
//!
//! let cs: Changeset = "Z:6>1=2+1$X".parse().unwrap();
//! assert_eq!(cs.apply_to_text("hello\n").unwrap(), "heXllo\n");
//!
//! let other = Changeset::simple_edit("hello\n", 4, 1, "").unwrap();
//! let rebased = cs.follow(&other, false).unwrap();
//! assert_eq!(rebased.apply_to_text("heXllo\n").unwrap(), "heXll\n");
//! ```

pub mod awareness;
pub mod changeset;
pub mod config;
pub mod error;
pub mod marker;
pub mod protocol;
pub mod sync;

#[cfg(feature = "logging")]
pub mod logging;

// Re-exports for convenience
pub use changeset::{ApplyError, Changeset, ParseError};
pub use config::SessionConfig;
pub use error::{PadError, Result};
pub use marker::{Marker, MarkerId, MarkerRegistry};
pub use sync::{ConnectionState, Session, TextState, Transport};

#[cfg(feature = "actor")]
pub use sync::SessionHandle;

/// Server revision number of a pad
pub type Revision = u64;
