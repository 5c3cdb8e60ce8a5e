//! Wire protocol: typed messages and their JSON codec
//!
//! The server speaks JSON objects with a top-level `type` (`CLIENT_VARS`,
//! `COLLABROOM`, ...). Collaboration traffic is wrapped in a `COLLABROOM`
//! envelope whose `data.type` names the inner message.

mod messages;
pub mod serialize;

pub use messages::{
    ChatEntry, ClientVars, CollabRoomMessage, ColorRef, InboundMessage, OutboundMessage, UserInfo,
};
pub use serialize::{decode_message, decode_str, encode_message};
