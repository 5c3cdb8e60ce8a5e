// Serialization layer - Convert protocol messages to/from JSON
//!
//! Inbound JSON is first read into loose serde shapes, then checked and
//! turned into the closed message enums. Changesets are parsed here, so a
//! malformed changeset rejects the message before the session sees it.

use super::messages::*;
use crate::changeset::Changeset;
use crate::error::{PadError, Result};
use crate::Revision;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClientVars {
    #[serde(rename = "collab_client_vars")]
    collab: Option<RawCollabVars>,
    #[serde(flatten)]
    inline: RawCollabVars,
    user_id: Option<String>,
    #[serde(default)]
    readonly: bool,
    read_only_id: Option<String>,
    server_timestamp: Option<i64>,
    #[serde(default)]
    color_palette: Vec<String>,
    #[serde(default)]
    chat_history: Vec<ChatEntry>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawCollabVars {
    rev: Option<Revision>,
    initial_attributed_text: Option<RawAttributedText>,
}

#[derive(Deserialize)]
struct RawAttributedText {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNewChanges {
    new_rev: Revision,
    changeset: String,
    author: Option<String>,
    current_time: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAcceptCommit {
    new_rev: Revision,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUserChanges {
    base_rev: Revision,
    changeset: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUserInfoEnvelope {
    user_info: RawUserInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUserInfo {
    user_id: String,
    name: Option<String>,
    color_id: Option<ColorRef>,
}

fn malformed(what: &str, e: impl std::fmt::Display) -> PadError {
    PadError::Malformed(format!("{}: {}", what, e))
}

fn field<T: serde::de::DeserializeOwned>(value: &Value, what: &str) -> Result<T> {
    T::deserialize(value).map_err(|e| malformed(what, e))
}

fn parse_changeset(s: &str) -> Result<Changeset> {
    Ok(s.parse::<Changeset>()?)
}

/// Decode a server message
///
/// # Errors
///
/// `PadError::Malformed` if the envelope or `CLIENT_VARS` is missing
/// required fields; a `COLLABROOM` message of a known type with bad fields
/// decodes to [`CollabRoomMessage::Malformed`] instead.
/// `PadError::Parse` if an embedded changeset is malformed. Unknown message
/// types are not errors: they decode to an `Unrecognized` variant.
pub fn decode_message(value: &Value) -> Result<InboundMessage> {
    let obj = value
        .as_object()
        .ok_or_else(|| PadError::Malformed("message is not a JSON object".to_string()))?;

    if let Some(cause) = obj.get("disconnect") {
        let cause = cause.as_str().unwrap_or("UNKNOWN").to_string();
        return Ok(InboundMessage::Disconnect { cause });
    }

    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| PadError::Malformed("message has no type".to_string()))?;

    let data = obj.get("data").unwrap_or(&Value::Null);

    match kind {
        "CLIENT_VARS" => decode_client_vars(data).map(InboundMessage::ClientVars),
        "COLLABROOM" => decode_collab_room(data).map(InboundMessage::CollabRoom),
        other => Ok(InboundMessage::Unrecognized {
            kind: other.to_string(),
        }),
    }
}

/// Decode a server message from its JSON text
pub fn decode_str(text: &str) -> Result<InboundMessage> {
    let value: Value = serde_json::from_str(text).map_err(|e| malformed("invalid JSON", e))?;
    decode_message(&value)
}

fn decode_client_vars(data: &Value) -> Result<ClientVars> {
    let raw: RawClientVars = field(data, "CLIENT_VARS")?;
    let vars = raw.collab.unwrap_or(raw.inline);

    let rev = vars
        .rev
        .ok_or_else(|| PadError::Malformed("CLIENT_VARS has no rev".to_string()))?;
    let text = vars
        .initial_attributed_text
        .map(|t| t.text)
        .ok_or_else(|| PadError::Malformed("CLIENT_VARS has no initialAttributedText".to_string()))?;

    Ok(ClientVars {
        rev,
        text,
        user_id: raw.user_id,
        read_only: raw.readonly,
        read_only_id: raw.read_only_id,
        server_timestamp: raw.server_timestamp,
        color_palette: raw.color_palette,
        chat_history: raw.chat_history,
    })
}

fn decode_collab_room(data: &Value) -> Result<CollabRoomMessage> {
    let kind = data
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| PadError::Malformed("COLLABROOM data has no type".to_string()))?;

    // Shape errors of a known type reach the session, which decides if they are fatal
    match decode_collab_fields(kind, data) {
        Err(PadError::Malformed(reason)) => Ok(CollabRoomMessage::Malformed {
            kind: kind.to_string(),
            reason,
        }),
        decoded => decoded,
    }
}

fn decode_collab_fields(kind: &str, data: &Value) -> Result<CollabRoomMessage> {
    match kind {
        "NEW_CHANGES" => {
            let raw: RawNewChanges = field(data, "NEW_CHANGES")?;
            Ok(CollabRoomMessage::NewChanges {
                new_rev: raw.new_rev,
                changeset: parse_changeset(&raw.changeset)?,
                author: raw.author,
                current_time: raw.current_time,
            })
        }
        "ACCEPT_COMMIT" => {
            let raw: RawAcceptCommit = field(data, "ACCEPT_COMMIT")?;
            Ok(CollabRoomMessage::AcceptCommit {
                new_rev: raw.new_rev,
            })
        }
        "USER_CHANGES" => {
            let raw: RawUserChanges = field(data, "USER_CHANGES")?;
            Ok(CollabRoomMessage::UserChanges {
                base_rev: raw.base_rev,
                changeset: parse_changeset(&raw.changeset)?,
            })
        }
        "USER_NEWINFO" => {
            let raw: RawUserInfoEnvelope = field(data, "USER_NEWINFO")?;
            Ok(CollabRoomMessage::UserNewInfo(UserInfo {
                user_id: raw.user_info.user_id,
                name: raw.user_info.name,
                color: raw.user_info.color_id,
            }))
        }
        "USER_LEAVE" => {
            let raw: RawUserInfoEnvelope = field(data, "USER_LEAVE")?;
            Ok(CollabRoomMessage::UserLeave {
                user_id: raw.user_info.user_id,
            })
        }
        "CHAT_MESSAGE" => field(data, "CHAT_MESSAGE").map(CollabRoomMessage::ChatMessage),
        other => Ok(CollabRoomMessage::Unrecognized {
            kind: other.to_string(),
        }),
    }
}

/// Encode a client message as JSON
pub fn encode_message(msg: &OutboundMessage) -> Value {
    match msg {
        OutboundMessage::ClientReady {
            pad_id,
            token,
            protocol_version,
        } => json!({
            "component": "pad",
            "type": "CLIENT_READY",
            "padId": pad_id,
            "sessionID": null,
            "token": token,
            "password": null,
            "protocolVersion": protocol_version,
        }),
        OutboundMessage::UserChanges {
            base_rev,
            changeset,
        } => json!({
            "component": "pad",
            "type": "COLLABROOM",
            "data": {
                "type": "USER_CHANGES",
                "baseRev": base_rev,
                "changeset": changeset,
                "apool": { "numToAttrib": {}, "nextNum": 0 },
            },
        }),
        OutboundMessage::ChatMessage { text } => json!({
            "component": "pad",
            "type": "COLLABROOM",
            "data": {
                "type": "CHAT_MESSAGE",
                "text": text,
            },
        }),
    }
}
