//! Session scenarios driven through the JSON wire format

use padsync_core::protocol::{decode_str, encode_message, OutboundMessage};
use padsync_core::{ConnectionState, PadError, Session, SessionConfig};
use serde_json::json;

type TestSession = Session<Vec<OutboundMessage>>;

fn ready(text: &str, rev: u64) -> TestSession {
    let mut session = Session::new(SessionConfig::new("notes"), Vec::new()).unwrap();
    session.connect().unwrap();
    session.transport_connected();

    let vars = json!({
        "type": "CLIENT_VARS",
        "data": {
            "collab_client_vars": {
                "rev": rev,
                "initialAttributedText": { "text": text, "attribs": "|1+1" }
            },
            "userId": "a.me",
            "readonly": false,
            "colorPalette": ["#ffc7c7", "#fff1c7"]
        }
    });
    session.deliver(decode_str(&vars.to_string()).unwrap());
    assert!(session.update(false, true).unwrap());
    assert_eq!(session.connection_state(), ConnectionState::Ready);
    session
}

fn collab(data: serde_json::Value) -> String {
    json!({ "type": "COLLABROOM", "data": data }).to_string()
}

fn new_changes(rev: u64, changeset: &str, author: &str) -> String {
    collab(json!({
        "type": "NEW_CHANGES",
        "newRev": rev,
        "changeset": changeset,
        "author": author,
        "currentTime": 1_700_000_000_000i64
    }))
}

fn accept(rev: u64) -> String {
    collab(json!({ "type": "ACCEPT_COMMIT", "newRev": rev }))
}

#[test]
fn test_handshake_sends_client_ready() {
    let session = ready("\n", 0);
    let sent = session.transport();
    assert_eq!(sent.len(), 1);

    let wire = encode_message(&sent[0]);
    assert_eq!(wire["type"], "CLIENT_READY");
    assert_eq!(wire["padId"], "notes");
    assert_eq!(wire["protocolVersion"], 2);
    assert!(wire["token"].as_str().unwrap().starts_with("t."));
}

#[test]
fn test_local_edit_round_trip() {
    let mut s = ready("\n", 0);

    s.make_simple_change(0, 0, "hi").unwrap();
    assert!(s.is_send_pending());
    assert!(!s.update(true, false).unwrap());
    assert!(s.is_awaiting_ack());

    let wire = encode_message(s.transport().last().unwrap());
    assert_eq!(wire["data"]["type"], "USER_CHANGES");
    assert_eq!(wire["data"]["baseRev"], 0);
    assert_eq!(wire["data"]["changeset"], "Z:1>2+2$hi");

    s.deliver(decode_str(&accept(1)).unwrap());
    s.update(false, true).unwrap();

    let state = s.snapshot().unwrap();
    assert_eq!(state.server_text, "hi\n");
    assert_eq!(state.server_rev, 1);
    assert_eq!(state.client_rev, Some(1));
    assert!(!s.is_awaiting_ack());
}

#[test]
fn test_tied_insert_with_edit_in_flight() {
    let mut s = ready("ab\n", 3);
    s.make_simple_change(1, 0, "X").unwrap();
    s.update(true, false).unwrap();

    // The server committed Y at the same spot first
    s.deliver(decode_str(&new_changes(4, "Z:3>1=1+1$Y", "a.bob")).unwrap());
    assert!(s.update(false, true).unwrap());
    assert_eq!(s.client_text(), Some("aYXb\n"));

    s.deliver(decode_str(&accept(5)).unwrap());
    s.update(false, true).unwrap();
    let state = s.snapshot().unwrap();
    assert_eq!(state.server_text, "aYXb\n");
    assert_eq!(state.client_rev, Some(5));
}

#[test]
fn test_malformed_changeset_leaves_state_alone() {
    let mut s = ready("abc\n", 2);
    s.make_simple_change(3, 0, "d").unwrap();
    let before = s.snapshot().unwrap();

    let err = decode_str(&new_changes(3, "Z:4>1=9+1$X", "a.bob")).unwrap_err();
    assert!(matches!(err, PadError::Parse(_)));

    // An inconsistent changeset that does parse is fatal in the session
    s.deliver(decode_str(&new_changes(3, "Z:5>1=1+1$X", "a.bob")).unwrap());
    assert!(s.update(false, true).is_err());
    assert_eq!(s.connection_state(), ConnectionState::Disconnected);
    assert!(s.needs_resync());
    assert_eq!(s.snapshot().unwrap().client_text, before.client_text);
}

#[test]
fn test_revision_gap_is_fatal() {
    let mut s = ready("ab\n", 3);
    s.deliver(decode_str(&new_changes(7, "Z:3>1=1+1$Y", "a.bob")).unwrap());

    let err = s.update(false, true).unwrap_err();
    assert!(matches!(err, PadError::Protocol(_)));
    assert_eq!(s.client_text(), Some("ab\n"));

    // A fresh CLIENT_VARS brings the session back
    s.connect().unwrap();
    s.transport_connected();
    let vars = json!({
        "type": "CLIENT_VARS",
        "data": { "collab_client_vars": { "rev": 9, "initialAttributedText": { "text": "fresh\n" } } }
    });
    s.deliver(decode_str(&vars.to_string()).unwrap());
    assert!(s.update(false, true).unwrap());
    assert_eq!(s.client_text(), Some("fresh\n"));
    assert!(!s.needs_resync());
}

#[test]
fn test_markers_follow_remote_edits() {
    let mut s = ready("hello world\n", 0);
    let start = s.register_marker(6, true).unwrap();
    let end = s.register_marker(10, false).unwrap();

    s.deliver(decode_str(&new_changes(1, "Z:c>4+4$>>> ", "a.bob")).unwrap());
    s.update(false, true).unwrap();
    assert_eq!(s.client_text(), Some(">>> hello world\n"));
    assert_eq!(s.marker(start).unwrap().pos, 10);
    assert_eq!(s.marker(end).unwrap().pos, 14);

    s.replace_between_markers(start, end, "there").unwrap();
    assert_eq!(s.client_text(), Some(">>> hello there\n"));
    assert!(s.marker(start).unwrap().valid);
    assert_eq!(s.marker(end).unwrap().pos, 14);
}

#[test]
fn test_cursor_chat_moves_avatar() {
    let mut s = ready("hello\n", 0);
    s.deliver(
        decode_str(&collab(json!({
            "type": "USER_NEWINFO",
            "userInfo": { "userId": "a.bob", "name": "Bob", "colorId": 0 }
        })))
        .unwrap(),
    );
    s.deliver(
        decode_str(&collab(json!({
            "type": "CHAT_MESSAGE",
            "text": "!cursor!2-4",
            "userId": "a.bob",
            "time": 1_700_000_000_000i64
        })))
        .unwrap(),
    );
    s.update(false, true).unwrap();

    let bob = s.avatars().into_iter().find(|a| a.user_id == "a.bob").unwrap();
    assert_eq!(bob.name.as_deref(), Some("Bob"));
    assert_eq!(bob.color.as_deref(), Some("#ffc7c7"));
    assert_eq!((bob.start, bob.end), (2, 4));

    s.broadcast_cursor(1, 1).unwrap();
    let wire = encode_message(s.transport().last().unwrap());
    assert_eq!(wire["data"]["text"], "!cursor!1");
}

#[test]
fn test_accept_without_revision_is_fatal() {
    let mut s = ready("ab\n", 0);
    s.make_simple_change(0, 0, "x").unwrap();
    s.update(true, false).unwrap();

    let msg = decode_str(&collab(json!({ "type": "ACCEPT_COMMIT" }))).unwrap();
    s.deliver(msg);
    assert!(matches!(s.update(false, true), Err(PadError::Protocol(_))));
    assert_eq!(s.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn test_client_vars_at_max_revision() {
    let mut s = ready("ab\n", u64::MAX);
    s.deliver(decode_str(&new_changes(0, "Z:3>1=1+1$Y", "a.bob")).unwrap());

    assert!(matches!(s.update(false, true), Err(PadError::Protocol(_))));
    assert_eq!(s.client_text(), Some("ab\n"));
}
