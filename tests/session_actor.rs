#![cfg(feature = "actor")]

use padsync_core::protocol::{decode_str, OutboundMessage};
use padsync_core::sync::ChannelTransport;
use padsync_core::{ConnectionState, PadError, Session, SessionConfig, SessionHandle};

async fn spawn_ready() -> (
    SessionHandle,
    tokio::sync::mpsc::UnboundedReceiver<OutboundMessage>,
) {
    let (transport, mut outbound) = ChannelTransport::new();
    let session = Session::new(SessionConfig::new("notes"), transport).unwrap();
    let (handle, _task) = SessionHandle::start(session);

    handle.connect().await.unwrap();
    handle.transport_connected().await.unwrap();
    assert!(matches!(
        outbound.recv().await,
        Some(OutboundMessage::ClientReady { .. })
    ));

    let vars = r#"{"type":"CLIENT_VARS","data":{"collab_client_vars":{"rev":0,"initialAttributedText":{"text":"\n"}},"userId":"a.me"}}"#;
    handle.deliver(decode_str(vars).unwrap()).await.unwrap();
    assert!(handle.update(false, true).await.unwrap());

    (handle, outbound)
}

#[tokio::test]
async fn test_edit_commit_accept() {
    let (handle, mut outbound) = spawn_ready().await;

    handle.append_text("hi").await.unwrap();
    handle.update(true, false).await.unwrap();

    match outbound.recv().await {
        Some(OutboundMessage::UserChanges {
            base_rev,
            changeset,
        }) => {
            assert_eq!(base_rev, 0);
            assert_eq!(changeset, "Z:1>2+2$hi");
        }
        other => panic!("unexpected {:?}", other),
    }

    let status = handle.status().await.unwrap();
    assert!(status.awaiting_ack);
    assert_eq!(status.user_id.as_deref(), Some("a.me"));

    let accept = r#"{"type":"COLLABROOM","data":{"type":"ACCEPT_COMMIT","newRev":1}}"#;
    handle.deliver(decode_str(accept).unwrap()).await.unwrap();
    handle.update(false, true).await.unwrap();

    let state = handle.snapshot().await.unwrap().unwrap();
    assert_eq!(state.server_text, "hi\n");
    assert_eq!(state.client_rev, Some(1));
}

#[tokio::test]
async fn test_markers_through_handle() {
    let (handle, _outbound) = spawn_ready().await;

    let (start, end) = handle.append_text_and_mark("draft").await.unwrap();
    handle
        .replace_between_markers(start, end, "final")
        .await
        .unwrap();
    handle.insert_at_marker(end, "!", true).await.unwrap();

    let state = handle.snapshot().await.unwrap().unwrap();
    assert_eq!(state.client_text, "final!\n");
    assert_eq!(handle.marker(end).await.unwrap().pos, 5);
}

#[tokio::test]
async fn test_disconnect_requeues_and_clones_share_session() {
    let (handle, mut outbound) = spawn_ready().await;
    let other = handle.clone();

    other.prepend_text("x").await.unwrap();
    other.update(true, false).await.unwrap();
    assert!(outbound.recv().await.is_some());

    handle.transport_disconnected().await.unwrap();
    let status = handle.status().await.unwrap();
    assert_eq!(status.connection, ConnectionState::Disconnected);
    assert!(!status.awaiting_ack);
    assert!(status.send_pending);

    let err = handle.broadcast_cursor(0, 0).await.unwrap_err();
    assert!(matches!(err, PadError::NotReady { .. }));

    handle.shutdown().await.unwrap();
}
