//! Client endpoint rules, driven through a recording transport.

mod common;

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tablesync_bus::ChannelBus;
use tablesync_protocol::{
    Addressed, ChannelName, ChatMessage, ClientId, Envelope, Json, Recipient, SessionInfo, Vec2,
    channels,
};
use tablesync_replication::{Endpoint, PendingEndpoint, ReplicationError, RoleKind};

use common::{RecordingTransport, arrive, client, envelope};

#[test]
fn test_join_accept_records_session() {
    let (mut me, bus) = client(42);
    assert!(!me.is_joined());
    assert!(me.session().is_none());

    arrive(&bus, channels::JOIN_ACCEPT, envelope(77, 0, "friday game"));
    me.update();

    assert!(me.is_joined());
    assert_eq!(
        me.session(),
        Some(&SessionInfo {
            session_id: 77,
            session_name: "friday game".to_string()
        })
    );
    assert_eq!(me.role_kind(), RoleKind::Client);
    assert_eq!(me.local_id(), ClientId(42));
}

#[test]
fn test_roster_view_follows_add_and_delete() {
    let (mut me, bus) = client(42);
    arrive(&bus, channels::CLIENT_ADD, envelope(0, 0, "gm"));
    arrive(&bus, channels::CLIENT_ADD, envelope(42, 0, "me"));
    arrive(&bus, channels::CLIENT_ADD, envelope(7, 0, "alice"));
    me.update();

    let ids: Vec<u64> = me.connected_clients().iter().map(|c| c.client_id.0).collect();
    assert_eq!(ids, vec![0, 7, 42]);

    arrive(&bus, channels::CLIENT_DELETE, envelope(7, 0, Bytes::new()));
    me.update();

    let names: Vec<String> = me.connected_clients().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["gm", "me"]);
}

#[test]
fn test_host_loss_clears_roster_and_joined() {
    let (mut me, bus) = client(42);
    arrive(&bus, channels::JOIN_ACCEPT, envelope(77, 0, "s"));
    arrive(&bus, channels::CLIENT_ADD, envelope(0, 0, "gm"));
    me.update();

    arrive(&bus, channels::DISCONNECT, envelope(0, 0, Bytes::new()));
    me.update();

    assert!(!me.is_joined());
    assert!(me.connected_clients().is_empty());
}

#[test]
fn test_peer_disconnect_notice_is_ignored() {
    let (mut me, bus) = client(42);
    arrive(&bus, channels::JOIN_ACCEPT, envelope(77, 0, "s"));
    me.update();

    arrive(&bus, channels::DISCONNECT, envelope(9, 9, Bytes::new()));
    me.update();

    assert!(me.is_joined());
}

#[test]
fn test_image_request_answered_only_from_cache() {
    let (mut me, bus) = client(42);
    let ask = |id: u64| envelope(id, 0, Bytes::copy_from_slice(&id.to_le_bytes()));

    arrive(&bus, channels::IMAGE_REQUEST, ask(5));
    me.update();
    assert!(me.transport().take_sent().is_empty());

    arrive(&bus, channels::NEW_IMAGE, envelope(5, 0, Bytes::from_static(b"png")));
    me.update();
    arrive(&bus, channels::IMAGE_REQUEST, ask(5));
    me.update();

    let sent = me.transport().take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, channels::NEW_IMAGE);
    assert_eq!(sent[0].recipient, Recipient::Client(ClientId::HOST));
    assert_eq!(sent[0].envelope.sender_client_id, ClientId(42));
    assert_eq!(sent[0].envelope.payload.as_ref(), b"png");
}

#[test]
fn test_request_image_asks_host_then_returns_cached() {
    let (mut me, bus) = client(42);

    assert!(me.request_image(5).is_none());
    me.update();
    let sent = me.transport().take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, channels::IMAGE_REQUEST);
    assert_eq!(sent[0].envelope.entity_id, 5);
    assert_eq!(sent[0].envelope.payload.as_ref(), &5u64.to_le_bytes());

    arrive(&bus, channels::NEW_IMAGE, envelope(5, 0, Bytes::from_static(b"png")));
    me.update();
    assert_eq!(me.request_image(5), Some(Bytes::from_static(b"png")));
    assert!(me.pending_image_requests().is_empty());
}

#[test]
fn test_upload_image_caches_and_sends_to_host() {
    let (mut me, _bus) = client(42);
    me.upload_image(3, Bytes::from_static(b"bmp"));
    me.update();

    assert_eq!(me.image(3), Some(Bytes::from_static(b"bmp")));
    let sent = me.transport().take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, channels::NEW_IMAGE);
    assert_eq!(sent[0].envelope.entity_id, 3);
}

#[test]
fn test_player_view_is_host_only() {
    let (mut me, _bus) = client(42);
    let err = me
        .publish(channels::PLAYER_VIEW, 1, &(), Recipient::All)
        .unwrap_err();
    assert!(matches!(err, ReplicationError::HostOnly(_)));
    me.update();
    assert!(me.transport().take_sent().is_empty());
}

#[test]
fn test_leave_announces_own_id() {
    let (mut me, _bus) = client(42);
    me.leave().unwrap();
    me.update();

    let sent = me.transport().take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, channels::LEAVE);
    assert_eq!(sent[0].envelope.entity_id, 42);
    assert_eq!(sent[0].envelope.sender_client_id, ClientId(42));
}

#[test]
fn test_chat_callback_decodes_json_records() {
    let (mut me, bus) = client(42);
    let lines = Arc::new(Mutex::new(Vec::new()));
    {
        let lines = Arc::clone(&lines);
        me.register_callback(channels::CHAT_MSG, move |m: Addressed<Json<ChatMessage>>| {
            lines.lock().push(m.payload.0);
        });
    }

    let message = ChatMessage {
        timestamp_ms: 1_700_000_000_000,
        author: "alice".to_string(),
        text: "rolling initiative".to_string(),
    };
    let change = Envelope::with_payload(0, ClientId(7), &Json(message.clone()))
        .unwrap();
    arrive(&bus, channels::CHAT_MSG, change);
    arrive(&bus, channels::CHAT_MSG, envelope(0, 7, "not json"));

    let report = me.update();

    assert_eq!(*lines.lock(), vec![message]);
    assert_eq!(report.rejected.len(), 1);
}

#[test]
fn test_publish_stamps_own_id() {
    let (mut me, _bus) = client(42);
    me.publish(channels::MOVE_PIECE, 7, &Vec2::new(1.0, 1.0), Recipient::All)
        .unwrap();
    me.update();

    let sent = me.transport().take_sent();
    assert_eq!(sent[0].envelope.sender_client_id, ClientId(42));
    assert_eq!(sent[0].envelope.entity_id, 7);
}

#[test]
fn test_rules_listen_before_transport_starts() {
    let bus = Arc::new(ChannelBus::new());
    let accept = ChannelName::new(channels::JOIN_ACCEPT);

    let me = Endpoint::client_with(Arc::clone(&bus), |bus| {
        // The host's answer lands while the transport is still starting.
        assert_eq!(bus.subscriber_count(&accept), 1);
        arrive(&bus, channels::JOIN_ACCEPT, envelope(77, 0, "early"));
        Ok::<_, ReplicationError>(RecordingTransport::new(ClientId(42), &[0]))
    });
    let mut me = me.unwrap();
    me.update();

    assert!(me.is_joined());
}

#[test]
fn test_failed_start_and_drop_leave_no_subscriptions() {
    let bus = Arc::new(ChannelBus::new());
    let accept = ChannelName::new(channels::JOIN_ACCEPT);

    let failed = Endpoint::<RecordingTransport>::client_with(
        Arc::clone(&bus),
        |_| Err("refused"),
    );
    assert!(failed.is_err());
    assert_eq!(bus.subscriber_count(&accept), 0);

    let me = Endpoint::client(
        RecordingTransport::new(ClientId(42), &[0]),
        Arc::clone(&bus),
    );
    assert_eq!(bus.subscriber_count(&accept), 1);
    drop(me);
    assert_eq!(bus.subscriber_count(&accept), 0);
}

#[test]
fn test_pending_callbacks_receive_items_sent_during_start() {
    let bus = Arc::new(ChannelBus::new());
    let pieces = Arc::new(Mutex::new(Vec::new()));

    let mut pending = PendingEndpoint::client(Arc::clone(&bus));
    {
        let pieces = Arc::clone(&pieces);
        pending.register_callback(channels::ADD_PIECE, move |m: Addressed<Bytes>| {
            pieces.lock().push(m.entity_id);
        });
    }
    let mut me = pending
        .start(|bus| {
            // The host answers JOIN with a snapshot before connect returns.
            arrive(&bus, channels::JOIN_ACCEPT, envelope(77, 0, "s"));
            arrive(&bus, channels::ADD_PIECE, envelope(7, 0, "piece"));
            Ok::<_, ReplicationError>(RecordingTransport::new(ClientId(42), &[0]))
        })
        .unwrap();

    let report = me.update();

    assert!(me.is_joined());
    assert_eq!(*pieces.lock(), vec![7]);
    assert_eq!(report.delivered, 2);
}

#[test]
fn test_pending_dropped_or_failed_leaves_no_subscriptions() {
    let bus = Arc::new(ChannelBus::new());
    let pieces = ChannelName::new(channels::ADD_PIECE);
    let accept = ChannelName::new(channels::JOIN_ACCEPT);

    let mut pending = PendingEndpoint::client(Arc::clone(&bus));
    pending.register_callback(channels::ADD_PIECE, |_: Addressed<Bytes>| {});
    assert_eq!(bus.subscriber_count(&pieces), 1);
    drop(pending);
    assert_eq!(bus.subscriber_count(&pieces), 0);
    assert_eq!(bus.subscriber_count(&accept), 0);

    let mut pending = PendingEndpoint::client(Arc::clone(&bus));
    pending.register_callback(channels::ADD_PIECE, |_: Addressed<Bytes>| {});
    let failed = pending.start(|_| Err::<RecordingTransport, _>("refused"));
    assert!(failed.is_err());
    assert_eq!(bus.subscriber_count(&pieces), 0);
    assert_eq!(bus.subscriber_count(&accept), 0);
}

#[test]
fn test_started_endpoint_keeps_pending_callbacks() {
    let bus = Arc::new(ChannelBus::new());
    let pieces = ChannelName::new(channels::ADD_PIECE);

    let mut pending = PendingEndpoint::client(Arc::clone(&bus));
    let id = pending.register_callback(channels::ADD_PIECE, |_: Addressed<Bytes>| {});
    let mut me = pending.attach(RecordingTransport::new(ClientId(42), &[0]));
    assert_eq!(bus.subscriber_count(&pieces), 1);

    me.unregister_callback(id).unwrap();
    assert_eq!(bus.subscriber_count(&pieces), 0);
}
