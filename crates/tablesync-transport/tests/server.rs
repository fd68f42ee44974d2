//! Integration tests for the host transport.
//!
//! A real `ServerTransport` listens on an OS-assigned port; the clients
//! are raw sockets driven by the helpers in `common`.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use tablesync_bus::ChannelBus;
use tablesync_protocol::{ChannelName, ClientId, Envelope, Recipient, channels};
use tablesync_transport::{ServerTransport, Transport, TransportConfig, TransportError};

use common::{Collector, eventually, raw_join, read_frame, try_read_frame, write_frame};

fn host() -> (ServerTransport, Arc<ChannelBus>) {
    let bus = Arc::new(ChannelBus::new());
    let server = ServerTransport::bind("127.0.0.1:0", Arc::clone(&bus), TransportConfig::default())
        .expect("should bind");
    (server, bus)
}

fn wait_for_peers(server: &ServerTransport, ids: &[u64]) {
    let want: Vec<ClientId> = ids.iter().copied().map(ClientId).collect();
    eventually("peer roster", || (server.peers() == want).then_some(()));
}

fn chat() -> ChannelName {
    ChannelName::new(channels::CHAT_MSG)
}

// =========================================================================
// Join
// =========================================================================

#[test]
fn test_join_registers_peer_and_publishes_envelope() {
    let (server, bus) = host();
    let mut joins = Collector::new(&bus, channels::JOIN);

    let _alice = raw_join(server.local_addr(), ClientId(42), "alice");

    let join = Envelope::decode(joins.wait_for(1)[0].clone()).unwrap();
    assert_eq!(join.entity_id, 42);
    assert_eq!(join.sender_client_id, ClientId(42));
    assert_eq!(join.payload.as_ref(), b"alice");
    assert_eq!(server.peers(), vec![ClientId(42)]);
}

#[test]
fn test_frames_before_join_are_dropped() {
    let (server, bus) = host();
    let mut chats = Collector::new(&bus, channels::CHAT_MSG);

    let mut stream = std::net::TcpStream::connect(server.local_addr()).unwrap();
    write_frame(&mut stream, ClientId(3), channels::CHAT_MSG, b"before");
    write_frame(&mut stream, ClientId(3), channels::JOIN, b"carol");
    write_frame(&mut stream, ClientId(3), channels::CHAT_MSG, b"after");

    // Same socket, so "before" would have been published first.
    assert_eq!(chats.wait_for(1), &[Bytes::from_static(b"after")]);
}

#[test]
fn test_duplicate_id_is_refused() {
    let (server, bus) = host();
    let mut joins = Collector::new(&bus, channels::JOIN);

    let _first = raw_join(server.local_addr(), ClientId(7), "first");
    wait_for_peers(&server, &[7]);

    let mut second = raw_join(server.local_addr(), ClientId(7), "second");
    assert!(try_read_frame(&mut second).is_none(), "host should close the socket");

    assert_eq!(server.peers(), vec![ClientId(7)]);
    assert_eq!(joins.poll().len(), 1);
}

#[test]
fn test_join_with_host_id_is_refused() {
    let (server, _bus) = host();
    let mut impostor = raw_join(server.local_addr(), ClientId::HOST, "impostor");

    assert!(try_read_frame(&mut impostor).is_none());
    assert!(server.peers().is_empty());
}

// =========================================================================
// Outbound routing
// =========================================================================

#[test]
fn test_broadcast_stamps_each_copy_with_recipient_id() {
    let (server, _bus) = host();
    let mut five = raw_join(server.local_addr(), ClientId(5), "five");
    let mut nine = raw_join(server.local_addr(), ClientId(9), "nine");
    wait_for_peers(&server, &[5, 9]);

    let queued = server
        .send(Recipient::All, &chat(), Bytes::from_static(b"hi"))
        .unwrap();
    assert_eq!(queued, 2);

    for (stream, id) in [(&mut five, 5), (&mut nine, 9)] {
        let frame = read_frame(stream);
        assert_eq!(frame.header.sender_id, ClientId(id));
        assert_eq!(frame.header.channel, chat());
        assert_eq!(frame.body.as_ref(), b"hi");
    }
}

#[test]
fn test_all_except_skips_the_excluded_peer() {
    let (server, _bus) = host();
    let mut five = raw_join(server.local_addr(), ClientId(5), "five");
    let mut nine = raw_join(server.local_addr(), ClientId(9), "nine");
    wait_for_peers(&server, &[5, 9]);

    let queued = server
        .send(Recipient::AllExcept(ClientId(5)), &chat(), Bytes::from_static(b"echo"))
        .unwrap();
    assert_eq!(queued, 1);
    assert_eq!(read_frame(&mut nine).body.as_ref(), b"echo");

    // Five's first frame is the direct one, so the broadcast never reached it.
    server
        .send(Recipient::Client(ClientId(5)), &chat(), Bytes::from_static(b"direct"))
        .unwrap();
    assert_eq!(read_frame(&mut five).body.as_ref(), b"direct");
}

#[test]
fn test_sends_to_one_peer_arrive_in_order() {
    let (server, _bus) = host();
    let mut peer = raw_join(server.local_addr(), ClientId(5), "five");
    wait_for_peers(&server, &[5]);

    for body in ["a", "b", "c"] {
        server
            .send(Recipient::Client(ClientId(5)), &chat(), Bytes::from(body))
            .unwrap();
    }

    let got: Vec<Bytes> = (0..3).map(|_| read_frame(&mut peer).body).collect();
    assert_eq!(got, vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]);
}

#[test]
fn test_send_to_unknown_client_queues_nothing() {
    let (server, _bus) = host();
    let queued = server
        .send(Recipient::Client(ClientId(404)), &chat(), Bytes::from_static(b"x"))
        .unwrap();
    assert_eq!(queued, 0);
}

#[test]
fn test_send_after_shutdown_fails() {
    let (server, _bus) = host();
    server.shutdown();

    let err = server
        .send(Recipient::All, &chat(), Bytes::from_static(b"x"))
        .unwrap_err();
    assert!(matches!(err, TransportError::Shutdown));
}

// =========================================================================
// Inbound routing
// =========================================================================

#[test]
fn test_inbound_body_is_published_verbatim() {
    let (server, bus) = host();
    let mut moves = Collector::new(&bus, channels::MOVE_PIECE);

    let mut peer = raw_join(server.local_addr(), ClientId(5), "five");
    let body = Envelope::new(77, ClientId(5), Bytes::from_static(b"xy")).encode();
    write_frame(&mut peer, ClientId(5), channels::MOVE_PIECE, &body);

    assert_eq!(moves.wait_for(1), &[body]);
}

// =========================================================================
// Disconnects
// =========================================================================

#[test]
fn test_peer_close_publishes_disconnect_once() {
    let (server, bus) = host();
    let mut gone = Collector::new(&bus, channels::DISCONNECT);

    let peer = raw_join(server.local_addr(), ClientId(7), "seven");
    wait_for_peers(&server, &[7]);
    drop(peer);

    let notice = Envelope::decode(gone.wait_for(1)[0].clone()).unwrap();
    assert_eq!(notice.entity_id, 7);
    wait_for_peers(&server, &[]);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(gone.poll().len(), 1);
}

#[test]
fn test_corrupt_header_drops_connection() {
    let (server, bus) = host();
    let mut gone = Collector::new(&bus, channels::DISCONNECT);

    let mut peer = raw_join(server.local_addr(), ClientId(7), "seven");
    wait_for_peers(&server, &[7]);

    // An all-zero header has an empty channel name.
    use std::io::Write;
    peer.write_all(&[0u8; tablesync_protocol::HEADER_LEN]).unwrap();

    let notice = Envelope::decode(gone.wait_for(1)[0].clone()).unwrap();
    assert_eq!(notice.entity_id, 7);
    assert!(try_read_frame(&mut peer).is_none());
}

#[test]
fn test_disconnect_from_wire_is_not_published() {
    let (server, bus) = host();
    let mut gone = Collector::new(&bus, channels::DISCONNECT);
    let mut chats = Collector::new(&bus, channels::CHAT_MSG);

    let _alice = raw_join(server.local_addr(), ClientId(17), "alice");
    let mut mallory = raw_join(server.local_addr(), ClientId(99), "mallory");
    wait_for_peers(&server, &[17, 99]);

    let forged = Envelope::new(17, ClientId(17), Bytes::new()).encode();
    write_frame(&mut mallory, ClientId(99), channels::DISCONNECT, &forged);
    // Same socket, so the forged notice would have been published first.
    write_frame(&mut mallory, ClientId(99), channels::CHAT_MSG, b"after");
    chats.wait_for(1);

    assert!(gone.poll().is_empty());
    assert_eq!(server.peers(), vec![ClientId(17), ClientId(99)]);
}

#[test]
fn test_disconnect_kicks_peer() {
    let (server, bus) = host();
    let mut gone = Collector::new(&bus, channels::DISCONNECT);

    let mut peer = raw_join(server.local_addr(), ClientId(7), "seven");
    wait_for_peers(&server, &[7]);

    server.disconnect(ClientId(7));

    assert!(server.peers().is_empty());
    assert!(try_read_frame(&mut peer).is_none());
    let notice = Envelope::decode(gone.wait_for(1)[0].clone()).unwrap();
    assert_eq!(notice.entity_id, 7);
}

#[test]
fn test_socket_that_never_joins_publishes_nothing() {
    let (server, bus) = host();
    let mut gone = Collector::new(&bus, channels::DISCONNECT);

    let stream = std::net::TcpStream::connect(server.local_addr()).unwrap();
    drop(stream);

    thread::sleep(Duration::from_millis(100));
    assert!(gone.poll().is_empty());
    assert!(server.peers().is_empty());
}
