//! Helpers shared by the transport integration tests.
//!
//! The "other side" of every test is a plain blocking `std` socket that
//! speaks the frame format by hand, so these tests check the wire bytes
//! rather than our own decoder talking to our own encoder.

#![allow(dead_code)]

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tablesync_bus::{ChannelBus, MailboxHandle};
use tablesync_protocol::{
    ChannelName, ClientId, DEFAULT_MAX_BODY_LEN, Frame, FrameHeader, HEADER_LEN,
    channels, encode_frame,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Calls `poll` until it returns `Some`, panicking after [`TIMEOUT`].
pub fn eventually<T>(what: &str, mut poll: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        if let Some(value) = poll() {
            return value;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Accumulates everything published on one channel.
pub struct Collector {
    bus: Arc<ChannelBus>,
    handle: MailboxHandle,
    pub seen: Vec<Bytes>,
}

impl Collector {
    pub fn new(bus: &Arc<ChannelBus>, channel: &str) -> Self {
        Self {
            bus: Arc::clone(bus),
            handle: bus.subscribe(channel),
            seen: Vec::new(),
        }
    }

    /// Drains once without waiting.
    pub fn poll(&mut self) -> &[Bytes] {
        self.seen.extend(self.bus.drain_raw(self.handle).unwrap());
        &self.seen
    }

    /// Waits until at least `n` bodies have been published.
    pub fn wait_for(&mut self, n: usize) -> &[Bytes] {
        eventually("published bodies", || {
            self.seen.extend(self.bus.drain_raw(self.handle).unwrap());
            (self.seen.len() >= n).then_some(())
        });
        &self.seen
    }
}

pub fn write_frame(stream: &mut TcpStream, sender: ClientId, channel: &str, body: &[u8]) {
    stream
        .write_all(&encode_frame(sender, &ChannelName::new(channel), body))
        .unwrap();
}

/// Blocking read of one frame. Panics on timeout.
pub fn read_frame(stream: &mut TcpStream) -> Frame {
    try_read_frame(stream).expect("peer closed the stream")
}

/// Like [`read_frame`], but `None` on a clean end of stream.
pub fn try_read_frame(stream: &mut TcpStream) -> Option<Frame> {
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    let mut raw = [0u8; HEADER_LEN];
    match stream.read_exact(&mut raw) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return None,
        Err(e) if e.kind() == ErrorKind::ConnectionReset => return None,
        Err(e) => panic!("read failed: {e}"),
    }
    let header = FrameHeader::decode(&raw, DEFAULT_MAX_BODY_LEN).unwrap();
    let mut body = vec![0u8; header.body_len as usize];
    stream.read_exact(&mut body).unwrap();
    Some(Frame {
        header,
        body: Bytes::from(body),
    })
}

/// Connects a raw socket to `addr` and sends `JOIN` as `id`.
pub fn raw_join(addr: SocketAddr, id: ClientId, name: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).unwrap();
    write_frame(&mut stream, id, channels::JOIN, name.as_bytes());
    stream
}
