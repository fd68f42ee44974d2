//! A transport that records instead of sending, and helpers to feed the
//! bus as if frames had arrived.

#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tablesync_bus::ChannelBus;
use tablesync_protocol::{ChannelName, ClientId, Envelope, Recipient};
use tablesync_replication::{Endpoint, HostConfig};
use tablesync_transport::{Transport, TransportError};

/// One recorded `send` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub recipient: Recipient,
    pub channel: String,
    pub envelope: Envelope,
}

impl Sent {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.envelope.payload).unwrap()
    }
}

/// Pretends to have `peers` connected and remembers every frame.
pub struct RecordingTransport {
    id: ClientId,
    peers: Mutex<Vec<ClientId>>,
    sent: Mutex<Vec<Sent>>,
    kicked: Mutex<Vec<ClientId>>,
}

impl RecordingTransport {
    pub fn new(id: ClientId, peers: &[u64]) -> Self {
        Self {
            id,
            peers: Mutex::new(peers.iter().copied().map(ClientId).collect()),
            sent: Mutex::new(Vec::new()),
            kicked: Mutex::new(Vec::new()),
        }
    }

    /// Everything sent so far, clearing the record.
    pub fn take_sent(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn kicked(&self) -> Vec<ClientId> {
        self.kicked.lock().clone()
    }
}

impl Transport for RecordingTransport {
    fn local_id(&self) -> ClientId {
        self.id
    }

    fn send(
        &self,
        recipient: Recipient,
        channel: &ChannelName,
        body: Bytes,
    ) -> Result<usize, TransportError> {
        let envelope = Envelope::decode(body).expect("endpoint sends envelopes");
        self.sent.lock().push(Sent {
            recipient,
            channel: channel.as_str().to_string(),
            envelope,
        });
        if !self.id.is_host() {
            return Ok(1);
        }
        Ok(self
            .peers
            .lock()
            .iter()
            .filter(|&&peer| recipient.includes(peer))
            .count())
    }

    fn peers(&self) -> Vec<ClientId> {
        self.peers.lock().clone()
    }

    fn disconnect(&self, client: ClientId) {
        self.peers.lock().retain(|&peer| peer != client);
        self.kicked.lock().push(client);
    }
}

pub type TestEndpoint = Endpoint<RecordingTransport>;

pub fn host_with_peers(peers: &[u64]) -> (TestEndpoint, Arc<ChannelBus>) {
    let bus = Arc::new(ChannelBus::new());
    let config = HostConfig {
        session_id: 77,
        session_name: "friday game".to_string(),
        host_name: "gm".to_string(),
    };
    let endpoint = Endpoint::host(
        RecordingTransport::new(ClientId::HOST, peers),
        Arc::clone(&bus),
        config,
    );
    (endpoint, bus)
}

pub fn client(id: u64) -> (TestEndpoint, Arc<ChannelBus>) {
    let bus = Arc::new(ChannelBus::new());
    let endpoint = Endpoint::client(
        RecordingTransport::new(ClientId(id), &[0]),
        Arc::clone(&bus),
    );
    (endpoint, bus)
}

/// Publishes `envelope` on `channel` as the transport would on arrival.
pub fn arrive(bus: &ChannelBus, channel: &str, envelope: Envelope) {
    bus.publish(&ChannelName::new(channel), envelope.encode());
}

pub fn envelope(entity_id: u64, sender: u64, payload: impl Into<Bytes>) -> Envelope {
    Envelope::new(entity_id, ClientId(sender), payload.into())
}

/// What the host transport publishes when client `id` joins as `name`.
pub fn join(bus: &ChannelBus, id: u64, name: &'static str) {
    arrive(bus, tablesync_protocol::channels::JOIN, envelope(id, id, name));
}
