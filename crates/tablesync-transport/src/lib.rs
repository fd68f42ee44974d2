//! Framed TCP transports for tablesync.
//!
//! Two roles share one wire format:
//!
//! - [`ServerTransport`]: the host. Accepts any number of clients,
//!   registers each under the id it announces in `JOIN`, and routes
//!   outbound frames by [`Recipient`].
//! - [`ClientTransport`]: one connection to a host.
//!
//! Both run their socket loops on background threads and exchange data
//! with the foreground only through a [`ChannelBus`] (inbound) and the
//! [`Transport::send`] queue (outbound).
//!
//! [`ChannelBus`]: tablesync_bus::ChannelBus

mod client;
mod error;
mod io;
mod server;

pub use client::{ClientState, ClientTransport};
pub use error::TransportError;
pub use server::ServerTransport;

use std::fmt;

use bytes::Bytes;
use tablesync_protocol::{ChannelName, ClientId, DEFAULT_MAX_BODY_LEN, Recipient};

/// Opaque identifier for an accepted socket.
///
/// A socket has no [`ClientId`] until its `JOIN` arrives; this is what
/// the logs call it until then.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tuning for a transport's background I/O.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Worker threads of the host's runtime. The client always uses one.
    pub worker_threads: usize,

    /// Largest frame body accepted from a peer. A header announcing more
    /// is treated as a corrupt stream and the connection is dropped.
    pub max_body_len: u64,

    /// Name of the background thread(s), shown in debuggers and logs.
    pub thread_name: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            max_body_len: DEFAULT_MAX_BODY_LEN,
            thread_name: "tablesync-io".to_string(),
        }
    }
}

/// The outbound half of a transport, as seen by the replication endpoint.
///
/// Implemented by both roles, and by recording fakes in tests.
pub trait Transport: Send + Sync + 'static {
    /// This side's client id (`ClientId::HOST` for the host).
    fn local_id(&self) -> ClientId;

    /// Queues `body` on `channel` for `recipient`.
    ///
    /// Never blocks on the network. Returns how many frames were queued:
    /// one per addressed peer on the host, and always one on a client
    /// (which can only talk to its host). Addressing a peer that is no
    /// longer connected queues nothing and is not an error.
    ///
    /// # Errors
    /// [`TransportError::Shutdown`] or [`TransportError::ConnectionClosed`]
    /// once the transport can no longer send at all.
    fn send(
        &self,
        recipient: Recipient,
        channel: &ChannelName,
        body: Bytes,
    ) -> Result<usize, TransportError>;

    /// Ids of the peers currently reachable, ascending.
    fn peers(&self) -> Vec<ClientId>;

    /// Drops the connection to `client`. Defaults to doing nothing, for
    /// roles that can't disconnect anybody but themselves.
    fn disconnect(&self, _client: ClientId) {}
}
