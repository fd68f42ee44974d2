//! Host-side transport.
//!
//! Each accepted socket goes through:
//!
//! ```text
//! Accepted ──→ AwaitingJoin ──(JOIN)──→ Active ──(EOF / error / kick)──→ Closed
//! ```
//!
//! Until its `JOIN` arrives a socket is only a [`ConnectionId`]; the
//! sender id in the `JOIN` header becomes its permanent [`ClientId`] and
//! the key it is registered under. From then on every frame body it
//! sends is published verbatim to the bus under the frame's channel,
//! except `JOIN` and `DISCONNECT`, which only this transport produces.
//!
//! Leaving `Active` for any reason removes the peer and publishes one
//! `DISCONNECT` envelope carrying its id.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use bytes::Bytes;
use parking_lot::Mutex;
use tablesync_bus::ChannelBus;
use tablesync_protocol::{
    ChannelName, ClientId, Envelope, Frame, Recipient, channels, encode_frame,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, mpsc, watch};

use crate::io::{OutboundQueue, read_frame, write_frames};
use crate::{ConnectionId, Transport, TransportConfig, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A registered (joined) client.
struct Peer {
    conn_id: ConnectionId,
    outbound: OutboundQueue,
    /// Wakes the connection task when the host kicks this peer.
    closer: Arc<Notify>,
}

impl Peer {
    /// Queues one copy of a frame, stamped with the peer's own id.
    /// Returns `false` if the connection is already going away.
    fn queue(&self, id: ClientId, channel: &ChannelName, body: &[u8]) -> bool {
        self.outbound.send(encode_frame(id, channel, body)).is_ok()
    }
}

#[derive(Debug, Clone, Copy)]
enum ConnState {
    AwaitingJoin,
    Active(ClientId),
}

/// State shared by the accept loop, every connection task, and the
/// foreground `send` path.
struct Shared {
    bus: Arc<ChannelBus>,
    config: TransportConfig,
    peers: Mutex<HashMap<ClientId, Peer>>,
    join_channel: ChannelName,
    disconnect_channel: ChannelName,
}

impl Shared {
    fn dispatch(
        &self,
        conn_id: ConnectionId,
        state: &mut ConnState,
        frame: Frame,
        outbound: &OutboundQueue,
        closer: &Arc<Notify>,
    ) -> Result<(), TransportError> {
        let Frame { header, body } = frame;
        let is_join = header.channel == self.join_channel;

        match *state {
            ConnState::AwaitingJoin if is_join => {
                let client_id = header.sender_id;
                self.register(client_id, conn_id, outbound.clone(), Arc::clone(closer))?;
                *state = ConnState::Active(client_id);

                tracing::info!(
                    %conn_id,
                    %client_id,
                    name = %String::from_utf8_lossy(&body),
                    "client joined"
                );
                // The endpoint needs the id as well as the name, so the
                // bare name is wrapped in an envelope addressed by id.
                let join = Envelope::new(client_id.0, client_id, body).encode();
                self.bus.publish(&self.join_channel, join);
            }
            ConnState::AwaitingJoin => {
                tracing::warn!(
                    %conn_id,
                    channel = %header.channel,
                    "frame before JOIN, dropping"
                );
            }
            ConnState::Active(client_id) if is_join => {
                tracing::warn!(%client_id, "repeated JOIN ignored");
            }
            // Only the transport itself reports a lost connection.
            ConnState::Active(client_id) if header.channel == self.disconnect_channel => {
                tracing::warn!(%client_id, "DISCONNECT from the wire, dropping");
            }
            ConnState::Active(client_id) => {
                tracing::debug!(
                    %client_id,
                    channel = %header.channel,
                    len = body.len(),
                    "frame received"
                );
                self.bus.publish(&header.channel, body);
            }
        }
        Ok(())
    }

    fn register(
        &self,
        client_id: ClientId,
        conn_id: ConnectionId,
        outbound: OutboundQueue,
        closer: Arc<Notify>,
    ) -> Result<(), TransportError> {
        if client_id.is_host() {
            return Err(TransportError::JoinRefused(format!(
                "{conn_id} asked for the reserved host id"
            )));
        }

        let mut peers = self.peers.lock();
        if peers.contains_key(&client_id) {
            return Err(TransportError::JoinRefused(format!(
                "{client_id} is already connected"
            )));
        }
        peers.insert(
            client_id,
            Peer {
                conn_id,
                outbound,
                closer,
            },
        );
        Ok(())
    }

    /// Unregisters `client_id` if it still belongs to this connection.
    fn remove_peer(&self, client_id: ClientId, conn_id: ConnectionId) {
        let mut peers = self.peers.lock();
        if peers.get(&client_id).is_some_and(|p| p.conn_id == conn_id) {
            peers.remove(&client_id);
        }
    }
}

/// The host's transport.
///
/// Owns a background thread running a multi-threaded tokio runtime
/// (`TransportConfig::worker_threads`) so several connections' reads and
/// writes can make progress at once. Dropping it shuts everything down.
pub struct ServerTransport {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ServerTransport {
    /// Binds `addr` and starts accepting clients in the background.
    ///
    /// Binding happens before this returns, so address errors surface
    /// here and `local_addr()` is immediately valid (bind to port 0 to
    /// let the OS pick one).
    pub fn bind(
        addr: &str,
        bus: Arc<ChannelBus>,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let bind_err = |source| TransportError::BindFailed {
            addr: addr.to_string(),
            source,
        };
        let listener = std::net::TcpListener::bind(addr).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name(format!("{}-worker", config.thread_name))
            .enable_all()
            .build()
            .map_err(TransportError::Runtime)?;

        let shared = Arc::new(Shared {
            bus,
            config: config.clone(),
            peers: Mutex::new(HashMap::new()),
            join_channel: ChannelName::new(channels::JOIN),
            disconnect_channel: ChannelName::new(channels::DISCONNECT),
        });
        let (shutdown, shutdown_rx) = watch::channel(false);

        let thread = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name(config.thread_name)
                .spawn(move || {
                    runtime.block_on(accept_loop(shared, listener, shutdown_rx));
                })
                .map_err(TransportError::Runtime)?
        };

        tracing::info!(%local_addr, "host transport listening");
        Ok(Self {
            shared,
            local_addr,
            shutdown,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Stops accepting, closes every connection, and joins the I/O
    /// thread. Frames still queued are abandoned. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                tracing::error!("host I/O thread panicked");
            }
            tracing::info!(addr = %self.local_addr, "host transport shut down");
        }
    }
}

impl Transport for ServerTransport {
    fn local_id(&self) -> ClientId {
        ClientId::HOST
    }

    fn send(
        &self,
        recipient: Recipient,
        channel: &ChannelName,
        body: Bytes,
    ) -> Result<usize, TransportError> {
        if self.is_shut_down() {
            return Err(TransportError::Shutdown);
        }
        let peers = self.shared.peers.lock();

        if let Recipient::Client(target) = recipient {
            return Ok(match peers.get(&target) {
                Some(peer) => usize::from(peer.queue(target, channel, &body)),
                None => {
                    tracing::debug!(%target, %channel, "target not connected, dropping");
                    0
                }
            });
        }

        // Broadcast: one copy per peer, each stamped with that peer's id.
        let mut queued = 0;
        for (&id, peer) in peers.iter() {
            if recipient.includes(id) && peer.queue(id, channel, &body) {
                queued += 1;
            }
        }
        Ok(queued)
    }

    fn peers(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> =
            self.shared.peers.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    fn disconnect(&self, client: ClientId) {
        if let Some(peer) = self.shared.peers.lock().remove(&client) {
            tracing::info!(%client, conn_id = %peer.conn_id, "disconnecting client");
            peer.closer.notify_one();
        }
    }
}

impl Drop for ServerTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

async fn accept_loop(
    shared: Arc<Shared>,
    listener: std::net::TcpListener,
    mut shutdown: watch::Receiver<bool>,
) {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "could not register listener with runtime");
            return;
        }
    };

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let conn_id = ConnectionId::new(
                        NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
                    );
                    tracing::debug!(%conn_id, %addr, "accepted connection");
                    let _ = stream.set_nodelay(true);
                    tokio::spawn(handle_connection(
                        Arc::clone(&shared),
                        stream,
                        conn_id,
                        shutdown.clone(),
                    ));
                }
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            },
            _ = shutdown.changed() => break,
        }
    }
}

/// Runs one connection from accept to close.
async fn handle_connection(
    shared: Arc<Shared>,
    stream: TcpStream,
    conn_id: ConnectionId,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, writer) = stream.into_split();
    let (outbound, queue) = mpsc::unbounded_channel();
    let mut writer_task = tokio::spawn(write_frames(writer, queue));
    let mut writer_done = false;
    let closer = Arc::new(Notify::new());
    let mut state = ConnState::AwaitingJoin;

    let result = loop {
        tokio::select! {
            read = read_frame(&mut reader, shared.config.max_body_len) => match read {
                Ok(Some(frame)) => {
                    if let Err(e) =
                        shared.dispatch(conn_id, &mut state, frame, &outbound, &closer)
                    {
                        break Err(e);
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            },
            written = &mut writer_task => {
                writer_done = true;
                break match written {
                    Ok(result) => result,
                    Err(e) => Err(TransportError::ConnectionClosed(
                        format!("writer task failed: {e}"),
                    )),
                };
            }
            _ = closer.notified() => break Ok(()),
            _ = shutdown.changed() => break Ok(()),
        }
    };

    if !writer_done {
        writer_task.abort();
    }

    match (state, result) {
        (ConnState::Active(client_id), result) => {
            shared.remove_peer(client_id, conn_id);
            match result {
                Ok(()) => tracing::info!(%client_id, "client disconnected"),
                Err(e) => tracing::info!(%client_id, error = %e, "client connection lost"),
            }
            let notice = Envelope::new(client_id.0, client_id, Bytes::new()).encode();
            shared.bus.publish(&shared.disconnect_channel, notice);
        }
        (ConnState::AwaitingJoin, Err(e)) => {
            tracing::warn!(%conn_id, error = %e, "connection closed before joining");
        }
        (ConnState::AwaitingJoin, Ok(())) => {
            tracing::debug!(%conn_id, "connection closed before joining");
        }
    }
}
