//! Client-side transport: one connection to a host.
//!
//! ```text
//! Resolving ──→ Connecting ──→ Joining ──→ Active ──(EOF / error)──→ Closed
//!      └────────────┴── failure ───────────────────────────────────────┘
//! ```
//!
//! The `JOIN` frame is written while `Joining`, before the writer task
//! exists or `connect` returns, so it is always the first thing the host
//! reads from us. `Active` means the host has it.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use tablesync_bus::ChannelBus;
use tablesync_protocol::{ChannelName, ClientId, Envelope, Recipient, channels, encode_frame};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};

use crate::io::{OutboundQueue, read_frame, write_frames};
use crate::{Transport, TransportConfig, TransportError};

/// Where a client connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Resolving,
    Connecting,
    Joining,
    Active,
    Closed,
}

/// A client's transport.
///
/// Owns a background thread with a single-threaded tokio runtime. Every
/// frame the host sends is published to the bus under its channel; every
/// `send` goes to the host, stamped with this client's id.
pub struct ClientTransport {
    id: ClientId,
    peer_addr: SocketAddr,
    state: Arc<Mutex<ClientState>>,
    outbound: OutboundQueue,
    shutdown: watch::Sender<bool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ClientTransport {
    /// Connects to the host at `addr` under a fresh random id and joins as
    /// `display_name`.
    ///
    /// Blocks until the connection is established or has failed. Must not
    /// be called from inside an async runtime.
    pub fn connect(
        addr: &str,
        display_name: &str,
        bus: Arc<ChannelBus>,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let id = ClientId(rand::rng().random_range(1..=u64::MAX));
        Self::connect_as(addr, id, display_name, bus, config)
    }

    /// Like [`connect`](Self::connect) with a caller-chosen id.
    ///
    /// # Errors
    /// [`TransportError::JoinRefused`] for the reserved host id, otherwise
    /// whatever resolving or connecting ran into.
    pub fn connect_as(
        addr: &str,
        id: ClientId,
        display_name: &str,
        bus: Arc<ChannelBus>,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        if id.is_host() {
            return Err(TransportError::JoinRefused(
                "client id 0 is reserved for the host".to_string(),
            ));
        }

        let state = Arc::new(Mutex::new(ClientState::Resolving));
        let (outbound, queue) = mpsc::unbounded_channel();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(TransportError::Runtime)?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = oneshot::channel();
        let session = Session {
            addr: addr.to_string(),
            id,
            join: encode_frame(id, &ChannelName::new(channels::JOIN), display_name.as_bytes()),
            bus,
            max_body_len: config.max_body_len,
            state: Arc::clone(&state),
        };

        let thread = std::thread::Builder::new()
            .name(config.thread_name)
            .spawn(move || {
                runtime.block_on(session.run(queue, ready_tx, shutdown_rx));
            })
            .map_err(TransportError::Runtime)?;

        let peer_addr = match ready_rx.blocking_recv() {
            Ok(Ok(peer_addr)) => peer_addr,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(TransportError::ConnectionClosed(
                    "I/O thread exited before connecting".to_string(),
                ));
            }
        };

        tracing::info!(client_id = %id, %peer_addr, name = display_name, "connected to host");
        Ok(Self {
            id,
            peer_addr,
            state,
            outbound,
            shutdown,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        *self.state.lock()
    }

    /// The host's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Closes the connection and joins the I/O thread. Idempotent.
    ///
    /// Unlike losing the host, this does not publish `DISCONNECT`.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                tracing::error!(client_id = %self.id, "client I/O thread panicked");
            }
        }
    }
}

impl Transport for ClientTransport {
    fn local_id(&self) -> ClientId {
        self.id
    }

    /// A client has exactly one peer, so `recipient` is ignored. The host
    /// decides who else sees the frame.
    fn send(
        &self,
        _recipient: Recipient,
        channel: &ChannelName,
        body: Bytes,
    ) -> Result<usize, TransportError> {
        if *self.shutdown.borrow() {
            return Err(TransportError::Shutdown);
        }
        if self.state() == ClientState::Closed {
            return Err(TransportError::ConnectionClosed(
                "host connection closed".to_string(),
            ));
        }
        self.outbound
            .send(encode_frame(self.id, channel, &body))
            .map_err(|_| TransportError::ConnectionClosed("writer stopped".to_string()))?;
        Ok(1)
    }

    fn peers(&self) -> Vec<ClientId> {
        if self.state() == ClientState::Active {
            vec![ClientId::HOST]
        } else {
            Vec::new()
        }
    }
}

impl Drop for ClientTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Background session
// ---------------------------------------------------------------------------

enum Exit {
    Shutdown,
    HostClosed,
    Failed(TransportError),
}

struct Session {
    addr: String,
    id: ClientId,
    join: Bytes,
    bus: Arc<ChannelBus>,
    max_body_len: u64,
    state: Arc<Mutex<ClientState>>,
}

impl Session {
    fn set_state(&self, next: ClientState) {
        let mut state = self.state.lock();
        tracing::trace!(client_id = %self.id, from = ?*state, to = ?next, "client state");
        *state = next;
    }

    async fn open(&self) -> Result<(TcpStream, SocketAddr), TransportError> {
        self.set_state(ClientState::Resolving);
        let candidates: Vec<SocketAddr> = tokio::net::lookup_host(&self.addr)
            .await
            .map_err(|source| TransportError::ResolveFailed {
                addr: self.addr.clone(),
                source,
            })?
            .collect();

        self.set_state(ClientState::Connecting);
        let mut last_err = None;
        for candidate in candidates {
            match TcpStream::connect(candidate).await {
                Ok(stream) => return Ok((stream, candidate)),
                Err(e) => {
                    tracing::debug!(%candidate, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(TransportError::ConnectFailed {
            addr: self.addr.clone(),
            source: last_err.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "name resolved to no addresses")
            }),
        })
    }

    async fn run(
        self,
        queue: mpsc::UnboundedReceiver<Bytes>,
        ready: oneshot::Sender<Result<SocketAddr, TransportError>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let (stream, peer_addr) = match self.open().await {
            Ok(opened) => opened,
            Err(e) => {
                self.set_state(ClientState::Closed);
                let _ = ready.send(Err(e));
                return;
            }
        };
        let _ = stream.set_nodelay(true);

        self.set_state(ClientState::Joining);
        let (mut reader, mut writer) = stream.into_split();
        if let Err(e) = writer.write_all(&self.join).await {
            self.set_state(ClientState::Closed);
            let _ = ready.send(Err(TransportError::SendFailed(e)));
            return;
        }
        let mut writer_task = tokio::spawn(write_frames(writer, queue));
        let mut writer_done = false;
        self.set_state(ClientState::Active);
        let _ = ready.send(Ok(peer_addr));

        let exit = loop {
            tokio::select! {
                read = read_frame(&mut reader, self.max_body_len) => match read {
                    Ok(Some(frame)) => {
                        tracing::debug!(
                            client_id = %self.id,
                            channel = %frame.header.channel,
                            len = frame.body.len(),
                            "frame received"
                        );
                        self.bus.publish(&frame.header.channel, frame.body);
                    }
                    Ok(None) => break Exit::HostClosed,
                    Err(e) => break Exit::Failed(e),
                },
                written = &mut writer_task => {
                    writer_done = true;
                    break match written {
                        Ok(Ok(())) => Exit::Shutdown,
                        Ok(Err(e)) => Exit::Failed(e),
                        Err(e) => Exit::Failed(TransportError::ConnectionClosed(
                            format!("writer task failed: {e}"),
                        )),
                    };
                }
                _ = shutdown.changed() => break Exit::Shutdown,
            }
        };

        if !writer_done {
            writer_task.abort();
        }
        self.set_state(ClientState::Closed);

        match exit {
            Exit::Shutdown => {
                tracing::info!(client_id = %self.id, "client transport shut down");
                return;
            }
            Exit::HostClosed => {
                tracing::warn!(client_id = %self.id, "host closed the connection");
            }
            Exit::Failed(e) => {
                tracing::warn!(client_id = %self.id, error = %e, "lost connection to host");
            }
        }

        // Entity id 0 tells the endpoint it was the host that went away.
        let notice = Envelope::new(0, ClientId::HOST, Bytes::new()).encode();
        self.bus
            .publish(&ChannelName::new(channels::DISCONNECT), notice);
    }
}
