//! `TablesyncBuilder`: wires a bus, a transport, and an endpoint.

use std::sync::Arc;

use tablesync_bus::ChannelBus;
use tablesync_replication::{Endpoint, HostConfig, PendingEndpoint};
use tablesync_transport::{ClientTransport, ServerTransport, TransportConfig};

use crate::TablesyncError;

/// The host side of a session.
pub type HostEndpoint = Endpoint<ServerTransport>;

/// A client's side of a session.
pub type ClientEndpoint = Endpoint<ClientTransport>;

/// Address used by `bind`/`connect` when neither is called.
pub const DEFAULT_ADDR: &str = "127.0.0.1:7777";

/// Entry point: `Tablesync::builder()`.
pub struct Tablesync;

impl Tablesync {
    /// Creates a builder with default settings.
    pub fn builder() -> TablesyncBuilder {
        TablesyncBuilder::new()
    }
}

/// Builder for a host or client endpoint.
///
/// # Example
///
/// ```rust,no_run
/// use tablesync::prelude::*;
///
/// # fn main() -> Result<(), TablesyncError> {
/// let mut host = Tablesync::builder()
///     .bind("0.0.0.0:7777")
///     .session_name("friday game")
///     .host()?;
///
/// let mut client = Tablesync::builder()
///     .connect("127.0.0.1:7777")
///     .display_name("alice")
///     .join()?;
///
/// host.update();
/// client.update();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TablesyncBuilder {
    addr: String,
    display_name: String,
    host: HostConfig,
    transport: TransportConfig,
}

impl TablesyncBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            display_name: "player".to_string(),
            host: HostConfig::default(),
            transport: TransportConfig::default(),
        }
    }

    /// Sets the address the host listens on.
    pub fn bind(mut self, addr: &str) -> Self {
        self.addr = addr.to_string();
        self
    }

    /// Sets the host address a client connects to.
    pub fn connect(mut self, addr: &str) -> Self {
        self.addr = addr.to_string();
        self
    }

    /// Sets the name a client joins under.
    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = name.to_string();
        self
    }

    /// Sets the host's own roster name.
    pub fn host_name(mut self, name: &str) -> Self {
        self.host.host_name = name.to_string();
        self
    }

    /// Sets the session name sent to joining clients.
    pub fn session_name(mut self, name: &str) -> Self {
        self.host.session_name = name.to_string();
        self
    }

    /// Sets the session id sent to joining clients.
    pub fn session_id(mut self, id: u64) -> Self {
        self.host.session_id = id;
        self
    }

    /// Sets the number of I/O worker threads on the host.
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.transport.worker_threads = n;
        self
    }

    /// Sets the largest frame body accepted from a peer.
    pub fn max_body_len(mut self, len: u64) -> Self {
        self.transport.max_body_len = len;
        self
    }

    /// Replaces the whole transport configuration.
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport = config;
        self
    }

    /// Starts listening and returns the host endpoint.
    pub fn host(self) -> Result<HostEndpoint, TablesyncError> {
        self.host_with(|_| {})
    }

    /// Like [`host`](Self::host), running `setup` before the listener
    /// opens. Callbacks registered there see every client from its very
    /// first `JOIN`.
    pub fn host_with(
        self,
        setup: impl FnOnce(&mut PendingEndpoint),
    ) -> Result<HostEndpoint, TablesyncError> {
        let Self {
            addr,
            host,
            transport,
            ..
        } = self;
        let mut pending = PendingEndpoint::host(Arc::new(ChannelBus::new()), host);
        setup(&mut pending);
        let endpoint = pending.start(|bus| ServerTransport::bind(&addr, bus, transport))?;
        tracing::info!(addr = %endpoint.transport().local_addr(), "hosting session");
        Ok(endpoint)
    }

    /// Connects to a host, sends `JOIN`, and returns the client endpoint.
    ///
    /// Blocks until the connection is up. The endpoint reports
    /// [`is_joined`](Endpoint::is_joined) once an `update()` has
    /// processed the host's `JOIN_ACCEPT`.
    pub fn join(self) -> Result<ClientEndpoint, TablesyncError> {
        self.join_with(|_| {})
    }

    /// Like [`join`](Self::join), running `setup` before connecting.
    ///
    /// Register callbacks for whatever the host sends a newcomer here:
    /// the host may answer before `join` returns.
    pub fn join_with(
        self,
        setup: impl FnOnce(&mut PendingEndpoint),
    ) -> Result<ClientEndpoint, TablesyncError> {
        let Self {
            addr,
            display_name,
            transport,
            ..
        } = self;
        let mut pending = PendingEndpoint::client(Arc::new(ChannelBus::new()));
        setup(&mut pending);
        let endpoint = pending.start(|bus| {
            ClientTransport::connect(&addr, &display_name, bus, transport)
        })?;
        Ok(endpoint)
    }
}

impl Default for TablesyncBuilder {
    fn default() -> Self {
        Self::new()
    }
}
