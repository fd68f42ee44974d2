//! The application-facing endpoint.
//!
//! ```text
//!  application ──publish()──→ outbox ──┐
//!                                       │ update(): 1. role rules
//!  transport ──→ bus mailboxes ─────────┤           2. callbacks
//!                                       │           3. flush outbox
//!  application ←──callbacks─────────────┘           4. kicks
//! ```
//!
//! Nothing here blocks or touches a socket directly: inbound data comes
//! from non-blocking mailbox drains and outbound data goes to
//! [`Transport::send`], which only queues.

use std::sync::Arc;

use bytes::Bytes;
use tablesync_bus::{ChannelBus, MailboxHandle};
use tablesync_protocol::{
    Addressed, ChannelName, ClientId, ClientInfo, Envelope, Payload, PendingImageRequest,
    ProtocolError, Recipient, SessionInfo, channels,
};
use tablesync_transport::Transport;

use crate::callbacks::{CallbackId, Callbacks};
use crate::client::ClientRole;
use crate::host::HostRole;
use crate::images::ImageCache;
use crate::outbox::Outbox;
use crate::role::{Effects, Role, RoleKind};
use crate::{HostConfig, ReplicationError};

/// What one [`Endpoint::update`] did.
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Inbound items handled by a built-in rule or a callback.
    pub delivered: usize,
    /// Frames handed to the transport.
    pub sent: usize,
    /// Items that were dropped, and why. Never aborts the tick.
    pub rejected: Vec<ReplicationError>,
}

struct RuleBinding {
    channel: ChannelName,
    mailbox: MailboxHandle,
}

/// A replication endpoint over some [`Transport`].
///
/// Built from a [`PendingEndpoint`], or with [`Endpoint::host`] and
/// [`Endpoint::client`] over a running transport. Drive it by
/// calling [`update`](Self::update) once per tick from the thread that
/// owns it.
pub struct Endpoint<T: Transport> {
    bus: Arc<ChannelBus>,
    transport: T,
    role: Role,
    rules: Vec<RuleBinding>,
    callbacks: Callbacks,
    images: ImageCache,
    outbox: Outbox,
    kicks: Vec<ClientId>,
}

/// An endpoint whose transport hasn't been started yet.
///
/// The built-in rules are listening from the moment this is created.
/// Callbacks registered here are too, so whatever the peer sends right
/// after connecting (a snapshot replayed on `JOIN`, say) reaches them.
///
/// ```no_run
/// use std::sync::Arc;
///
/// use tablesync_bus::ChannelBus;
/// use tablesync_protocol::{Addressed, Vec2, channels};
/// use tablesync_replication::PendingEndpoint;
/// use tablesync_transport::{ClientTransport, TransportConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut pending = PendingEndpoint::client(Arc::new(ChannelBus::new()));
/// pending.register_callback(channels::MOVE_PIECE, |m: Addressed<Vec2>| {
///     println!("piece {} moved", m.entity_id);
/// });
/// let _client = pending.start(|bus| {
///     ClientTransport::connect("127.0.0.1:7777", "alice", bus, TransportConfig::default())
/// })?;
/// # Ok(())
/// # }
/// ```
pub struct PendingEndpoint {
    bus: Arc<ChannelBus>,
    role: Role,
    rules: Vec<RuleBinding>,
    callbacks: Callbacks,
}

impl PendingEndpoint {
    /// The host side. The roster starts with the host itself.
    pub fn host(bus: Arc<ChannelBus>, config: HostConfig) -> Self {
        Self::new(bus, Role::Host(HostRole::new(&config)))
    }

    /// A client. It counts as joined once the host's `JOIN_ACCEPT` has
    /// been processed by an `update()`.
    pub fn client(bus: Arc<ChannelBus>) -> Self {
        Self::new(bus, Role::Client(ClientRole::default()))
    }

    fn new(bus: Arc<ChannelBus>, role: Role) -> Self {
        let rules = subscribe_rules(&bus, &role);
        Self {
            bus,
            role,
            rules,
            callbacks: Callbacks::default(),
        }
    }

    /// See [`Endpoint::register_callback`].
    pub fn register_callback<P, F>(&mut self, channel: &str, handler: F) -> CallbackId
    where
        P: Payload + 'static,
        F: FnMut(Addressed<P>) + Send + 'static,
    {
        self.callbacks.register(&self.bus, channel, handler)
    }

    /// See [`Endpoint::unregister_callback`].
    pub fn unregister_callback(&mut self, id: CallbackId) -> Result<(), ReplicationError> {
        self.callbacks.unregister(&self.bus, id)
    }

    pub fn role_kind(&self) -> RoleKind {
        self.role.kind()
    }

    /// Starts the transport with `open` and returns the running endpoint.
    ///
    /// If `open` fails every subscription made so far is dropped.
    pub fn start<T, E>(
        self,
        open: impl FnOnce(Arc<ChannelBus>) -> Result<T, E>,
    ) -> Result<Endpoint<T>, E>
    where
        T: Transport,
    {
        let transport = open(Arc::clone(&self.bus))?;
        Ok(self.attach(transport))
    }

    /// Runs over a transport that is already up.
    pub fn attach<T: Transport>(mut self, transport: T) -> Endpoint<T> {
        // Drop still runs on `self`, so leave it nothing to unsubscribe.
        let role = std::mem::replace(&mut self.role, Role::Client(ClientRole::default()));
        let rules = std::mem::take(&mut self.rules);
        let callbacks = std::mem::take(&mut self.callbacks);
        tracing::info!(role = %role.kind(), local_id = %transport.local_id(), "endpoint created");
        Endpoint {
            bus: Arc::clone(&self.bus),
            transport,
            role,
            rules,
            callbacks,
            images: ImageCache::default(),
            outbox: Outbox::default(),
            kicks: Vec::new(),
        }
    }
}

impl Drop for PendingEndpoint {
    fn drop(&mut self) {
        for binding in self.rules.drain(..) {
            let _ = self.bus.unsubscribe(binding.mailbox);
        }
        self.callbacks.clear(&self.bus);
    }
}

impl<T: Transport> Endpoint<T> {
    /// Creates the host endpoint over a transport that is already
    /// running. The roster starts with the host itself.
    ///
    /// Frames that arrive before this call reach nobody; prefer
    /// [`PendingEndpoint`] or [`host_with`](Self::host_with).
    pub fn host(transport: T, bus: Arc<ChannelBus>, config: HostConfig) -> Self {
        PendingEndpoint::host(bus, config).attach(transport)
    }

    /// Creates a client endpoint over a transport that is already
    /// running. It counts as joined once the host's `JOIN_ACCEPT` has been
    /// processed by an `update()`.
    pub fn client(transport: T, bus: Arc<ChannelBus>) -> Self {
        PendingEndpoint::client(bus).attach(transport)
    }

    /// Like [`host`](Self::host), but subscribes the built-in rules
    /// before `bind` starts the transport, so a client that joins
    /// straight away can't slip past them.
    pub fn host_with<E>(
        bus: Arc<ChannelBus>,
        config: HostConfig,
        bind: impl FnOnce(Arc<ChannelBus>) -> Result<T, E>,
    ) -> Result<Self, E> {
        PendingEndpoint::host(bus, config).start(bind)
    }

    /// Like [`client`](Self::client), but subscribes the built-in rules
    /// before `connect` sends `JOIN`, so the host's answer can't arrive
    /// before anybody listens for it.
    pub fn client_with<E>(
        bus: Arc<ChannelBus>,
        connect: impl FnOnce(Arc<ChannelBus>) -> Result<T, E>,
    ) -> Result<Self, E> {
        PendingEndpoint::client(bus).start(connect)
    }

    // -- callbacks --------------------------------------------------------

    /// Calls `handler` during `update()` for every item on `channel`,
    /// decoded as an envelope carrying a `P`.
    ///
    /// Several callbacks may share a channel; each gets every item.
    /// Items that fail to decode are reported in
    /// [`UpdateReport::rejected`] and skipped.
    pub fn register_callback<P, F>(&mut self, channel: &str, handler: F) -> CallbackId
    where
        P: Payload + 'static,
        F: FnMut(Addressed<P>) + Send + 'static,
    {
        self.callbacks.register(&self.bus, channel, handler)
    }

    /// Removes a callback. Items already buffered for it are dropped.
    pub fn unregister_callback(&mut self, id: CallbackId) -> Result<(), ReplicationError> {
        self.callbacks.unregister(&self.bus, id)
    }

    // -- outbound ---------------------------------------------------------

    /// Queues a change for the next `update()`.
    ///
    /// The envelope's sender is this endpoint's id. On a client the
    /// recipient is ignored: everything goes to the host, which decides
    /// who else sees it.
    pub fn publish<P: Payload>(
        &mut self,
        channel: &str,
        entity_id: u64,
        payload: &P,
        recipient: Recipient,
    ) -> Result<(), ReplicationError> {
        if channel == channels::PLAYER_VIEW && self.role.kind() != RoleKind::Host {
            return Err(ReplicationError::HostOnly(channel.to_string()));
        }
        let envelope = Envelope::with_payload(entity_id, self.transport.local_id(), payload)
            .map_err(|e| ReplicationError::payload(channel, e))?;
        self.outbox.push(channel, recipient, &envelope);
        Ok(())
    }

    /// Announces that this client is leaving. The host drops it from the
    /// roster and closes the connection.
    pub fn leave(&mut self) -> Result<(), ReplicationError> {
        if self.role.kind() != RoleKind::Client {
            return Err(ReplicationError::ClientOnly("leave"));
        }
        let me = self.transport.local_id();
        self.publish(channels::LEAVE, me.0, &(), Recipient::Client(ClientId::HOST))
    }

    // -- the tick ---------------------------------------------------------

    /// Runs one tick: built-in rules, then callbacks (each in registration
    /// order, items in arrival order), then flushes everything queued.
    pub fn update(&mut self) -> UpdateReport {
        let mut report = UpdateReport::default();
        let local_id = self.transport.local_id();

        for binding in &self.rules {
            let bodies = match self.bus.drain_raw(binding.mailbox) {
                Ok(bodies) => bodies,
                Err(e) => {
                    report.rejected.push(e.into());
                    continue;
                }
            };
            for body in bodies {
                let mut fx = Effects {
                    local_id,
                    images: &mut self.images,
                    outbox: &mut self.outbox,
                    kicks: &mut self.kicks,
                };
                let result = Envelope::decode(body)
                    .and_then(|envelope| self.role.apply(&mut fx, &binding.channel, envelope));
                match result {
                    Ok(()) => report.delivered += 1,
                    Err(e) => reject(&mut report, &binding.channel, e),
                }
            }
        }

        self.callbacks.run(&self.bus, &mut report);

        self.flush(&mut report);

        for client in self.kicks.drain(..) {
            self.transport.disconnect(client);
        }
        report
    }

    fn flush(&mut self, report: &mut UpdateReport) {
        if !self.outbox.is_empty() {
            tracing::trace!(queued = self.outbox.len(), "flushing outbox");
        }
        for out in self.outbox.take() {
            match self.transport.send(out.recipient, &out.channel, out.body) {
                Ok(frames) => report.sent += frames,
                Err(e) => {
                    tracing::warn!(channel = %out.channel, error = %e, "send failed");
                    report.rejected.push(e.into());
                }
            }
        }
    }

    // -- images -----------------------------------------------------------

    /// A cached image.
    pub fn image(&self, image_id: u64) -> Option<Bytes> {
        self.images.get(image_id).cloned()
    }

    /// Caches an image and makes it available to peers.
    ///
    /// On the host this satisfies any pending requests for it; a client
    /// also sends it to the host.
    pub fn upload_image(&mut self, image_id: u64, data: Bytes) {
        let local_id = self.transport.local_id();
        let mut fx = Effects {
            local_id,
            images: &mut self.images,
            outbox: &mut self.outbox,
            kicks: &mut self.kicks,
        };
        match &mut self.role {
            Role::Host(host) => host.store_image(&mut fx, image_id, data, local_id),
            Role::Client(_) => {
                fx.images.store(image_id, data.clone());
                fx.outbox.push(
                    channels::NEW_IMAGE,
                    Recipient::Client(ClientId::HOST),
                    &Envelope::new(image_id, local_id, data),
                );
            }
        }
    }

    /// Returns the image if it is cached; otherwise asks for it and
    /// returns `None`. Poll [`image`](Self::image) on later ticks.
    pub fn request_image(&mut self, image_id: u64) -> Option<Bytes> {
        if let Some(data) = self.images.get(image_id) {
            return Some(data.clone());
        }

        let local_id = self.transport.local_id();
        let mut fx = Effects {
            local_id,
            images: &mut self.images,
            outbox: &mut self.outbox,
            kicks: &mut self.kicks,
        };
        match &mut self.role {
            Role::Host(host) => host.request_image(&mut fx, image_id, local_id),
            Role::Client(_) => {
                let ask = Bytes::copy_from_slice(&image_id.to_le_bytes());
                fx.outbox.push(
                    channels::IMAGE_REQUEST,
                    Recipient::Client(ClientId::HOST),
                    &Envelope::new(image_id, local_id, ask),
                )
            }
        }
        None
    }

    /// Image requests the host is still waiting to satisfy. Always empty
    /// on a client.
    pub fn pending_image_requests(&self) -> &[PendingImageRequest] {
        self.images.pending()
    }

    // -- views ------------------------------------------------------------

    /// The roster, ascending by id. On the host this always includes id 0.
    pub fn connected_clients(&self) -> Vec<ClientInfo> {
        self.role.roster()
    }

    pub fn local_id(&self) -> ClientId {
        self.transport.local_id()
    }

    pub fn role_kind(&self) -> RoleKind {
        self.role.kind()
    }

    /// The session: the host's own, or the one a client was accepted into.
    pub fn session(&self) -> Option<&SessionInfo> {
        self.role.session()
    }

    /// `true` on the host; on a client, `true` between `JOIN_ACCEPT` and
    /// losing the host.
    pub fn is_joined(&self) -> bool {
        match &self.role {
            Role::Host(_) => true,
            Role::Client(client) => client.joined,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn bus(&self) -> &Arc<ChannelBus> {
        &self.bus
    }
}

impl<T: Transport> Drop for Endpoint<T> {
    fn drop(&mut self) {
        for binding in self.rules.drain(..) {
            let _ = self.bus.unsubscribe(binding.mailbox);
        }
        self.callbacks.clear(&self.bus);
    }
}

fn subscribe_rules(bus: &ChannelBus, role: &Role) -> Vec<RuleBinding> {
    role.rule_channels()
        .into_iter()
        .map(|name| {
            let channel = ChannelName::new(name);
            RuleBinding {
                mailbox: bus.subscribe(channel.clone()),
                channel,
            }
        })
        .collect()
}

pub(crate) fn reject(report: &mut UpdateReport, channel: &ChannelName, error: ProtocolError) {
    tracing::warn!(%channel, error = %error, "dropping unparseable item");
    report.rejected.push(ReplicationError::payload(channel.as_str(), error));
}
