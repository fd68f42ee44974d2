//! Replication endpoints for tablesync.
//!
//! An [`Endpoint`] is what the application talks to. It has two
//! narrow interfaces:
//!
//! - **publish** a named, addressed change ([`Endpoint::publish`])
//! - **register a handler** for a named channel
//!   ([`Endpoint::register_callback`], or on a [`PendingEndpoint`] before
//!   the transport starts)
//!
//! plus [`Endpoint::update`], called once per tick, which runs handlers
//! and sends queued changes.
//!
//! # Roles
//!
//! The host is authoritative. Besides the application's handlers it runs
//! built-in rules:
//!
//! - relays piece, page and chat changes to every client except the one
//!   that made them
//! - answers `JOIN` with `JOIN_ACCEPT` and the full roster, and announces
//!   the newcomer to everybody else
//! - turns `DISCONNECT`/`LEAVE` into `CLIENT_DELETE`
//! - brokers images: serves them from cache, or remembers who asked until
//!   somebody uploads them
//!
//! A client keeps a view of the session and roster and serves images it
//! has cached.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tablesync_bus::ChannelBus;
//! use tablesync_protocol::{Addressed, Recipient, Vec2, channels};
//! use tablesync_replication::{HostConfig, PendingEndpoint};
//! use tablesync_transport::{ServerTransport, TransportConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = Arc::new(ChannelBus::new());
//! let mut pending = PendingEndpoint::host(bus, HostConfig::default());
//! pending.register_callback(channels::MOVE_PIECE, |m: Addressed<Vec2>| {
//!     println!("piece {} moved to {:?}", m.entity_id, m.payload);
//! });
//! let mut host = pending.start(|bus| {
//!     ServerTransport::bind("0.0.0.0:7777", bus, TransportConfig::default())
//! })?;
//! host.publish(channels::MOVE_PIECE, 7, &Vec2::new(10.0, 20.0), Recipient::All)?;
//!
//! loop {
//!     host.update();
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//! # }
//! ```

mod callbacks;
mod client;
mod config;
mod endpoint;
mod error;
mod host;
mod images;
mod outbox;
mod role;
mod roster;

pub use config::HostConfig;
pub use callbacks::CallbackId;
pub use endpoint::{Endpoint, PendingEndpoint, UpdateReport};
pub use error::ReplicationError;
pub use role::RoleKind;
