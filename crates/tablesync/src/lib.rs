//! # tablesync
//!
//! Keeps a shared board (pages, pieces, images, roster, chat) consistent
//! between one authoritative host and any number of clients over TCP.
//!
//! The application sees two operations: **publish** a named, addressed
//! change, and **register a handler** for a named channel. Call
//! `update()` once per tick to run handlers and send what was published.
//! Register handlers in `join_with`/`host_with` so they are listening
//! before the first frame arrives.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tablesync::prelude::*;
//!
//! # fn main() -> Result<(), TablesyncError> {
//! let mut client = Tablesync::builder()
//!     .connect("127.0.0.1:7777")
//!     .display_name("alice")
//!     .join_with(|setup| {
//!         setup.register_callback(channels::MOVE_PIECE, |m: Addressed<Vec2>| {
//!             println!("piece {} is now at {:?}", m.entity_id, m.payload);
//!         });
//!     })?;
//! client.publish(channels::MOVE_PIECE, 7, &Vec2::new(10.0, 20.0), Recipient::All)?;
//!
//! loop {
//!     client.update();
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//! # }
//! ```
//!
//! ## Layers
//!
//! ```text
//! tablesync-transport → tablesync-protocol → tablesync-bus → tablesync-replication
//!      (sockets)          (frames, envelopes)   (mailboxes)       (endpoint)
//! ```

mod builder;
mod error;

pub use builder::{ClientEndpoint, DEFAULT_ADDR, HostEndpoint, Tablesync, TablesyncBuilder};
pub use error::TablesyncError;

pub use tablesync_bus as bus;
pub use tablesync_protocol as protocol;
pub use tablesync_replication as replication;
pub use tablesync_transport as transport;

/// Everything an application usually needs.
pub mod prelude {
    pub use crate::{ClientEndpoint, HostEndpoint, Tablesync, TablesyncBuilder, TablesyncError};
    pub use tablesync_protocol::{
        Addressed, ChatMessage, ClientId, ClientInfo, Envelope, Payload, PendingImageRequest,
        Recipient, SessionInfo, Vec2, channels,
    };
    #[cfg(feature = "json")]
    pub use tablesync_protocol::Json;
    pub use tablesync_replication::{
        CallbackId, Endpoint, HostConfig, PendingEndpoint, ReplicationError, RoleKind,
        UpdateReport,
    };
    pub use tablesync_transport::{ClientState, Transport, TransportConfig};
}
