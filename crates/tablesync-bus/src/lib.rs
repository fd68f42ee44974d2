//! Publish/subscribe bus between the transport and the endpoint.
//!
//! The transport's I/O threads publish inbound frame bodies by channel
//! name; the foreground endpoint drains its subscriptions once per tick.
//! Mailboxes are the only state those two sides share.
//!
//! # Key types
//!
//! - [`ChannelBus`]: the registry: subscribe, unsubscribe, publish, drain
//! - [`MailboxHandle`]: refers to one subscription
//! - [`CoalescingMailbox`]: the non-blocking, batch-per-drain buffer

mod bus;
mod error;
mod mailbox;

pub use bus::{ChannelBus, MailboxHandle};
pub use error::BusError;
pub use mailbox::CoalescingMailbox;
