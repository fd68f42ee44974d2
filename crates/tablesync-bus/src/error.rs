//! Error types for the bus.

use crate::MailboxHandle;

/// Errors that can occur when using a [`ChannelBus`](crate::ChannelBus).
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The handle was never issued by this bus, or was unsubscribed.
    #[error("unknown or unsubscribed mailbox {0}")]
    UnknownHandle(MailboxHandle),
}
