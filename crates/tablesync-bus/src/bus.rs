//! The channel registry: which mailboxes listen on which channel.
//!
//! Mailboxes live in a slot table and are addressed by
//! [`MailboxHandle`]s (slot index + generation). Unsubscribing frees the
//! slot and bumps its generation, so a handle kept after unsubscribe is
//! rejected with [`BusError::UnknownHandle`] instead of silently reaching
//! whoever reused the slot.
//!
//! ```text
//! subscribe("MOVE_PIECE") ──→ MailboxHandle { index: 3, generation: 0 }
//!                                   │
//! publish("MOVE_PIECE", body) ──→ push into every mailbox on the channel
//!                                   │
//! drain(handle) ──→ the batch since the last drain
//!                                   │
//! unsubscribe(handle) ──→ slot 3 free, generation 1
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tablesync_protocol::{ChannelName, Payload, ProtocolError};

use crate::{BusError, CoalescingMailbox};

/// Refers to one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MailboxHandle {
    index: usize,
    generation: u32,
}

impl fmt::Display for MailboxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mbox-{}.{}", self.index, self.generation)
    }
}

struct Slot {
    generation: u32,
    mailbox: Option<Arc<CoalescingMailbox>>,
}

#[derive(Default)]
struct Registry {
    slots: Vec<Slot>,
    /// Indices of empty slots, reused before the table grows.
    free: Vec<usize>,
    /// Subscriptions per channel, in subscription order.
    by_channel: HashMap<ChannelName, Vec<MailboxHandle>>,
}

impl Registry {
    fn get(&self, handle: MailboxHandle) -> Result<&Arc<CoalescingMailbox>, BusError> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.mailbox.as_ref())
            .ok_or(BusError::UnknownHandle(handle))
    }
}

/// The process-side message bus shared by a transport and an endpoint.
///
/// Created explicitly and shared as `Arc<ChannelBus>`; nothing here is
/// global, so tests can run several independent buses side by side.
#[derive(Default)]
pub struct ChannelBus {
    registry: RwLock<Registry>,
}

impl ChannelBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mailbox for `channel` and returns its handle.
    ///
    /// Long channel names are truncated exactly as the frame header
    /// truncates them, so a subscription always matches what arrives
    /// off the wire.
    pub fn subscribe(&self, channel: impl Into<ChannelName>) -> MailboxHandle {
        let channel = channel.into();
        let mailbox = Arc::new(CoalescingMailbox::new(channel.clone()));

        let mut reg = self.registry.write();
        let handle = match reg.free.pop() {
            Some(index) => {
                let slot = &mut reg.slots[index];
                slot.mailbox = Some(mailbox);
                MailboxHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                reg.slots.push(Slot {
                    generation: 0,
                    mailbox: Some(mailbox),
                });
                MailboxHandle {
                    index: reg.slots.len() - 1,
                    generation: 0,
                }
            }
        };
        reg.by_channel.entry(channel.clone()).or_default().push(handle);

        tracing::debug!(%channel, %handle, "mailbox subscribed");
        handle
    }

    /// Removes a subscription. Items still buffered in it are dropped.
    ///
    /// # Errors
    /// [`BusError::UnknownHandle`] if the handle was already unsubscribed.
    pub fn unsubscribe(&self, handle: MailboxHandle) -> Result<(), BusError> {
        let mut reg = self.registry.write();
        let channel = reg.get(handle)?.channel().clone();

        let slot = &mut reg.slots[handle.index];
        slot.mailbox = None;
        slot.generation = slot.generation.wrapping_add(1);
        reg.free.push(handle.index);

        if let Some(handles) = reg.by_channel.get_mut(&channel) {
            handles.retain(|h| *h != handle);
            if handles.is_empty() {
                reg.by_channel.remove(&channel);
            }
        }

        tracing::debug!(%channel, %handle, "mailbox unsubscribed");
        Ok(())
    }

    /// Appends a body to one mailbox.
    pub fn push(&self, handle: MailboxHandle, body: Bytes) -> Result<(), BusError> {
        let mailbox = Arc::clone(self.registry.read().get(handle)?);
        mailbox.push(body);
        Ok(())
    }

    /// Appends a body to every mailbox subscribed to `channel`.
    ///
    /// This is the transport's inbound path. Returns how many mailboxes
    /// received it; a channel nobody listens on simply drops the body.
    pub fn publish(&self, channel: &ChannelName, body: Bytes) -> usize {
        // Collect the targets first so no registry lock is held while
        // pushing (a push may wait on a mailbox lock).
        let targets: Vec<Arc<CoalescingMailbox>> = {
            let reg = self.registry.read();
            reg.by_channel
                .get(channel)
                .map(|handles| {
                    handles
                        .iter()
                        .filter_map(|h| reg.get(*h).ok().cloned())
                        .collect()
                })
                .unwrap_or_default()
        };

        if targets.is_empty() {
            tracing::debug!(%channel, "no subscribers, dropping frame");
            return 0;
        }
        for mailbox in &targets {
            mailbox.push(body.clone());
        }
        targets.len()
    }

    /// Takes the mailbox's current batch of raw bodies.
    ///
    /// Follows the [`CoalescingMailbox`] contract: under lock contention
    /// this returns an empty batch and the items arrive next time.
    pub fn drain_raw(&self, handle: MailboxHandle) -> Result<Vec<Bytes>, BusError> {
        let mailbox = Arc::clone(self.registry.read().get(handle)?);
        Ok(mailbox.try_drain().unwrap_or_else(|| {
            tracing::trace!(%handle, "mailbox busy, deferring drain");
            Vec::new()
        }))
    }

    /// Takes the current batch and decodes each body as `T`.
    ///
    /// Decoding is per item: one malformed body yields one `Err` in the
    /// returned list and does not hide the others.
    pub fn drain<T: Payload>(
        &self,
        handle: MailboxHandle,
    ) -> Result<Vec<Result<T, ProtocolError>>, BusError> {
        Ok(self
            .drain_raw(handle)?
            .into_iter()
            .map(T::decode_payload)
            .collect())
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &ChannelName) -> usize {
        self.registry
            .read()
            .by_channel
            .get(channel)
            .map_or(0, Vec::len)
    }

    /// The channel a handle is subscribed to.
    pub fn channel_of(&self, handle: MailboxHandle) -> Result<ChannelName, BusError> {
        Ok(self.registry.read().get(handle)?.channel().clone())
    }
}

impl fmt::Debug for ChannelBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reg = self.registry.read();
        f.debug_struct("ChannelBus")
            .field("channels", &reg.by_channel.len())
            .field("slots", &reg.slots.len())
            .finish()
    }
}
