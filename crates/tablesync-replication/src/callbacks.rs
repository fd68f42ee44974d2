//! Application callbacks and the mailboxes that feed them.

use std::fmt;

use bytes::Bytes;
use tablesync_bus::{ChannelBus, MailboxHandle};
use tablesync_protocol::{Addressed, ChannelName, Payload, ProtocolError};

use crate::ReplicationError;
use crate::endpoint::{UpdateReport, reject};

/// Identifies a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb-{}", self.0)
    }
}

type Handler = Box<dyn FnMut(Bytes) -> Result<(), ProtocolError> + Send>;

struct Callback {
    id: CallbackId,
    channel: ChannelName,
    mailbox: MailboxHandle,
    handler: Handler,
}

/// Callbacks in registration order.
pub(crate) struct Callbacks {
    entries: Vec<Callback>,
    next_id: u64,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }
}

impl Callbacks {
    pub(crate) fn register<P, F>(
        &mut self,
        bus: &ChannelBus,
        channel: &str,
        mut handler: F,
    ) -> CallbackId
    where
        P: Payload + 'static,
        F: FnMut(Addressed<P>) + Send + 'static,
    {
        let id = CallbackId(self.next_id);
        self.next_id += 1;

        let channel = ChannelName::new(channel);
        let mailbox = bus.subscribe(channel.clone());
        tracing::debug!(%id, %channel, "callback registered");

        self.entries.push(Callback {
            id,
            channel,
            mailbox,
            handler: Box::new(move |body| {
                handler(Addressed::<P>::decode_payload(body)?);
                Ok(())
            }),
        });
        id
    }

    pub(crate) fn unregister(
        &mut self,
        bus: &ChannelBus,
        id: CallbackId,
    ) -> Result<(), ReplicationError> {
        let index = self
            .entries
            .iter()
            .position(|cb| cb.id == id)
            .ok_or(ReplicationError::UnknownCallback(id))?;
        let callback = self.entries.remove(index);
        bus.unsubscribe(callback.mailbox)?;
        tracing::debug!(%id, channel = %callback.channel, "callback unregistered");
        Ok(())
    }

    /// Drains every callback's mailbox and runs the handler on each item.
    pub(crate) fn run(&mut self, bus: &ChannelBus, report: &mut UpdateReport) {
        for callback in &mut self.entries {
            let bodies = match bus.drain_raw(callback.mailbox) {
                Ok(bodies) => bodies,
                Err(e) => {
                    report.rejected.push(e.into());
                    continue;
                }
            };
            for body in bodies {
                match (callback.handler)(body) {
                    Ok(()) => report.delivered += 1,
                    Err(e) => reject(report, &callback.channel, e),
                }
            }
        }
    }

    /// Unsubscribes every mailbox.
    pub(crate) fn clear(&mut self, bus: &ChannelBus) {
        for callback in self.entries.drain(..) {
            let _ = bus.unsubscribe(callback.mailbox);
        }
    }
}
