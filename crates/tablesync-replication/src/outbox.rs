//! Outbound changes waiting for the next flush.

use bytes::Bytes;
use tablesync_protocol::{ChannelName, Envelope, Recipient};

#[derive(Debug, Clone)]
pub(crate) struct Outgoing {
    pub channel: ChannelName,
    pub recipient: Recipient,
    pub body: Bytes,
}

/// FIFO of encoded changes. Flushed to the transport at the end of every
/// `update()`, in the order they were queued.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    queue: Vec<Outgoing>,
}

impl Outbox {
    pub(crate) fn push(&mut self, channel: &str, recipient: Recipient, envelope: &Envelope) {
        self.push_raw(ChannelName::new(channel), recipient, envelope.encode());
    }

    pub(crate) fn push_raw(&mut self, channel: ChannelName, recipient: Recipient, body: Bytes) {
        self.queue.push(Outgoing {
            channel,
            recipient,
            body,
        });
    }

    pub(crate) fn take(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.queue)
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
