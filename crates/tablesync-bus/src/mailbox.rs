//! The coalescing mailbox: one subscriber's buffer for one channel.
//!
//! Two threads touch a mailbox. A transport I/O thread pushes frame
//! bodies as they arrive; the foreground tick thread drains them once
//! per tick. The contract between them:
//!
//! - **Batching.** Everything pushed since the last successful drain is
//!   returned by the next successful drain, in push order.
//! - **Fresh batches.** A drain takes the whole batch. Pushes after it
//!   start a new one; drained items never come back.
//! - **Never block the tick.** If a push holds the lock at the moment
//!   the foreground drains, the drain returns nothing instead of
//!   waiting. The pushed item stays buffered and shows up on the next
//!   successful drain: delayed by a tick, not lost.
//!
//! The mailbox is not a bounded queue. A subscriber that never drains
//! keeps growing its batch.

use bytes::Bytes;
use parking_lot::Mutex;
use tablesync_protocol::ChannelName;

/// Buffers raw frame bodies for a single subscription.
#[derive(Debug)]
pub struct CoalescingMailbox {
    channel: ChannelName,
    batch: Mutex<Vec<Bytes>>,
}

impl CoalescingMailbox {
    pub fn new(channel: ChannelName) -> Self {
        Self {
            channel,
            batch: Mutex::new(Vec::new()),
        }
    }

    /// The channel this mailbox is subscribed to.
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// Appends a frame body to the current batch.
    ///
    /// Blocks only for as long as a concurrent drain holds the lock,
    /// which is the time it takes to swap a `Vec` out.
    pub fn push(&self, body: Bytes) {
        self.batch.lock().push(body);
    }

    /// Takes the current batch without waiting.
    ///
    /// Returns `None` when the lock is contended; the caller should try
    /// again next tick. `Some(vec![])` means the mailbox was simply empty.
    pub fn try_drain(&self) -> Option<Vec<Bytes>> {
        let mut batch = self.batch.try_lock()?;
        Some(std::mem::take(&mut *batch))
    }

    /// Number of buffered items. Waits for the lock.
    pub fn len(&self) -> usize {
        self.batch.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
