//! Image cache and the host's pending-request book.
//!
//! Images are fetched on demand: whoever needs one sends
//! `IMAGE_REQUEST`, and whoever has it answers with `NEW_IMAGE`. The host
//! sits in the middle, answering from its cache when it can and
//! otherwise remembering who asked until somebody uploads the image.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use tablesync_protocol::{ClientId, PendingImageRequest};

#[derive(Debug, Default)]
pub(crate) struct ImageCache {
    images: HashMap<u64, Bytes>,
    pending: Vec<PendingImageRequest>,
    /// Image ids the host has already asked its clients for.
    asked: HashSet<u64>,
}

impl ImageCache {
    pub(crate) fn get(&self, image_id: u64) -> Option<&Bytes> {
        self.images.get(&image_id)
    }

    /// Caches an image and returns everyone who was waiting for it, in
    /// the order they asked. Their requests are removed.
    pub(crate) fn store(&mut self, image_id: u64, data: Bytes) -> Vec<ClientId> {
        self.images.insert(image_id, data);
        self.asked.remove(&image_id);

        let mut waiting = Vec::new();
        self.pending.retain(|req| {
            if req.image_id == image_id {
                waiting.push(req.requester);
                false
            } else {
                true
            }
        });
        waiting
    }

    /// Records that `requester` wants an image nobody has uploaded yet.
    ///
    /// Returns `true` the first time a given image id is requested, which
    /// is when the host should go looking for it.
    pub(crate) fn add_pending(&mut self, image_id: u64, requester: ClientId) -> bool {
        let request = PendingImageRequest {
            image_id,
            requester,
        };
        if !self.pending.contains(&request) {
            self.pending.push(request);
        }
        self.asked.insert(image_id)
    }

    /// Forgets every request made by a departed client.
    ///
    /// An image nobody is waiting for any more counts as never asked
    /// for, so the next miss goes looking again.
    pub(crate) fn drop_requester(&mut self, requester: ClientId) {
        self.pending.retain(|req| req.requester != requester);
        let pending = &self.pending;
        self.asked
            .retain(|&id| pending.iter().any(|req| req.image_id == id));
    }

    pub(crate) fn pending(&self) -> &[PendingImageRequest] {
        &self.pending
    }
}
