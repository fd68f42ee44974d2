//! Who is connected.

use std::collections::BTreeMap;

use tablesync_protocol::{ClientId, ClientInfo};

/// The roster: display names keyed by client id.
///
/// A `BTreeMap` keeps entries sorted by id, which is the order every
/// roster view and every roster replay uses.
#[derive(Debug, Default, Clone)]
pub(crate) struct Roster {
    entries: BTreeMap<ClientId, String>,
}

impl Roster {
    /// Inserts or renames an entry. Returns `true` if the id is new.
    pub(crate) fn insert(&mut self, id: ClientId, name: impl Into<String>) -> bool {
        self.entries.insert(id, name.into()).is_none()
    }

    /// Removes an entry, returning its name if it was present.
    pub(crate) fn remove(&mut self, id: ClientId) -> Option<String> {
        self.entries.remove(&id)
    }

    pub(crate) fn contains(&self, id: ClientId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Every entry, ascending by id.
    pub(crate) fn list(&self) -> Vec<ClientInfo> {
        self.entries
            .iter()
            .map(|(&id, name)| ClientInfo::new(id, name.clone()))
            .collect()
    }
}
