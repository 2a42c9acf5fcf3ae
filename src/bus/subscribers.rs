use std::sync::Arc;

use super::events::EventKind;

pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`Subscribers::subscribe`]; removal is by this identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId {
    kind: EventKind,
    slot: usize,
    serial: u64,
}

impl SubscriberId {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

struct Entry {
    serial: u64,
    callback: Callback,
}

/// Subscribers of one event kind. Removal empties a slot in place and
/// parks it on the free list for the next subscriber, so it never shifts or
/// walks the others. Serials keep subscription order across reused slots.
#[derive(Default)]
struct Chain {
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
    live: usize,
}

pub struct Subscribers {
    chains: Vec<Chain>,
    next_serial: u64,
}

impl Default for Subscribers {
    fn default() -> Self {
        Self {
            chains: EventKind::ALL.iter().map(|_| Chain::default()).collect(),
            next_serial: 0,
        }
    }
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: EventKind, callback: Callback) -> SubscriberId {
        let serial = self.next_serial;
        self.next_serial += 1;

        let chain = &mut self.chains[kind.index()];
        let entry = Some(Entry { serial, callback });
        let slot = match chain.free.pop() {
            Some(slot) => {
                chain.slots[slot] = entry;
                slot
            }
            None => {
                chain.slots.push(entry);
                chain.slots.len() - 1
            }
        };
        chain.live += 1;

        SubscriberId { kind, slot, serial }
    }

    /// Returns false when the handle was already removed.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let chain = &mut self.chains[id.kind.index()];
        let Some(slot) = chain.slots.get_mut(id.slot) else {
            return false;
        };
        if !matches!(slot, Some(entry) if entry.serial == id.serial) {
            return false;
        }
        *slot = None;
        chain.free.push(id.slot);
        chain.live -= 1;
        true
    }

    /// Live callbacks for `kind`, oldest subscription first.
    pub fn callbacks(&self, kind: EventKind) -> Vec<Callback> {
        let mut entries: Vec<&Entry> = self.chains[kind.index()].slots.iter().flatten().collect();
        entries.sort_unstable_by_key(|entry| entry.serial);
        entries.into_iter().map(|entry| entry.callback.clone()).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.chains[kind.index()].live
    }
}
