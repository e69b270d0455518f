//! # Remote Descriptor Cache
//!
//! Small striped cache in front of the remote lookup path. Each stripe is
//! one slot guarded by its own lock, so concurrent readers touching
//! different keys never contend and a hit costs one short critical
//! section. Insertion overwrites whatever occupied the stripe; because
//! descriptors are immutable once published, a cached entry can be stale
//! only in the sense of "evicted", never "wrong".
//!
//! Local lookups bypass the cache entirely; the key region itself is the
//! faster path there.

use parking_lot::Mutex;

use crate::config::constants::CACHE_SLOTS;
use crate::encoding::TripleKey;
use crate::store::wire::Slot;

pub(crate) struct ReadCache {
    enabled: bool,
    slots: Vec<Mutex<Slot>>,
}

impl ReadCache {
    pub fn new(enabled: bool) -> Self {
        Self::with_slots(enabled, CACHE_SLOTS)
    }

    pub fn with_slots(enabled: bool, num_slots: usize) -> Self {
        // A disabled cache never stores anything; skip the allocation.
        let slots = if enabled {
            (0..num_slots).map(|_| Mutex::new(Slot::EMPTY)).collect()
        } else {
            Vec::new()
        };
        Self { enabled, slots }
    }

    pub fn lookup(&self, key: TripleKey) -> Option<Slot> {
        if !self.enabled {
            return None;
        }
        let idx = (key.bucket_hash() % self.slots.len() as u64) as usize;
        let cached = *self.slots[idx].lock();
        (cached.key_word() == key.encode()).then_some(cached)
    }

    pub fn insert(&self, slot: Slot) {
        if !self.enabled {
            return;
        }
        let idx = (slot.key().bucket_hash() % self.slots.len() as u64) as usize;
        *self.slots[idx].lock() = slot;
    }
}
