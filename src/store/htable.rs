//! # Cluster-Chained Hash Table
//!
//! The key region is an open-addressed hash table with bucket
//! associativity and chaining. A key hashes to one of the main-header
//! buckets; when all seven data slots of a bucket are taken, the bucket's
//! chain cell links to a freshly allocated overflow-header bucket and the
//! walk continues there. Chains never merge: an overflow bucket is claimed
//! by exactly one chain, and the bump allocator never hands a bucket out
//! twice, so walks terminate.
//!
//! ## Locking
//!
//! Insertion takes one lock from a fixed stripe of `NUM_BUCKET_LOCKS`,
//! selected by head bucket id. The lock covers the whole chain walk, so
//! two inserts into the same chain serialize while inserts into chains
//! with different congruent classes proceed in parallel. Overflow-bucket
//! allocation nests a lock-free counter claim inside the critical section.
//!
//! ## Lock-Free Readers
//!
//! Lookup never takes a lock. Publication order makes that sound:
//!
//! 1. entries are written into the entry region,
//! 2. the descriptor word is stored into the slot,
//! 3. the key word is stored with Release.
//!
//! A reader loads key words with Acquire; matching a non-empty key
//! therefore implies the descriptor and every entry behind it are visible.
//! Chain cells follow the same discipline: the first slot of a new
//! overflow bucket is published before the chain cell that makes the
//! bucket reachable.
//!
//! ## Remote Walks
//!
//! A key owned by another peer is resolved by reading whole buckets out of
//! the owner's key region with one-sided reads, following chain cells
//! exactly like the local walk. Every peer derives the same geometry and
//! bucket hash, so offsets computed locally are valid remotely. Hits are
//! cached; the expected walk is a single bucket read at sane load factors.

use std::sync::atomic::Ordering;

use eyre::{bail, ensure, Result};

use crate::config::constants::{ASSOCIATIVITY, BUCKET_BYTES, EDGE_BYTES, NUM_BUCKET_LOCKS};
use crate::encoding::{Dir, EntryRef, TripleKey};
use crate::store::wire::{parse_entries, Slot};
use crate::store::GraphStore;

const DATA_SLOTS: u64 = ASSOCIATIVITY as u64 - 1;

impl GraphStore {
    /// Publishes a row: finds a free slot reachable from the key's head
    /// bucket, stores the descriptor, then releases the key word. Returns
    /// the slot id. Fails on a duplicate key or overflow exhaustion.
    pub(crate) fn publish_row(&self, key: TripleKey, entry: EntryRef) -> Result<u64> {
        let word = key.encode();
        ensure!(word != 0, "cannot publish the reserved empty key");

        let head = key.bucket_hash() % self.geo.num_buckets;
        let _chain_guard = self.bucket_locks[(head % NUM_BUCKET_LOCKS as u64) as usize].lock();

        let mut bucket = head;
        loop {
            debug_assert!(bucket < self.geo.total_buckets());
            let base = bucket * ASSOCIATIVITY as u64;

            for slot_id in base..base + DATA_SLOTS {
                let occupant = self.key_word(slot_id).load(Ordering::Relaxed);
                if occupant == word {
                    bail!("duplicate key published: {:?}", key);
                }
                if occupant == 0 {
                    self.entry_word(slot_id).store(entry.encode(), Ordering::Relaxed);
                    self.key_word(slot_id).store(word, Ordering::Release);
                    return Ok(slot_id);
                }
            }

            let chain_cell = self.key_word(base + DATA_SLOTS);
            let link = chain_cell.load(Ordering::Relaxed);
            if link != 0 {
                bucket = TripleKey::decode(link).vid;
                continue;
            }

            // Chain end with a full bucket: claim a fresh overflow bucket,
            // publish the row into its first slot, then link it. Readers
            // that see the link find the row already in place.
            let next = self.alloc_overflow_bucket()?;
            let slot_id = next * ASSOCIATIVITY as u64;
            self.entry_word(slot_id).store(entry.encode(), Ordering::Relaxed);
            self.key_word(slot_id).store(word, Ordering::Release);
            chain_cell.store(TripleKey::new(next, Dir::In, 0).encode(), Ordering::Release);
            return Ok(slot_id);
        }
    }

    /// Lock-free walk of the local key region.
    pub(crate) fn lookup_local(&self, key: TripleKey) -> Option<Slot> {
        let word = key.encode();
        let mut bucket = key.bucket_hash() % self.geo.num_buckets;
        loop {
            let base = bucket * ASSOCIATIVITY as u64;
            for slot_id in base..base + DATA_SLOTS {
                let occupant = self.key_word(slot_id).load(Ordering::Acquire);
                if occupant == word {
                    let entry = self.entry_word(slot_id).load(Ordering::Relaxed);
                    return Some(Slot::new(occupant, entry));
                }
            }
            let link = self.key_word(base + DATA_SLOTS).load(Ordering::Acquire);
            if link == 0 {
                return None;
            }
            bucket = TripleKey::decode(link).vid;
        }
    }

    /// Walks `peer`'s key region through one-sided bucket reads. Hits go
    /// through and into the descriptor cache.
    pub(crate) fn lookup_remote(
        &self,
        tid: usize,
        peer: usize,
        key: TripleKey,
    ) -> Result<Option<Slot>> {
        if let Some(cached) = self.cache().lookup(key) {
            return Ok(Some(cached));
        }

        let word = key.encode();
        let mut bucket = key.bucket_hash() % self.geo.num_buckets;
        let scratch = self.scratch(tid);
        let mut buf = scratch.lock();
        buf.resize(BUCKET_BYTES, 0);

        loop {
            self.transport()
                .remote_read(tid, peer, &mut buf[..], bucket * BUCKET_BYTES as u64)?;
            let slots = Slot::parse_bucket(&buf)?;

            for slot in &slots[..ASSOCIATIVITY - 1] {
                if slot.key_word() == word {
                    self.cache().insert(*slot);
                    return Ok(Some(*slot));
                }
            }
            match slots[ASSOCIATIVITY - 1].chain_next() {
                Some(next) => bucket = next,
                None => return Ok(None),
            }
        }
    }

    /// Resolves a remotely owned adjacency list: descriptor walk, then one
    /// read of the list out of the owner's entry region.
    pub(crate) fn get_edges_remote(
        &self,
        tid: usize,
        peer: usize,
        key: TripleKey,
    ) -> Result<Vec<u64>> {
        let slot = match self.lookup_remote(tid, peer, key)? {
            Some(slot) => slot,
            None => return Ok(Vec::new()),
        };
        let entry = slot.entry();
        if entry.is_empty() {
            return Ok(Vec::new());
        }

        let bytes = entry.count as usize * EDGE_BYTES;
        let src = self.geo.entry_base() + entry.off * EDGE_BYTES as u64;
        let scratch = self.scratch(tid);
        let mut buf = scratch.lock();
        buf.resize(bytes, 0);
        self.transport().remote_read(tid, peer, &mut buf[..], src)?;
        parse_entries(&buf, entry.count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::constants::MIN_NORMAL_VID;
    use crate::store::testing::small_store;

    const V: u64 = MIN_NORMAL_VID;

    #[test]
    fn published_row_is_found_at_its_slot() {
        let store = small_store(1600, 100);
        let key = TripleKey::new(V + 5, Dir::Out, 9);
        let entry = EntryRef::new(3, 17);

        let slot_id = store.publish_row(key, entry).unwrap();
        let found = store.lookup_local(key).unwrap();
        assert_eq!(found.key(), key);
        assert_eq!(found.entry(), entry);
        assert_eq!(
            store.key_word(slot_id).load(Ordering::Relaxed),
            key.encode()
        );
    }

    #[test]
    fn missing_key_is_absent() {
        let store = small_store(1600, 100);
        assert!(store.lookup_local(TripleKey::new(V + 5, Dir::In, 9)).is_none());
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let store = small_store(1600, 100);
        let key = TripleKey::new(V + 5, Dir::Out, 9);
        store.publish_row(key, EntryRef::new(1, 0)).unwrap();

        let err = store.publish_row(key, EntryRef::new(1, 1)).unwrap_err();
        assert!(err.to_string().contains("duplicate key"));
    }

    #[test]
    fn empty_key_is_rejected() {
        let store = small_store(1600, 100);
        let err = store
            .publish_row(TripleKey::new(0, Dir::In, 0), EntryRef::new(0, 0))
            .unwrap_err();
        assert!(err.to_string().contains("reserved empty key"));
    }

    #[test]
    fn eighth_insert_into_one_bucket_spills_into_overflow() {
        // One main bucket: every key chains off bucket 0.
        let store = small_store(16, 100);
        let keys: Vec<_> = (0..8).map(|i| TripleKey::new(V + i, Dir::Out, 2)).collect();

        for (i, key) in keys.iter().enumerate() {
            store.publish_row(*key, EntryRef::new(1, i as u64)).unwrap();
        }

        // Seven data slots in bucket 0, the eighth row in overflow bucket 1.
        assert_eq!(store.last_ext.load(Ordering::Relaxed), 1);
        for (i, key) in keys.iter().enumerate() {
            let found = store.lookup_local(*key).unwrap();
            assert_eq!(found.entry().off, i as u64);
        }
    }

    #[test]
    fn seven_inserts_do_not_allocate_overflow() {
        let store = small_store(16, 100);
        for i in 0..7 {
            store
                .publish_row(TripleKey::new(V + i, Dir::Out, 2), EntryRef::new(1, i))
                .unwrap();
        }
        assert_eq!(store.last_ext.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn chains_extend_across_multiple_overflow_buckets() {
        // 80 slots: 10 buckets, 8 main + 2 overflow. Steer 15 keys onto
        // one head bucket so its chain must span both overflow buckets.
        let store = small_store(80, 100);
        let head = TripleKey::new(V, Dir::Out, 2).bucket_hash() % store.geo.num_buckets;

        let mut keys = Vec::new();
        let mut vid = V;
        while keys.len() < 15 {
            let key = TripleKey::new(vid, Dir::Out, 2);
            if key.bucket_hash() % store.geo.num_buckets == head {
                keys.push(key);
            }
            vid += 1;
        }

        for (i, key) in keys.iter().enumerate() {
            store.publish_row(*key, EntryRef::new(1, i as u64)).unwrap();
        }

        assert_eq!(store.last_ext.load(Ordering::Relaxed), 2);
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(store.lookup_local(*key).unwrap().entry().off, i as u64);
        }
    }

    #[test]
    fn concurrent_publishes_with_distinct_keys_all_land() {
        let store = small_store(16_000, 4096);
        let per_thread = 200u64;

        std::thread::scope(|scope| {
            for t in 0..4u64 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..per_thread {
                        let vid = V + t * per_thread + i;
                        store
                            .publish_row(
                                TripleKey::new(vid, Dir::Out, 3),
                                EntryRef::new(0, 0),
                            )
                            .unwrap();
                    }
                });
            }
        });

        for vid in V..V + 4 * per_thread {
            assert!(
                store.lookup_local(TripleKey::new(vid, Dir::Out, 3)).is_some(),
                "vid {vid} lost"
            );
        }
    }
}
