//! # Graph Store Core
//!
//! One peer's share of the partitioned RDF adjacency store. The peer owns
//! a pinned memory region laid out as two sub-regions:
//!
//! ```text
//! [ slot 0 .. slot num_slots-1 | entry 0 .. entry num_entries-1 ]
//!  └──────── key region ──────┘ └──────── entry region ────────┘
//! ```
//!
//! The key region is a cluster-chained hash table with bucket
//! associativity: every bucket holds `ASSOCIATIVITY` slots of which the
//! last is a chain cell linking to an overflow bucket. The entry region is
//! a bump-allocated arena of adjacency lists. A slot's descriptor points
//! at its list; once published, both the slot and the list are immutable.
//!
//! Rows come in two classes, stored uniformly:
//!
//! - normal rows, keyed `(vid, dir, pid)`, hold the neighbours of `vid`
//!   under predicate `pid` in direction `dir` (with `pid = TYPE_ID` the
//!   row holds the vertex's types, and under the versatile switch
//!   `pid = PREDICATE_ID` holds the vertex's predicate set);
//! - index rows, keyed `(0, dir, pid)`, hold every vid that participates
//!   in `pid` (or carries type `pid`), built by [`GraphStore::insert_index`]
//!   after ingest.
//!
//! Data is partitioned, not replicated: vertex `vid` lives on peer
//! `vid % num_servers`. Lookups for vertices owned elsewhere walk the
//! remote peer's key region through one-sided reads and copy the matching
//! adjacency list out of its entry region; a small striped cache
//! short-circuits repeated remote descriptor walks.
//!
//! ## Build Then Read
//!
//! The store has two globally ordered phases. During the build phase
//! ([`GraphStore::insert_normal`] on every peer, then
//! [`GraphStore::insert_index`] on every peer) rows are published under a
//! virtualized bucket-lock stripe. After the build phase the regions are
//! effectively read-only and every lookup path is lock-free locally.
//! Readers are safe even while rows are still being published: a
//! descriptor word is stored before its key word is released, so any
//! reader that observes a non-empty key observes the complete row.
//!
//! ## Module Organization
//!
//! - `region`: the pinned memory region and its word-atomic views
//! - `wire`: the 16-byte slot wire struct shared with remote readers
//! - `htable`: chained-hash publication and the local and remote walks
//! - `alloc`: bump allocation of entry ranges and overflow buckets
//! - `ingest`: normal-row construction from sorted triple batches
//! - `indexer`: predicate/type index construction
//! - `cache`: striped cache for remotely fetched descriptors

mod alloc;
mod cache;
mod htable;
mod indexer;
mod ingest;
mod region;
pub(crate) mod wire;

pub use region::MemRegion;

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use eyre::{ensure, Result};
use parking_lot::Mutex;
use tracing::info;

use crate::config::constants::{
    ASSOCIATIVITY, NUM_BUCKET_LOCKS, SLOT_BYTES, TYPE_ID,
};
use crate::config::{Geometry, StoreConfig};
use crate::encoding::{owner_of, Dir, EntryRef, TripleKey};
use crate::transport::Transport;
use cache::ReadCache;

/// One peer's partitioned adjacency store.
pub struct GraphStore {
    sid: usize,
    num_servers: usize,
    num_engines: usize,
    versatile: bool,
    geo: Geometry,
    region: Arc<MemRegion>,
    transport: Arc<dyn Transport>,
    /// Virtualized bucket locks: insert serializes per head bucket modulo
    /// the stripe count.
    bucket_locks: Vec<Mutex<()>>,
    /// Entries handed out so far; grows monotonically up to `num_entries`.
    last_entry: AtomicU64,
    /// Overflow buckets handed out so far.
    last_ext: AtomicU64,
    cache: ReadCache,
    /// Per-engine scratch for one-sided reads.
    scratch: Vec<Mutex<Vec<u8>>>,
}

impl GraphStore {
    /// Binds a store to its region, deriving the layout from the sizing
    /// knobs and the actual region size.
    pub fn new(
        cfg: &StoreConfig,
        sid: usize,
        region: Arc<MemRegion>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let geo = Geometry::with_slots(cfg.num_slots(), region.len())?;
        Self::with_geometry(cfg, geo, sid, region, transport)
    }

    /// Binds a store to its region with an explicit layout.
    pub fn with_geometry(
        cfg: &StoreConfig,
        geo: Geometry,
        sid: usize,
        region: Arc<MemRegion>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        ensure!(cfg.num_servers >= 1, "cluster needs at least one server");
        ensure!(
            sid < cfg.num_servers,
            "server id {} outside cluster of {}",
            sid,
            cfg.num_servers
        );
        ensure!(cfg.num_engines >= 1, "store needs at least one engine");
        ensure!(
            region.len() >= geo.region_bytes,
            "memory region too small: {} bytes mapped, layout needs {}",
            region.len(),
            geo.region_bytes
        );

        Ok(Self {
            sid,
            num_servers: cfg.num_servers,
            num_engines: cfg.num_engines,
            versatile: cfg.versatile,
            geo,
            region,
            transport,
            bucket_locks: (0..NUM_BUCKET_LOCKS).map(|_| Mutex::new(())).collect(),
            last_entry: AtomicU64::new(0),
            last_ext: AtomicU64::new(0),
            cache: ReadCache::new(cfg.enable_caching),
            scratch: (0..cfg.num_engines).map(|_| Mutex::new(Vec::new())).collect(),
        })
    }

    /// Zeroes the key region and resets the allocators, making the store
    /// ready for a (re)build. Runs `num_engines` workers over disjoint
    /// chunks.
    pub fn init(&self) {
        let key_words = (self.geo.num_slots * 2) as usize;
        let words = &self.region.words()[..key_words];
        let chunk = key_words.div_ceil(self.num_engines).max(1);

        std::thread::scope(|scope| {
            for part in words.chunks(chunk) {
                scope.spawn(move || {
                    for word in part {
                        word.store(0, Ordering::Relaxed);
                    }
                });
            }
        });

        self.last_entry.store(0, Ordering::Relaxed);
        self.last_ext.store(0, Ordering::Relaxed);
    }

    pub fn server_id(&self) -> usize {
        self.sid
    }

    pub fn geometry(&self) -> Geometry {
        self.geo
    }

    /// Adjacency list of `vid` under `pid` in direction `dir`, wherever
    /// the owning peer is. Local hits borrow the entry region; remote hits
    /// are copied out of the owner's region.
    pub fn get_edges_global(
        &self,
        tid: usize,
        vid: u64,
        dir: Dir,
        pid: u64,
    ) -> Result<Cow<'_, [u64]>> {
        let owner = self.owner(vid);
        if owner == self.sid {
            Ok(Cow::Borrowed(self.get_edges_local(vid, dir, pid)))
        } else {
            let key = TripleKey::new(vid, dir, pid);
            Ok(Cow::Owned(self.get_edges_remote(tid, owner, key)?))
        }
    }

    /// Adjacency list of a locally owned row; empty when the key is
    /// absent. Zero-copy: the slice borrows the entry region.
    pub fn get_edges_local(&self, vid: u64, dir: Dir, pid: u64) -> &[u64] {
        match self.lookup_local(TripleKey::new(vid, dir, pid)) {
            Some(slot) => self.edge_slice(slot.entry()),
            None => &[],
        }
    }

    /// This peer's partition of the index row for `pid` in `dir`.
    pub fn get_index_edges_local(&self, pid: u64, dir: Dir) -> &[u64] {
        self.get_edges_local(0, dir, pid)
    }

    /// Occupancy snapshot of both regions. Read-only; logged at info.
    pub fn report_usage(&self) -> StoreUsage {
        let count_data_slots = |buckets: std::ops::Range<u64>| -> u64 {
            let mut used = 0;
            for bucket in buckets {
                let base = bucket * ASSOCIATIVITY as u64;
                for i in 0..(ASSOCIATIVITY - 1) as u64 {
                    if self.key_word(base + i).load(Ordering::Relaxed) != 0 {
                        used += 1;
                    }
                }
            }
            used
        };

        let usage = StoreUsage {
            main_slots: self.geo.num_buckets * ASSOCIATIVITY as u64,
            main_used: count_data_slots(0..self.geo.num_buckets),
            ext_slots: self.geo.num_buckets_ext * ASSOCIATIVITY as u64,
            ext_used: count_data_slots(self.geo.num_buckets..self.geo.total_buckets()),
            ext_buckets: self.geo.num_buckets_ext,
            ext_buckets_used: self.last_ext.load(Ordering::Relaxed),
            entries: self.geo.num_entries,
            entries_used: self.last_entry.load(Ordering::Relaxed),
            vertices: self
                .versatile
                .then(|| self.get_index_edges_local(TYPE_ID, Dir::In).len() as u64),
            predicates: self
                .versatile
                .then(|| self.get_index_edges_local(TYPE_ID, Dir::Out).len() as u64),
        };

        info!(
            main_mib = (usage.main_slots * SLOT_BYTES as u64) >> 20,
            main_used_pct = format_args!("{:.1}", usage.main_used_percent()),
            ext_mib = (usage.ext_slots * SLOT_BYTES as u64) >> 20,
            ext_used_pct = format_args!("{:.1}", usage.ext_used_percent()),
            ext_buckets_pct = format_args!("{:.1}", usage.ext_buckets_percent()),
            entries_used_pct = format_args!("{:.1}", usage.entries_percent()),
            vertices = usage.vertices,
            predicates = usage.predicates,
            "graph store usage"
        );
        usage
    }

    // ------------------------------------------------------------------
    // Region views shared by the build and read paths
    // ------------------------------------------------------------------

    pub(crate) fn owner(&self, vid: u64) -> usize {
        owner_of(vid, self.num_servers)
    }

    /// Key word of slot `slot_id`.
    pub(crate) fn key_word(&self, slot_id: u64) -> &AtomicU64 {
        &self.region.words()[slot_id as usize * 2]
    }

    /// Descriptor word of slot `slot_id`.
    pub(crate) fn entry_word(&self, slot_id: u64) -> &AtomicU64 {
        &self.region.words()[slot_id as usize * 2 + 1]
    }

    /// Writes one adjacency entry. The index must lie in a range handed
    /// out by `alloc_entries` and not yet published.
    pub(crate) fn write_edge(&self, idx: u64, value: u64) {
        debug_assert!(idx < self.geo.num_entries);
        let base = (self.geo.num_slots * 2) as usize;
        self.region.words()[base + idx as usize].store(value, Ordering::Relaxed);
    }

    /// The published adjacency list a descriptor points at.
    pub(crate) fn edge_slice(&self, entry: EntryRef) -> &[u64] {
        if entry.count == 0 {
            return &[];
        }
        let base = (self.geo.num_slots * 2 + entry.off) as usize;
        let words = &self.region.words()[base..base + entry.count as usize];
        // SAFETY:
        // 1. AtomicU64 and u64 share size, alignment and representation.
        // 2. The range was published through a Release store of its key
        //    word and the caller reached the descriptor through an Acquire
        //    load, so every entry write happened-before this read.
        // 3. Published entry ranges are never written again (the bump
        //    allocator hands out each offset once).
        unsafe { std::slice::from_raw_parts(words.as_ptr().cast::<u64>(), words.len()) }
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn scratch(&self, tid: usize) -> &Mutex<Vec<u8>> {
        &self.scratch[tid % self.scratch.len()]
    }

    pub(crate) fn cache(&self) -> &ReadCache {
        &self.cache
    }

    pub(crate) fn is_versatile(&self) -> bool {
        self.versatile
    }

    pub(crate) fn engines(&self) -> usize {
        self.num_engines
    }
}

/// Occupancy counters produced by [`GraphStore::report_usage`].
#[derive(Debug, Clone)]
pub struct StoreUsage {
    pub main_slots: u64,
    pub main_used: u64,
    pub ext_slots: u64,
    pub ext_used: u64,
    pub ext_buckets: u64,
    pub ext_buckets_used: u64,
    pub entries: u64,
    pub entries_used: u64,
    /// Distinct vertices, from the versatile vertex set row.
    pub vertices: Option<u64>,
    /// Distinct predicates, from the versatile predicate set row.
    pub predicates: Option<u64>,
}

impl StoreUsage {
    fn percent(used: u64, total: u64) -> f64 {
        if total == 0 {
            return 0.0;
        }
        used as f64 * 100.0 / total as f64
    }

    pub fn main_used_percent(&self) -> f64 {
        Self::percent(self.main_used, self.main_slots)
    }

    pub fn ext_used_percent(&self) -> f64 {
        Self::percent(self.ext_used, self.ext_slots)
    }

    pub fn ext_buckets_percent(&self) -> f64 {
        Self::percent(self.ext_buckets_used, self.ext_buckets)
    }

    pub fn entries_percent(&self) -> f64 {
        Self::percent(self.entries_used, self.entries)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::small_store;
    use super::*;
    use crate::config::constants::MIN_NORMAL_VID;
    use crate::triple::Triple;

    const V: u64 = MIN_NORMAL_VID;

    #[test]
    fn usage_counts_slots_and_entries() {
        let store = small_store(1600, 100);
        let spo = [Triple::new(V + 1, 7, V + 2), Triple::new(V + 1, 8, V + 3)];
        let ops = [Triple::new(V + 1, 7, V + 2), Triple::new(V + 1, 8, V + 3)];
        store.insert_normal(&spo, &ops).unwrap();

        let usage = store.report_usage();
        assert_eq!(usage.main_used + usage.ext_used, 4);
        assert_eq!(usage.entries_used, 4);
        assert_eq!(usage.entries, 100);
        assert!(usage.vertices.is_none());

        // Reporting twice changes nothing.
        let again = store.report_usage();
        assert_eq!(again.entries_used, usage.entries_used);
        assert_eq!(again.main_used, usage.main_used);
    }

    #[test]
    fn init_clears_previous_rows() {
        let store = small_store(1600, 100);
        let spo = [Triple::new(V + 1, 7, V + 2)];
        let ops = [Triple::new(V + 1, 7, V + 2)];
        store.insert_normal(&spo, &ops).unwrap();
        assert_eq!(store.get_edges_local(V + 1, Dir::Out, 7), &[V + 2]);

        store.init();
        assert!(store.get_edges_local(V + 1, Dir::Out, 7).is_empty());
        assert_eq!(store.report_usage().entries_used, 0);
    }

    #[test]
    fn unknown_key_is_an_empty_slice() {
        let store = small_store(1600, 100);
        assert!(store.get_edges_local(V + 9, Dir::Out, 3).is_empty());
        assert!(store.get_index_edges_local(3, Dir::In).is_empty());
    }
}
