//! # Predicate and Type Indexes
//!
//! After every peer finishes normal ingest, each peer scans its own key
//! region once and derives the index rows that let the query layer open a
//! pattern on an unknown endpoint with a single lookup:
//!
//! - `(0, IN, p)`: subjects that have an outgoing `p` edge
//! - `(0, OUT, p)`: objects that have an incoming `p` edge
//! - `(0, IN, t)`: vertices of type `t`
//!
//! and, under the versatile switch, the global sets published at
//! `(0, IN, TYPE_ID)` (all vertices) and `(0, OUT, TYPE_ID)` (all
//! predicates).
//!
//! The scan classifies every occupied data slot by its key. A normal row
//! `(v, OUT, p)` proves `v` is a subject of `p`; `(v, IN, p)` proves `v`
//! is an object of `p`; `(v, OUT, TYPE_ID)` contributes `v` to the type
//! index of every type in its entry list. A row `(v, IN, TYPE_ID)` cannot
//! exist because ingest diverts type triples away from the object side;
//! finding one means the region is corrupt and the build aborts.
//!
//! The scan fans out over `num_engines` workers into concurrent maps,
//! then the collected buckets are published through the same hash-table
//! primitive as every other row, so lookups need no special casing for
//! index rows.

use std::sync::atomic::Ordering;
use std::time::Instant;

use dashmap::{DashMap, DashSet};
use eyre::{bail, Result};
use tracing::{debug, info};

use crate::config::constants::{ASSOCIATIVITY, PREDICATE_ID, TYPE_ID};
use crate::encoding::{Dir, EntryRef, TripleKey};
use crate::store::GraphStore;

impl GraphStore {
    /// Derives and publishes the index rows. Called exactly once per peer,
    /// after every peer's [`GraphStore::insert_normal`] completed.
    pub fn insert_index(&self) -> Result<()> {
        let scan_start = Instant::now();

        let pidx_in: DashMap<u64, Vec<u64>> = DashMap::new();
        let pidx_out: DashMap<u64, Vec<u64>> = DashMap::new();
        let tidx: DashMap<u64, Vec<u64>> = DashMap::new();
        let vertex_set: DashSet<u64> = DashSet::new();
        let predicate_set: DashSet<u64> = DashSet::new();

        let total = self.geo.total_buckets();
        let chunk = total.div_ceil(self.engines() as u64).max(1);

        std::thread::scope(|scope| {
            let mut workers = Vec::new();
            let (pidx_in, pidx_out, tidx) = (&pidx_in, &pidx_out, &tidx);
            let (vertex_set, predicate_set) = (&vertex_set, &predicate_set);

            let mut lo = 0;
            while lo < total {
                let hi = (lo + chunk).min(total);
                workers.push(scope.spawn(move || {
                    self.scan_buckets(lo..hi, pidx_in, pidx_out, tidx, vertex_set, predicate_set)
                }));
                lo = hi;
            }

            workers.into_iter().try_for_each(|w| match w.join() {
                Ok(result) => result,
                Err(_) => bail!("index scan worker panicked"),
            })
        })?;

        debug!(
            elapsed_ms = scan_start.elapsed().as_millis() as u64,
            predicates_in = pidx_in.len(),
            predicates_out = pidx_out.len(),
            types = tidx.len(),
            "classified key region"
        );

        let publish_start = Instant::now();
        self.publish_index_map(tidx, Dir::In)?;
        self.publish_index_map(pidx_in, Dir::In)?;
        self.publish_index_map(pidx_out, Dir::Out)?;
        if self.is_versatile() {
            self.publish_index_set(vertex_set, Dir::In)?;
            self.publish_index_set(predicate_set, Dir::Out)?;
        }

        info!(
            scan_ms = scan_start.elapsed().as_millis() as u64,
            publish_ms = publish_start.elapsed().as_millis() as u64,
            "index rows published"
        );
        Ok(())
    }

    fn scan_buckets(
        &self,
        buckets: std::ops::Range<u64>,
        pidx_in: &DashMap<u64, Vec<u64>>,
        pidx_out: &DashMap<u64, Vec<u64>>,
        tidx: &DashMap<u64, Vec<u64>>,
        vertex_set: &DashSet<u64>,
        predicate_set: &DashSet<u64>,
    ) -> Result<()> {
        for bucket in buckets {
            let base = bucket * ASSOCIATIVITY as u64;
            for slot_id in base..base + ASSOCIATIVITY as u64 - 1 {
                let word = self.key_word(slot_id).load(Ordering::Acquire);
                if word == 0 {
                    continue;
                }
                let key = TripleKey::decode(word);
                let entry = EntryRef::decode(self.entry_word(slot_id).load(Ordering::Relaxed));

                match (key.dir, key.pid) {
                    (_, PREDICATE_ID) => {
                        if self.is_versatile() {
                            vertex_set.insert(key.vid);
                            for &p in self.edge_slice(entry) {
                                predicate_set.insert(p);
                            }
                        }
                    }
                    (Dir::In, TYPE_ID) => {
                        bail!(
                            "corrupt state: incoming type row for vid {} in the key region",
                            key.vid
                        );
                    }
                    (Dir::Out, TYPE_ID) => {
                        for &t in self.edge_slice(entry) {
                            tidx.entry(t).or_default().push(key.vid);
                        }
                    }
                    (Dir::Out, pid) => {
                        pidx_in.entry(pid).or_default().push(key.vid);
                    }
                    (Dir::In, pid) => {
                        pidx_out.entry(pid).or_default().push(key.vid);
                    }
                }
            }
        }
        Ok(())
    }

    fn publish_index_map(&self, map: DashMap<u64, Vec<u64>>, dir: Dir) -> Result<()> {
        for (id, vids) in map {
            let off = self.alloc_entries(vids.len() as u64)?;
            for (i, vid) in vids.iter().enumerate() {
                self.write_edge(off + i as u64, *vid);
            }
            self.publish_row(
                TripleKey::new(0, dir, id),
                EntryRef::new(vids.len() as u64, off),
            )?;
        }
        Ok(())
    }

    fn publish_index_set(&self, set: DashSet<u64>, dir: Dir) -> Result<()> {
        let ids: Vec<u64> = set.into_iter().collect();
        let off = self.alloc_entries(ids.len() as u64)?;
        for (i, id) in ids.iter().enumerate() {
            self.write_edge(off + i as u64, *id);
        }
        self.publish_row(
            TripleKey::new(0, dir, TYPE_ID),
            EntryRef::new(ids.len() as u64, off),
        )?;
        Ok(())
    }
}
