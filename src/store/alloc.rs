//! Bump allocation for the entry region and the overflow header.
//!
//! Both resources are handed out monotonically and never reclaimed: an
//! entry range backs exactly one published adjacency list and an overflow
//! bucket is claimed by exactly one chain. Lock-free bounded counters give
//! every caller a disjoint range in a total order, which is also what
//! guarantees chains can never form cycles (a freshly claimed bucket was
//! never reachable before its chain cell is written).

use std::sync::atomic::Ordering;

use eyre::{eyre, Result};

use super::GraphStore;

impl GraphStore {
    /// Reserves `n` contiguous entries, returning the offset of the first.
    pub(crate) fn alloc_entries(&self, n: u64) -> Result<u64> {
        self.last_entry
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                used.checked_add(n)
                    .filter(|&end| end <= self.geo.num_entries)
            })
            .map_err(|used| {
                eyre!(
                    "entry region exhausted: {} of {} entries in use, {} more requested",
                    used,
                    self.geo.num_entries,
                    n
                )
            })
    }

    /// Claims the next unused overflow bucket, returning its bucket id.
    pub(crate) fn alloc_overflow_bucket(&self) -> Result<u64> {
        let claimed = self
            .last_ext
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                (used < self.geo.num_buckets_ext).then_some(used + 1)
            })
            .map_err(|_| {
                eyre!(
                    "overflow buckets exhausted: all {} in use",
                    self.geo.num_buckets_ext
                )
            })?;
        Ok(self.geo.num_buckets + claimed)
    }
}
