//! # Store Configuration
//!
//! Sizing and behaviour switches for a peer's graph store, plus the
//! geometry derivation that turns the user-facing sizing knobs into the
//! concrete region layout.
//!
//! The user configures two sizes: how many key slots to provision
//! (`num_keys_million`) and how large the pinned memory region is
//! (`memstore_size_gb`). Everything else is derived:
//!
//! ```text
//! num_slots       = num_keys_million * 10^6
//! total buckets   = num_slots / ASSOCIATIVITY
//! num_buckets     = total buckets * MAIN_RATIO / 100     (main header)
//! num_buckets_ext = total buckets - num_buckets          (overflow header)
//! num_entries     = (region bytes - num_slots * 16) / 8  (entry region)
//! ```
//!
//! The derivation fails up front when the region cannot hold the key region
//! plus a non-empty entry region; there is no way to recover from an
//! undersized region at run time because the layout never grows.

pub mod constants;

use eyre::{ensure, Result};

use constants::{ASSOCIATIVITY, EDGE_BYTES, MAIN_RATIO, SLOT_BYTES};

const GIB: u64 = 1 << 30;

/// Behaviour switches and sizing knobs for one peer.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// Key-region capacity in millions of slots.
    pub num_keys_million: u64,
    /// Size of the pinned memory region in GiB.
    pub memstore_size_gb: u64,
    /// Number of peers in the cluster.
    pub num_servers: usize,
    /// Worker threads used for region init and the index scan.
    pub num_engines: usize,
    /// Cache descriptors fetched from remote peers.
    pub enable_caching: bool,
    /// Also build per-vertex predicate rows and the global vertex and
    /// predicate sets. Costs extra entry space.
    pub versatile: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            num_keys_million: 1,
            memstore_size_gb: 1,
            num_servers: 1,
            num_engines: 4,
            enable_caching: true,
            versatile: false,
        }
    }
}

impl StoreConfig {
    pub fn num_slots(&self) -> u64 {
        self.num_keys_million * 1_000_000
    }

    pub fn region_bytes(&self) -> usize {
        (self.memstore_size_gb * GIB) as usize
    }

    /// Derives the region layout for this configuration.
    pub fn geometry(&self) -> Result<Geometry> {
        Geometry::with_slots(self.num_slots(), self.region_bytes())
    }
}

/// Concrete layout of one peer's memory region. Identical on every peer of
/// a cluster; remote reads compute offsets from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Total key slots (main and overflow headers together).
    pub num_slots: u64,
    /// Buckets in the main header.
    pub num_buckets: u64,
    /// Buckets in the overflow header.
    pub num_buckets_ext: u64,
    /// Capacity of the entry region, in entries.
    pub num_entries: u64,
    /// Bytes of region actually used by the layout above.
    pub region_bytes: usize,
}

impl Geometry {
    /// Derives a layout from a raw slot count and region size. The public
    /// sizing path goes through [`StoreConfig::geometry`]; this constructor
    /// exists for small deployments and tests that need exact bucket or
    /// entry counts.
    pub fn with_slots(num_slots: u64, region_bytes: usize) -> Result<Self> {
        let total_buckets = num_slots / ASSOCIATIVITY as u64;
        let num_buckets = total_buckets * MAIN_RATIO / 100;
        ensure!(
            num_buckets >= 1,
            "key region with {} slots has no main-header bucket (need at least {})",
            num_slots,
            2 * ASSOCIATIVITY
        );
        let num_buckets_ext = total_buckets - num_buckets;

        let key_bytes = num_slots as usize * SLOT_BYTES;
        ensure!(
            region_bytes > key_bytes,
            "memory region too small: {} bytes cannot hold {} key slots plus an entry region",
            region_bytes,
            num_slots
        );
        let num_entries = ((region_bytes - key_bytes) / EDGE_BYTES) as u64;
        ensure!(
            num_entries >= 1,
            "memory region too small: no room for entries after {} key slots",
            num_slots
        );

        Ok(Self {
            num_slots,
            num_buckets,
            num_buckets_ext,
            num_entries,
            region_bytes: key_bytes + num_entries as usize * EDGE_BYTES,
        })
    }

    /// Layout sized for an exact entry-region capacity. Test convenience.
    pub fn with_entries(num_slots: u64, num_entries: u64) -> Result<Self> {
        let bytes = num_slots as usize * SLOT_BYTES + num_entries as usize * EDGE_BYTES;
        let geo = Self::with_slots(num_slots, bytes)?;
        debug_assert_eq!(geo.num_entries, num_entries);
        Ok(geo)
    }

    pub fn total_buckets(&self) -> u64 {
        self.num_buckets + self.num_buckets_ext
    }

    /// Byte offset of the entry region within the memory region.
    pub fn entry_base(&self) -> u64 {
        self.num_slots * SLOT_BYTES as u64
    }
}
