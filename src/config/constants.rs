//! # Store Format Constants
//!
//! This module centralizes the constants that define the in-memory store
//! format. Everything here is part of the cross-peer contract: remote peers
//! compute slot offsets and bucket indexes from these values, so every peer
//! in a cluster must be built with identical constants. Interdependent
//! values are co-located and checked with compile-time assertions.
//!
//! ## Dependency Graph
//!
//! ```text
//! ASSOCIATIVITY (8)
//!       │
//!       ├─> slots per bucket; the last slot of each bucket is the chain
//!       │   cell, leaving ASSOCIATIVITY - 1 data slots
//!       │
//!       └─> BUCKET_BYTES (derived: ASSOCIATIVITY * SLOT_BYTES), the unit
//!           of a one-sided bucket read
//!
//! PID_BITS (17) + DIR_BITS (1) + VID_BITS (46) == 64
//!       │
//!       └─> MIN_NORMAL_VID (derived: 1 << PID_BITS)
//!             Identifiers below this are predicates/types; identifiers at
//!             or above it are subjects/objects.
//!
//! ENTRY_OFF_BITS (36) + ENTRY_COUNT_BITS (28) == 64
//!       │
//!       └─> caps the entry region at 2^36 entries and a single adjacency
//!           list at 2^28 entries
//! ```
//!
//! ## Modifying Constants
//!
//! Changing any value here is a format change: stores built with different
//! constants cannot read each other's regions. Bump all peers together.

/// Slots per hash bucket. The final slot of every bucket is reserved as the
/// chain cell pointing at the next bucket of the chain.
pub const ASSOCIATIVITY: usize = 8;

/// Percentage of all buckets placed in the main header; the remainder forms
/// the overflow header used for chain extension.
pub const MAIN_RATIO: u64 = 80;

/// Number of virtualized bucket locks. Concurrent inserts contend only when
/// their head buckets are congruent modulo this count. A fixed count keeps
/// behaviour reproducible across configurations.
pub const NUM_BUCKET_LOCKS: usize = 1024;

/// Slots in the remote-read cache (single descriptor per slot).
pub const CACHE_SLOTS: usize = 100_000;

/// Bit widths of the packed key word: predicate id, direction, vertex id.
pub const PID_BITS: u32 = 17;
pub const DIR_BITS: u32 = 1;
pub const VID_BITS: u32 = 64 - PID_BITS - DIR_BITS;

/// Bit widths of the packed descriptor word: entry-region offset and count.
pub const ENTRY_OFF_BITS: u32 = 36;
pub const ENTRY_COUNT_BITS: u32 = 64 - ENTRY_OFF_BITS;

/// Reserved predicate-position identifiers.
pub const PREDICATE_ID: u64 = 0;
pub const TYPE_ID: u64 = 1;

/// Smallest identifier a subject/object may carry. Predicate and type
/// identifiers are always below this boundary, which is exactly what the
/// pid field of a packed key can hold.
pub const MIN_NORMAL_VID: u64 = 1 << PID_BITS;

/// On-wire sizes of one key slot and one adjacency entry.
pub const SLOT_BYTES: usize = 16;
pub const EDGE_BYTES: usize = 8;

/// Bytes covered by a single one-sided bucket read.
pub const BUCKET_BYTES: usize = ASSOCIATIVITY * SLOT_BYTES;

const _: () = assert!(
    PID_BITS + DIR_BITS + VID_BITS == 64,
    "key bit widths must fill one 64-bit word"
);

const _: () = assert!(
    ENTRY_OFF_BITS + ENTRY_COUNT_BITS == 64,
    "descriptor bit widths must fill one 64-bit word"
);

const _: () = assert!(
    ASSOCIATIVITY >= 2,
    "a bucket needs at least one data slot next to the chain cell"
);

const _: () = assert!(MAIN_RATIO >= 1 && MAIN_RATIO < 100);

const _: () = assert!(NUM_BUCKET_LOCKS > 0 && CACHE_SLOTS > 0);
