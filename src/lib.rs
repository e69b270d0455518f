//! # tristore - Partitioned RDF Adjacency Store
//!
//! tristore is the storage core of a distributed RDF graph store: each
//! peer of a cluster keeps its shard of the graph in a pinned memory
//! region laid out so that every other peer can resolve adjacency lists
//! out of it with one-sided reads, no target CPU involved. The store is
//! load-once, read-many: triples are ingested and indexed in a build
//! phase, then served lock-free.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │        Lookup façade (GraphStore)         │
//! │   local zero-copy  /  remote via reads    │
//! ├─────────────────────┬─────────────────────┤
//! │  Ingest + Indexer   │   Remote desc cache │
//! ├─────────────────────┴─────────────────────┤
//! │   Chained associative hash table (keys)   │
//! │   Bump-allocated adjacency arena (entries)│
//! ├───────────────────────────────────────────┤
//! │     Pinned memory region (MemRegion)      │
//! ├───────────────────────────────────────────┤
//! │      Transport (one-sided remote reads)   │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tristore::{GraphStore, LoopbackTransport, MemRegion, StoreConfig};
//!
//! let cfg = StoreConfig::default();
//! let region = Arc::new(MemRegion::anon(cfg.region_bytes())?);
//! let transport = Arc::new(LoopbackTransport::new(vec![region.clone()]));
//!
//! let store = GraphStore::new(&cfg, 0, region, transport)?;
//! store.init();
//! store.insert_normal(&spo, &ops)?;   // sorted triple batches
//! store.insert_index()?;              // after every peer ingested
//!
//! let objects = store.get_edges_local(vid, tristore::Dir::Out, pid);
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: sizing knobs, derived region geometry, format constants
//! - [`encoding`]: bit-packed keys, descriptors, bucket hash, ownership
//! - [`triple`]: triple batches and their two sort orders
//! - [`store`]: the store core (regions, hash table, ingest, indexer)
//! - [`transport`]: the one-sided read seam and the in-process loopback

pub mod config;
pub mod encoding;
pub mod store;
pub mod transport;
pub mod triple;

pub use config::{Geometry, StoreConfig};
pub use encoding::{owner_of, Dir, EntryRef, TripleKey};
pub use store::{GraphStore, MemRegion, StoreUsage};
pub use transport::{LoopbackTransport, Transport};
pub use triple::{sort_ops, sort_spo, Triple};
