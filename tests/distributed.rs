//! # Multi-Peer Loopback Integration Tests
//!
//! Runs a small cluster of stores in one process over the loopback
//! transport: every peer owns a shard of the triples, ingest and indexing
//! run per peer, and lookups for remotely owned vertices walk the owner's
//! key region through one-sided reads.
//!
//! ## Test Coverage
//!
//! 1. Global lookups return the owning peer's rows from any peer
//! 2. Remote results equal the owner's local results (cached and uncached)
//! 3. Unknown keys are empty everywhere
//! 4. Per-peer index partitions union to the full index

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tristore::{
    owner_of, sort_ops, sort_spo, Dir, Geometry, GraphStore, LoopbackTransport, MemRegion,
    StoreConfig, Triple,
};

const V: u64 = 1 << 17;

fn cluster(num_servers: usize, enable_caching: bool) -> Vec<GraphStore> {
    let geo = Geometry::with_entries(16_000, 4096).unwrap();
    let regions: Vec<Arc<MemRegion>> = (0..num_servers)
        .map(|_| Arc::new(MemRegion::anon(geo.region_bytes).unwrap()))
        .collect();
    let transport = Arc::new(LoopbackTransport::new(regions.clone()));
    let cfg = StoreConfig {
        num_servers,
        enable_caching,
        ..Default::default()
    };

    (0..num_servers)
        .map(|sid| {
            let store = GraphStore::with_geometry(
                &cfg,
                geo,
                sid,
                regions[sid].clone(),
                transport.clone(),
            )
            .unwrap();
            store.init();
            store
        })
        .collect()
}

/// Shards and builds: each peer ingests the spo triples whose subject it
/// owns and the ops triples whose object it owns, then indexes.
fn build_cluster(stores: &[GraphStore], triples: &[Triple]) {
    let n = stores.len();
    for store in stores {
        let sid = store.server_id();
        let mut spo: Vec<Triple> = triples
            .iter()
            .copied()
            .filter(|t| owner_of(t.s, n) == sid)
            .collect();
        sort_spo(&mut spo);
        let mut ops: Vec<Triple> = triples
            .iter()
            .copied()
            .filter(|t| owner_of(t.o, n) == sid)
            .collect();
        sort_ops(&mut ops);
        store.insert_normal(&spo, &ops).unwrap();
    }
    for store in stores {
        store.insert_index().unwrap();
    }
}

fn random_triples(seed: u64, count: usize) -> Vec<Triple> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            Triple::new(
                V + rng.gen_range(0..50),
                2 + rng.gen_range(0..5),
                V + rng.gen_range(0..50),
            )
        })
        .collect()
}

#[test]
fn every_peer_resolves_every_row() {
    let stores = cluster(3, true);
    let triples = random_triples(11, 300);
    build_cluster(&stores, &triples);

    for store in &stores {
        for t in &triples {
            let out = store.get_edges_global(0, t.s, Dir::Out, t.p).unwrap();
            assert!(out.contains(&t.o), "peer {} misses ({}, {}, {})", store.server_id(), t.s, t.p, t.o);
            let inc = store.get_edges_global(0, t.o, Dir::In, t.p).unwrap();
            assert!(inc.contains(&t.s));
        }
    }
}

#[test]
fn remote_lookup_equals_owner_local() {
    let stores = cluster(3, true);
    let triples = random_triples(23, 300);
    build_cluster(&stores, &triples);

    for t in &triples {
        let owner = &stores[owner_of(t.s, stores.len())];
        let local = owner.get_edges_local(t.s, Dir::Out, t.p);

        for store in &stores {
            // Twice: the second resolution exercises the descriptor cache.
            for _ in 0..2 {
                let global = store.get_edges_global(0, t.s, Dir::Out, t.p).unwrap();
                let mut got = global.to_vec();
                let mut want = local.to_vec();
                got.sort_unstable();
                want.sort_unstable();
                assert_eq!(got, want);
            }
        }
    }
}

#[test]
fn caching_disabled_matches_caching_enabled() {
    let triples = random_triples(31, 200);
    let cached = cluster(2, true);
    let uncached = cluster(2, false);
    build_cluster(&cached, &triples);
    build_cluster(&uncached, &triples);

    for t in &triples {
        let a = cached[0].get_edges_global(0, t.s, Dir::Out, t.p).unwrap();
        let b = uncached[0].get_edges_global(0, t.s, Dir::Out, t.p).unwrap();
        let mut a = a.to_vec();
        let mut b = b.to_vec();
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);
    }
}

#[test]
fn unknown_keys_are_empty_everywhere() {
    let stores = cluster(3, true);
    build_cluster(&stores, &random_triples(5, 50));

    for store in &stores {
        for vid in [V + 900, V + 901, V + 902] {
            let edges = store.get_edges_global(0, vid, Dir::Out, 2).unwrap();
            assert!(edges.is_empty());
        }
    }
}

#[test]
fn index_partitions_union_to_all_subjects() {
    let stores = cluster(3, true);
    let triples = random_triples(17, 200);
    build_cluster(&stores, &triples);

    for pid in 2..7 {
        let mut expected: Vec<u64> = triples.iter().filter(|t| t.p == pid).map(|t| t.s).collect();
        expected.sort_unstable();
        expected.dedup();

        let mut got: Vec<u64> = stores
            .iter()
            .flat_map(|s| s.get_index_edges_local(pid, Dir::In).to_vec())
            .collect();
        got.sort_unstable();
        got.dedup();

        assert_eq!(got, expected, "predicate {pid} index");
    }
}
