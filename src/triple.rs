//! Triple batches and the two sort orders ingest consumes.
//!
//! The loader hands every peer two copies of its shard: one sorted by
//! `(s, p, o)` and one sorted by `(o, p, s)`. Because type identifiers are
//! numerically below [`MIN_NORMAL_VID`], sorting by object gathers all type
//! triples into a contiguous prefix of the `(o, p, s)` batch, where ingest
//! can skip them in one step.

use crate::config::constants::MIN_NORMAL_VID;

/// One RDF triple with dictionary-encoded identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triple {
    pub s: u64,
    pub p: u64,
    pub o: u64,
}

impl Triple {
    pub fn new(s: u64, p: u64, o: u64) -> Self {
        Self { s, p, o }
    }

    /// Whether the object is a type identifier, making this a type triple.
    pub fn is_type_triple(&self) -> bool {
        self.o < MIN_NORMAL_VID
    }
}

/// Sorts a batch into the subject-major order `insert_normal` expects.
pub fn sort_spo(triples: &mut [Triple]) {
    triples.sort_unstable_by_key(|t| (t.s, t.p, t.o));
}

/// Sorts a batch into the object-major order `insert_normal` expects.
pub fn sort_ops(triples: &mut [Triple]) {
    triples.sort_unstable_by_key(|t| (t.o, t.p, t.s));
}
