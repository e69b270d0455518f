//! # Normal-Row Ingest
//!
//! Builds the base adjacency rows from two sorted views of the peer's
//! triple shard: `spo` sorted by `(s, p, o)` and `ops` sorted by
//! `(o, p, s)`. Sorting makes every row a contiguous group, so ingest is
//! one pass per view: reserve all needed entries up front, walk the
//! groups, write each group's entries, publish its row.
//!
//! Type triples need special handling. In `spo` they are ordinary groups
//! (the row `(s, OUT, TYPE_ID)` lists the subject's types). In `ops` they
//! would key rows on the type id itself, which is the indexer's job, so
//! they are skipped: because type ids sort below every vertex id, they
//! form a contiguous prefix of `ops`. Ingest measures the prefix and then
//! verifies no type object appears after it rather than trusting the
//! magnitude test alone; a violation means the batch was not sorted the
//! way the contract requires.
//!
//! Under the versatile switch a second pass publishes, for every subject
//! and object, the set of predicates it participates in, keyed with the
//! reserved `PREDICATE_ID`. These rows answer queries with unknown
//! predicates and feed the global vertex and predicate sets during
//! indexing.

use eyre::{bail, Result};
use smallvec::SmallVec;
use tracing::debug;

use crate::config::constants::{MIN_NORMAL_VID, PREDICATE_ID};
use crate::encoding::{Dir, EntryRef, TripleKey};
use crate::store::GraphStore;
use crate::triple::Triple;

impl GraphStore {
    /// Builds normal rows from this peer's sorted triple batches. Called
    /// once per peer before [`GraphStore::insert_index`].
    pub fn insert_normal(&self, spo: &[Triple], ops: &[Triple]) -> Result<()> {
        let type_triples = ops.iter().take_while(|t| t.is_type_triple()).count();
        validate_batches(spo, ops, type_triples)?;
        let ops_rest = &ops[type_triples..];

        let normal = (spo.len() + ops_rest.len()) as u64;
        let mut off = self.alloc_entries(normal)?;

        let mut s = 0;
        while s < spo.len() {
            let mut e = s + 1;
            while e < spo.len() && spo[e].s == spo[s].s && spo[e].p == spo[s].p {
                e += 1;
            }
            let count = (e - s) as u64;
            for (i, t) in spo[s..e].iter().enumerate() {
                self.write_edge(off + i as u64, t.o);
            }
            self.publish_row(
                TripleKey::new(spo[s].s, Dir::Out, spo[s].p),
                EntryRef::new(count, off),
            )?;
            off += count;
            s = e;
        }

        let mut s = 0;
        while s < ops_rest.len() {
            let mut e = s + 1;
            while e < ops_rest.len()
                && ops_rest[e].o == ops_rest[s].o
                && ops_rest[e].p == ops_rest[s].p
            {
                e += 1;
            }
            let count = (e - s) as u64;
            for (i, t) in ops_rest[s..e].iter().enumerate() {
                self.write_edge(off + i as u64, t.s);
            }
            self.publish_row(
                TripleKey::new(ops_rest[s].o, Dir::In, ops_rest[s].p),
                EntryRef::new(count, off),
            )?;
            off += count;
            s = e;
        }

        if self.is_versatile() {
            self.insert_predicate_sets(spo, ops_rest)?;
        }

        debug!(
            spo = spo.len(),
            ops = ops.len(),
            type_triples,
            "ingested normal rows"
        );
        Ok(())
    }

    /// Publishes the per-vertex predicate-set rows: for each subject the
    /// distinct predicates of its outgoing edges, for each object the
    /// distinct predicates of its incoming edges.
    fn insert_predicate_sets(&self, spo: &[Triple], ops_rest: &[Triple]) -> Result<()> {
        let groups =
            count_pair_groups(spo, |t| (t.s, t.p)) + count_pair_groups(ops_rest, |t| (t.o, t.p));
        let mut off = self.alloc_entries(groups as u64)?;

        let mut emit = |vertex: u64, dir: Dir, preds: &SmallVec<[u64; 8]>| -> Result<()> {
            for (i, p) in preds.iter().enumerate() {
                self.write_edge(off + i as u64, *p);
            }
            self.publish_row(
                TripleKey::new(vertex, dir, PREDICATE_ID),
                EntryRef::new(preds.len() as u64, off),
            )?;
            off += preds.len() as u64;
            Ok(())
        };

        let mut s = 0;
        while s < spo.len() {
            let subject = spo[s].s;
            let mut preds: SmallVec<[u64; 8]> = SmallVec::new();
            let mut e = s;
            while e < spo.len() && spo[e].s == subject {
                if preds.last() != Some(&spo[e].p) {
                    preds.push(spo[e].p);
                }
                e += 1;
            }
            emit(subject, Dir::Out, &preds)?;
            s = e;
        }

        let mut s = 0;
        while s < ops_rest.len() {
            let object = ops_rest[s].o;
            let mut preds: SmallVec<[u64; 8]> = SmallVec::new();
            let mut e = s;
            while e < ops_rest.len() && ops_rest[e].o == object {
                if preds.last() != Some(&ops_rest[e].p) {
                    preds.push(ops_rest[e].p);
                }
                e += 1;
            }
            emit(object, Dir::In, &preds)?;
            s = e;
        }

        Ok(())
    }
}

/// Rejects batches that would corrupt the key space: a type object after
/// the type prefix (unsorted input), a subject or object below the vertex
/// id floor used as a row key, or a predicate outside the id space the key
/// word can hold.
fn validate_batches(spo: &[Triple], ops: &[Triple], type_triples: usize) -> Result<()> {
    if let Some(stray) = ops[type_triples..].iter().find(|t| t.is_type_triple()) {
        bail!(
            "corrupt ops batch: type object {} after the type prefix; input is not sorted by object",
            stray.o
        );
    }
    if let Some(bad) = spo.iter().find(|t| t.s < MIN_NORMAL_VID) {
        bail!(
            "corrupt spo batch: subject {} below the vertex id floor {}",
            bad.s,
            MIN_NORMAL_VID
        );
    }
    if let Some(bad) = spo
        .iter()
        .chain(ops)
        .find(|t| t.p == PREDICATE_ID || t.p >= MIN_NORMAL_VID)
    {
        bail!("corrupt triple batch: predicate {} outside the predicate id space", bad.p);
    }
    Ok(())
}

fn count_pair_groups(batch: &[Triple], pair: impl Fn(&Triple) -> (u64, u64)) -> usize {
    let mut groups = 0;
    let mut last = None;
    for t in batch {
        let k = pair(t);
        if last != Some(k) {
            groups += 1;
            last = Some(k);
        }
    }
    groups
}
