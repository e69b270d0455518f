//! # Slot Wire Format
//!
//! One key slot is two 64-bit words: the packed key and the packed
//! descriptor. The key region is a flat array of these 16-byte slots and
//! remote peers parse raw bucket bytes with the same struct, so its layout
//! is load-bearing: `#[repr(C)]`, no padding, native word order. All peers
//! of a cluster must share word size and endianness (a homogeneous
//! cluster, which is what one-sided-read deployments are in practice).
//!
//! Zerocopy traits let the remote path reconstruct slots from scratch
//! buffer bytes without hand-written cursor code; `read_from_bytes` copies,
//! so the scratch buffer's alignment does not matter.

use eyre::{ensure, eyre, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::config::constants::{ASSOCIATIVITY, BUCKET_BYTES, EDGE_BYTES, SLOT_BYTES};
use crate::encoding::{EntryRef, TripleKey};

/// One slot of the key region: packed key word plus packed descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct Slot {
    key: u64,
    entry: u64,
}

const _: () = assert!(std::mem::size_of::<Slot>() == SLOT_BYTES);

impl Slot {
    pub const EMPTY: Slot = Slot { key: 0, entry: 0 };

    pub fn new(key: u64, entry: u64) -> Self {
        Self { key, entry }
    }

    pub fn key_word(&self) -> u64 {
        self.key
    }

    /// A slot is empty iff its key word is the all-zero sentinel.
    pub fn is_empty(&self) -> bool {
        self.key == 0
    }

    pub fn key(&self) -> TripleKey {
        TripleKey::decode(self.key)
    }

    pub fn entry(&self) -> EntryRef {
        EntryRef::decode(self.entry)
    }

    /// Reads this slot as a chain cell: the id of the next bucket in the
    /// chain, if any. A chain cell stores the bucket id in the vid field
    /// of an otherwise zero key, so probing code that lands on it sees a
    /// non-empty key whose dir and pid are zero.
    pub fn chain_next(&self) -> Option<u64> {
        if self.is_empty() {
            None
        } else {
            Some(self.key().vid)
        }
    }

    /// Parses one bucket's worth of slots out of remote-read bytes.
    pub fn parse_bucket(bytes: &[u8]) -> Result<[Slot; ASSOCIATIVITY]> {
        ensure!(
            bytes.len() >= BUCKET_BYTES,
            "buffer too small for a bucket: {} < {}",
            bytes.len(),
            BUCKET_BYTES
        );

        let mut slots = [Slot::EMPTY; ASSOCIATIVITY];
        for (slot, chunk) in slots.iter_mut().zip(bytes[..BUCKET_BYTES].chunks_exact(SLOT_BYTES)) {
            *slot = Slot::read_from_bytes(chunk)
                .map_err(|e| eyre!("failed to parse slot from bucket bytes: {:?}", e))?;
        }
        Ok(slots)
    }
}

/// Parses adjacency entries out of remote-read bytes.
pub fn parse_entries(bytes: &[u8], count: usize) -> Result<Vec<u64>> {
    let wanted = count * EDGE_BYTES;
    ensure!(
        bytes.len() >= wanted,
        "buffer too small for {} entries: {} < {}",
        count,
        bytes.len(),
        wanted
    );
    Ok(bytes[..wanted]
        .chunks_exact(EDGE_BYTES)
        .map(|c| u64::from_ne_bytes(c.try_into().expect("chunk is 8 bytes")))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Dir;

    #[test]
    fn slot_size_is_two_words() {
        assert_eq!(std::mem::size_of::<Slot>(), 16);
    }

    #[test]
    fn bucket_parse_round_trips_slot_bytes() {
        let key = TripleKey::new(200_000, Dir::Out, 7);
        let entry = EntryRef::new(3, 40);
        let slot = Slot::new(key.encode(), entry.encode());

        let mut bytes = vec![0u8; BUCKET_BYTES];
        bytes[..SLOT_BYTES].copy_from_slice(slot.as_bytes());

        let parsed = Slot::parse_bucket(&bytes).unwrap();
        assert_eq!(parsed[0], slot);
        assert_eq!(parsed[0].key(), key);
        assert_eq!(parsed[0].entry(), entry);
        assert!(parsed[1].is_empty());
    }

    #[test]
    fn bucket_parse_rejects_short_buffer() {
        assert!(Slot::parse_bucket(&[0u8; BUCKET_BYTES - 1]).is_err());
    }

    #[test]
    fn chain_cell_exposes_next_bucket_id() {
        let cell = Slot::new(TripleKey::new(42, Dir::In, 0).encode(), 0);
        assert_eq!(cell.chain_next(), Some(42));
        assert_eq!(Slot::EMPTY.chain_next(), None);
    }

    #[test]
    fn entries_parse_from_raw_words() {
        let mut bytes = Vec::new();
        for v in [1u64, 2, 3] {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }
        assert_eq!(parse_entries(&bytes, 3).unwrap(), vec![1, 2, 3]);
        assert!(parse_entries(&bytes, 4).is_err());
    }
}
