//! # Pinned Memory Region
//!
//! This module implements `MemRegion`, the anonymous memory mapping that
//! holds a peer's key region and entry region. The mapping is what a
//! production deployment registers with its interconnect so that remote
//! peers can read it without involving this peer's CPU; in-process the
//! [`crate::transport::LoopbackTransport`] reads it directly.
//!
//! ## Access Model
//!
//! The region is carved into 64-bit words and only ever touched through
//! `&[AtomicU64]` views. That choice is what makes the whole store work:
//!
//! - Writers publish a row by storing its descriptor word and then its key
//!   word (Release). Readers load the key word (Acquire) first, so a
//!   non-empty key always implies a fully published descriptor and fully
//!   written entries.
//! - Concurrent build-phase writers never alias: slot writes are serialized
//!   by bucket locks and entry writes land in ranges handed out by the bump
//!   allocator.
//! - `read` serves one-sided remote reads by copying whole words with
//!   Acquire loads, so a remote reader observes the same consistent
//!   snapshot of each key word that a local reader would.
//!
//! ## Why mmap Instead of a Vec
//!
//! An anonymous mapping is page-aligned (so the `AtomicU64` view is always
//! valid), zero-initialized by the kernel, and is the allocation shape that
//! interconnect registration expects. This mirrors how the rest of the
//! crate treats the region: a dumb span of bytes whose layout is fixed by
//! `Geometry`, not a Rust collection.

use std::sync::atomic::{AtomicU64, Ordering};

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;

use crate::config::constants::EDGE_BYTES;

/// A peer's pinned memory region. Cheap to share via `Arc`; all mutation
/// goes through atomic words, so `&self` suffices everywhere.
#[derive(Debug)]
pub struct MemRegion {
    base: *mut u8,
    len: usize,
    /// Owns the mapping; dropped last, never accessed directly.
    _map: MmapMut,
}

// SAFETY: the region is only ever accessed through &[AtomicU64] views or
// through `read`, both of which are race-free by construction:
// 1. `base` points into a mapping owned by `_map`, alive as long as self.
// 2. Every load and store is a word-sized atomic; there are no plain
//    reads or writes through `base` after construction.
// 3. The mapping address is stable: moving MemRegion moves the struct,
//    not the mapped pages.
unsafe impl Send for MemRegion {}
unsafe impl Sync for MemRegion {}

impl MemRegion {
    /// Maps a zeroed anonymous region of `len` bytes.
    pub fn anon(len: usize) -> Result<Self> {
        ensure!(
            len >= EDGE_BYTES && len % EDGE_BYTES == 0,
            "region size {} is not a positive multiple of the word size",
            len
        );

        let mut map =
            MmapMut::map_anon(len).wrap_err_with(|| format!("failed to map {} bytes", len))?;
        let base = map.as_mut_ptr();

        Ok(Self {
            base,
            len,
            _map: map,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The region as a flat array of atomic words.
    pub fn words(&self) -> &[AtomicU64] {
        // SAFETY:
        // 1. `base` is valid for `len` bytes for the lifetime of `self`
        //    (the mapping is owned by `_map`).
        // 2. Anonymous mappings are page-aligned, satisfying AtomicU64's
        //    8-byte alignment; `len` is a multiple of 8 (checked in anon).
        // 3. AtomicU64 has the same size and layout as u64, and atomic
        //    access never produces references that alias mutably.
        unsafe {
            std::slice::from_raw_parts(self.base as *const AtomicU64, self.len / EDGE_BYTES)
        }
    }

    /// Copies `dst.len()` bytes starting at byte offset `off` into `dst`
    /// with word-granular Acquire loads. Offset and length must be
    /// word-aligned; this is the read primitive a one-sided transport uses.
    pub fn read(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        let off = off as usize;
        ensure!(
            off % EDGE_BYTES == 0 && dst.len() % EDGE_BYTES == 0,
            "unaligned region read: off={} len={}",
            off,
            dst.len()
        );
        ensure!(
            off.checked_add(dst.len()).is_some_and(|end| end <= self.len),
            "region read out of bounds: off={} len={} region={}",
            off,
            dst.len(),
            self.len
        );

        let words = self.words();
        let first = off / EDGE_BYTES;
        for (i, chunk) in dst.chunks_exact_mut(EDGE_BYTES).enumerate() {
            let word = words[first + i].load(Ordering::Acquire);
            chunk.copy_from_slice(&word.to_ne_bytes());
        }
        Ok(())
    }
}
