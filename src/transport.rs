//! # Transport Seam
//!
//! The store needs exactly one thing from the cluster interconnect: a
//! blocking one-sided read of a remote peer's registered memory region.
//! [`Transport`] is that seam. A production implementation issues verbs
//! against NIC-registered memory; [`LoopbackTransport`] serves reads
//! straight out of in-process [`MemRegion`]s, which is all single-machine
//! deployments and the test suites need.
//!
//! The consistency contract is the one `MemRegion::read` provides: reads
//! copy whole 64-bit words and observe every word that was published with
//! Release ordering before the read started. Any transport substituted
//! here must offer the same word-granular snapshot guarantee.

use std::sync::Arc;

use eyre::{eyre, Result, WrapErr};

use crate::store::MemRegion;

/// Blocking one-sided reads of remote peers' regions.
pub trait Transport: Send + Sync {
    /// Reads `dst.len()` bytes from byte offset `src_off` of `peer`'s
    /// region into `dst`. Blocks until the read completed. `tid`
    /// identifies the calling engine thread for transports that maintain
    /// per-thread channels.
    fn remote_read(&self, tid: usize, peer: usize, dst: &mut [u8], src_off: u64) -> Result<()>;
}

/// In-process transport over every peer's region.
pub struct LoopbackTransport {
    regions: Vec<Arc<MemRegion>>,
}

impl LoopbackTransport {
    pub fn new(regions: Vec<Arc<MemRegion>>) -> Self {
        Self { regions }
    }

    pub fn num_peers(&self) -> usize {
        self.regions.len()
    }
}

impl Transport for LoopbackTransport {
    fn remote_read(&self, _tid: usize, peer: usize, dst: &mut [u8], src_off: u64) -> Result<()> {
        let region = self
            .regions
            .get(peer)
            .ok_or_else(|| eyre!("remote read failed: unknown peer {}", peer))?;
        region
            .read(src_off, dst)
            .wrap_err_with(|| format!("remote read failed: peer {}", peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn loopback_reads_target_peer_region() {
        let a = Arc::new(MemRegion::anon(64).unwrap());
        let b = Arc::new(MemRegion::anon(64).unwrap());
        b.words()[0].store(77, Ordering::Release);

        let transport = LoopbackTransport::new(vec![a, b]);
        let mut buf = [0u8; 8];
        transport.remote_read(0, 1, &mut buf, 0).unwrap();
        assert_eq!(u64::from_ne_bytes(buf), 77);
    }

    #[test]
    fn loopback_rejects_unknown_peer() {
        let transport = LoopbackTransport::new(vec![Arc::new(MemRegion::anon(64).unwrap())]);
        let mut buf = [0u8; 8];
        let err = transport.remote_read(0, 3, &mut buf, 0).unwrap_err();
        assert!(err.to_string().contains("unknown peer"));
    }
}
