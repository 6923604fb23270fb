//! Process-wide message counters.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// Live counters for one endpoint. Send-side fields are bumped atomically
/// from arbitrary threads; receive-side fields only ever from the
/// dispatcher thread. Byte counts cover payloads only, header overhead
/// excluded on both sides.
#[derive(Default)]
pub struct StatCounters {
    msg_sent: CachePadded<AtomicU64>,
    bytes_sent: CachePadded<AtomicU64>,
    msg_recv: CachePadded<AtomicU64>,
    bytes_recv: CachePadded<AtomicU64>,
}

impl StatCounters {
    pub fn record_send(&self, payload_bytes: u64) {
        self.msg_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(payload_bytes, Ordering::Relaxed);
    }

    pub fn record_recv(&self, payload_bytes: u64) {
        self.msg_recv.fetch_add(1, Ordering::Relaxed);
        self.bytes_recv.fetch_add(payload_bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RmiStats {
        RmiStats {
            msg_sent: self.msg_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            msg_recv: self.msg_recv.load(Ordering::Relaxed),
            bytes_recv: self.bytes_recv.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RmiStats {
    pub msg_sent: u64,
    pub bytes_sent: u64,
    pub msg_recv: u64,
    pub bytes_recv: u64,
}
