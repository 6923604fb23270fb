//! Spare receive-slot pool.
//!
//! The dispatcher keeps a fixed number of slots posted on the transport at
//! all times. When an ordered message arrives early and is parked in the
//! pending heap, its slot buffer travels with it and the slot is reposted
//! with a spare from here; the parked buffer comes back once the message
//! finally dispatches. Acquire falls back to allocation when the free list
//! is empty, so a burst of early arrivals delays delivery instead of
//! dropping anything.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::SegQueue;

pub(crate) struct SlotPool {
    free: SegQueue<Box<[u8]>>,
    slot_len: usize,
    allocated: AtomicUsize,
    outstanding: AtomicUsize,
}

impl SlotPool {
    pub fn new(slot_len: usize) -> Self {
        Self {
            free: SegQueue::new(),
            slot_len,
            allocated: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn slot_len(&self) -> usize {
        self.slot_len
    }

    pub fn acquire(&self) -> Box<[u8]> {
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        if let Some(buf) = self.free.pop() {
            buf
        } else {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            vec![0u8; self.slot_len].into_boxed_slice()
        }
    }

    pub fn release(&self, buf: Box<[u8]>) {
        // Oversize temporaries are dropped, never recycled.
        if buf.len() != self.slot_len {
            return;
        }
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        self.free.push(buf);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            outstanding: self.outstanding.load(Ordering::Relaxed),
            available: self.free.len(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct PoolStats {
    /// Spare buffers ever allocated.
    pub allocated: usize,
    /// Buffers currently travelling with parked messages.
    pub outstanding: usize,
    /// Buffers sitting on the free list.
    pub available: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_grows_then_recycles() {
        let pool = SlotPool::new(256);
        assert_eq!(pool.stats().allocated, 0);

        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(a.len(), 256);
        assert_eq!(pool.stats().allocated, 2);
        assert_eq!(pool.stats().outstanding, 2);

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.stats().outstanding, 0);
        assert_eq!(pool.stats().available, 2);

        // Recycled, not re-allocated.
        let _c = pool.acquire();
        assert_eq!(pool.stats().allocated, 2);
        assert_eq!(pool.stats().available, 1);
    }

    #[test]
    fn foreign_sized_buffers_are_dropped() {
        let pool = SlotPool::new(128);
        let huge = pool.acquire();
        pool.release(vec![0u8; 4096].into_boxed_slice());
        assert_eq!(pool.stats().available, 0);
        pool.release(huge);
        assert_eq!(pool.stats().available, 1);
    }
}
