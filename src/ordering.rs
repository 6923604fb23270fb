//! Per-source ordering engine.
//!
//! Each source rank gets an expected counter and a min-heap of early
//! arrivals. Sources never share state, so a stalled counter on one lane
//! cannot block progress on another.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use smallvec::SmallVec;

use crate::handler::HandlerId;
use crate::header::{Seq, seq_before};
use crate::transport::Rank;

/// A received-but-undispatched ordered message. The receive buffer travels
/// with it; `pooled` says whether that buffer returns to the slot pool
/// after dispatch or is dropped (oversize temporaries).
pub(crate) struct Pending {
    pub seq: Seq,
    pub handler: HandlerId,
    pub src: Rank,
    pub payload_len: usize,
    pub buf: Box<[u8]>,
    pub pooled: bool,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.seq.cmp(&other.seq)
    }
}

/// Messages that became dispatchable, in counter order.
pub(crate) type Ready = SmallVec<[Pending; 4]>;

struct SourceLane {
    expected: Seq,
    pending: BinaryHeap<Reverse<Pending>>,
}

pub(crate) struct OrderingEngine {
    lanes: Vec<SourceLane>,
}

impl OrderingEngine {
    pub fn new(nranks: usize) -> Self {
        Self {
            lanes: (0..nranks)
                .map(|_| SourceLane {
                    expected: 0,
                    pending: BinaryHeap::new(),
                })
                .collect(),
        }
    }

    /// Feeds one ordered arrival. Returns everything now dispatchable, in
    /// counter order: the arrival itself when it matches the expectation,
    /// followed by any parked messages that became contiguous.
    ///
    /// Panics when a counter lands behind its expectation: the transport
    /// neither duplicates nor loses messages, so a counter can only move
    /// backwards through an invariant violation upstream.
    pub fn accept(&mut self, msg: Pending) -> Ready {
        let lane = &mut self.lanes[msg.src];
        let mut ready = Ready::new();
        if msg.seq == lane.expected {
            lane.expected = lane.expected.wrapping_add(1);
            ready.push(msg);
            while let Some(Reverse(head)) = lane.pending.peek() {
                if head.seq != lane.expected {
                    break;
                }
                let Some(Reverse(next)) = lane.pending.pop() else {
                    break;
                };
                lane.expected = lane.expected.wrapping_add(1);
                ready.push(next);
            }
        } else if seq_before(msg.seq, lane.expected) {
            panic!(
                "ordered message counter went backwards: rank {} sent counter {} but {} was already dispatched",
                msg.src, msg.seq, lane.expected
            );
        } else {
            lane.pending.push(Reverse(msg));
        }
        ready
    }

    /// Parked messages across all sources.
    pub fn total_pending(&self) -> usize {
        self.lanes.iter().map(|lane| lane.pending.len()).sum()
    }

    #[cfg(test)]
    fn set_expected(&mut self, src: Rank, seq: Seq) {
        self.lanes[src].expected = seq;
    }
}
