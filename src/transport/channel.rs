//! In-process transport: a fixed rank group wired with lock-free queues.
//!
//! Every rank owns one MPSC active-message lane (per-producer FIFO, which
//! is the ordering the wire contract requires) plus one oversize lane per
//! source. This is the substrate used by the integration tests and the
//! demo driver, and the reference implementation of the trait contract.

use std::sync::Arc;

use crossbeam_queue::SegQueue;

use super::{Frame, Lane, Rank, RecvDone, RecvMatch, RecvOp, RecvRequest, SendRequest, Transport};
use crate::header::HEADER_LEN;

struct Endpoint {
    am: SegQueue<(Rank, Frame)>,
    huge: Vec<SegQueue<Frame>>,
}

/// A fixed in-process rank group. Build once, then hand each rank its
/// endpoint transport.
pub struct ChannelGroup {
    endpoints: Arc<Vec<Endpoint>>,
}

impl ChannelGroup {
    pub fn new(nranks: usize) -> Self {
        assert!(nranks > 0, "rank group cannot be empty");
        let endpoints = (0..nranks)
            .map(|_| Endpoint {
                am: SegQueue::new(),
                huge: (0..nranks).map(|_| SegQueue::new()).collect(),
            })
            .collect();
        Self {
            endpoints: Arc::new(endpoints),
        }
    }

    pub fn nranks(&self) -> usize {
        self.endpoints.len()
    }

    pub fn endpoint(&self, rank: Rank) -> ChannelTransport {
        assert!(
            rank < self.endpoints.len(),
            "rank {rank} out of range for group of {}",
            self.endpoints.len()
        );
        ChannelTransport {
            me: rank,
            endpoints: self.endpoints.clone(),
        }
    }
}

pub struct ChannelTransport {
    me: Rank,
    endpoints: Arc<Vec<Endpoint>>,
}

impl Transport for ChannelTransport {
    fn rank(&self) -> Rank {
        self.me
    }

    fn nranks(&self) -> usize {
        self.endpoints.len()
    }

    fn isend(&self, dest: Rank, frame: Frame) -> SendRequest {
        assert!(
            dest < self.endpoints.len(),
            "destination rank {dest} out of range"
        );
        let endpoint = &self.endpoints[dest];
        match frame.lane {
            Lane::Am => endpoint.am.push((self.me, frame)),
            Lane::Huge => endpoint.huge[self.me].push(frame),
        }
        // The queue owns the frame now; nothing further holds the payload.
        SendRequest::completed()
    }

    fn irecv(&self, buf: Box<[u8]>, matcher: RecvMatch) -> RecvRequest {
        RecvRequest::new(ChannelRecv {
            me: self.me,
            endpoints: self.endpoints.clone(),
            buf: Some(buf),
            matcher,
        })
    }
}

struct ChannelRecv {
    me: Rank,
    endpoints: Arc<Vec<Endpoint>>,
    buf: Option<Box<[u8]>>,
    matcher: RecvMatch,
}

impl RecvOp for ChannelRecv {
    fn test(&mut self) -> Option<RecvDone> {
        let buf = self.buf.as_mut()?;
        let endpoint = &self.endpoints[self.me];
        let (src, frame) = match self.matcher {
            RecvMatch::Am => endpoint.am.pop()?,
            RecvMatch::Huge { from } => (from, endpoint.huge[from].pop()?),
        };
        let len = frame.wire_len();
        assert!(
            len <= buf.len(),
            "frame of {len} bytes from rank {src} exceeds the {}-byte posted slot",
            buf.len()
        );
        buf[..HEADER_LEN].copy_from_slice(&frame.header);
        buf[HEADER_LEN..len].copy_from_slice(&frame.payload);
        Some(RecvDone {
            buf: self.buf.take()?,
            src,
            len,
        })
    }
}
